//! Database Test Utilities
//!
//! Temporary content databases and row-level seeding helpers

use anyhow::Result;
use sqlx::SqlitePool;
use tempfile::TempDir;
use treeport_common::uuid_utils::to_db;
use uuid::Uuid;

/// Create temporary test database with the content schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_content.db");

    let pool = treeport_common::db::init_database(&db_path).await?;

    Ok((temp_dir, pool))
}

/// Get all table names in database
pub async fn get_table_names(pool: &SqlitePool) -> Result<Vec<String>> {
    let tables = sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
    )
    .fetch_all(pool)
    .await?;
    Ok(tables)
}

/// Number of rows in `table`
pub async fn count_rows(pool: &SqlitePool, table: &str) -> Result<i64> {
    let query = format!("SELECT COUNT(*) FROM {}", table);
    let count = sqlx::query_scalar::<_, i64>(&query).fetch_one(pool).await?;
    Ok(count)
}

/// Insert an item row
pub async fn insert_item(
    pool: &SqlitePool,
    id: Uuid,
    name: &str,
    template_id: Uuid,
    parent_id: Uuid,
) -> Result<()> {
    sqlx::query("INSERT INTO items (id, name, template_id, parent_id) VALUES (?, ?, ?, ?)")
        .bind(to_db(&id))
        .bind(name)
        .bind(to_db(&template_id))
        .bind(to_db(&parent_id))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_shared_field(pool: &SqlitePool, item_id: Uuid, field_id: Uuid, value: &str) -> Result<()> {
    sqlx::query("INSERT INTO shared_fields (item_id, field_id, value) VALUES (?, ?, ?)")
        .bind(to_db(&item_id))
        .bind(to_db(&field_id))
        .bind(value)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_unversioned_field(
    pool: &SqlitePool,
    item_id: Uuid,
    language: &str,
    field_id: Uuid,
    value: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO unversioned_fields (item_id, language, field_id, value) VALUES (?, ?, ?, ?)")
        .bind(to_db(&item_id))
        .bind(language)
        .bind(to_db(&field_id))
        .bind(value)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_versioned_field(
    pool: &SqlitePool,
    item_id: Uuid,
    language: &str,
    version: i64,
    field_id: Uuid,
    value: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO versioned_fields (item_id, language, version, field_id, value) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(to_db(&item_id))
    .bind(language)
    .bind(version)
    .bind(to_db(&field_id))
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_db() {
        let result = create_test_db().await;
        assert!(result.is_ok());

        let (_temp_dir, pool) = result.unwrap();

        let tables = get_table_names(&pool).await.unwrap();
        assert!(tables.contains(&"items".to_string()));
        assert!(tables.contains(&"versioned_fields".to_string()));
    }

    #[tokio::test]
    async fn test_seed_helpers() {
        let (_temp_dir, pool) = create_test_db().await.unwrap();
        let item = Uuid::new_v4();
        let field = Uuid::new_v4();

        insert_item(&pool, item, "home", Uuid::new_v4(), Uuid::nil()).await.unwrap();
        insert_shared_field(&pool, item, field, "1").await.unwrap();
        insert_unversioned_field(&pool, item, "en", field, "2").await.unwrap();
        insert_versioned_field(&pool, item, "en", 1, field, "3").await.unwrap();

        assert_eq!(count_rows(&pool, "items").await.unwrap(), 1);
        assert_eq!(count_rows(&pool, "shared_fields").await.unwrap(), 1);
        assert_eq!(count_rows(&pool, "unversioned_fields").await.unwrap(), 1);
        assert_eq!(count_rows(&pool, "versioned_fields").await.unwrap(), 1);
    }
}
