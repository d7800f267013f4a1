//! Database initialization
//!
//! Opens (or creates) the SQLite content store and makes sure the item and
//! field tables exist. Table creation is idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Fan-out installs run up to 8 workers, each holding a connection per item
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_content_tables(&pool).await?;

    Ok(pool)
}

/// Create the item table and the three scope-partitioned field tables
pub async fn create_content_tables(pool: &SqlitePool) -> Result<()> {
    create_items_table(pool).await?;
    create_shared_fields_table(pool).await?;
    create_unversioned_fields_table(pool).await?;
    create_versioned_fields_table(pool).await?;
    Ok(())
}

async fn create_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            template_id TEXT NOT NULL,
            branch_id TEXT NOT NULL DEFAULT '00000000-0000-0000-0000-000000000000',
            parent_id TEXT NOT NULL DEFAULT '00000000-0000-0000-0000-000000000000'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_parent ON items(parent_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Language-less, version-less field values
async fn create_shared_fields_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shared_fields (
            item_id TEXT NOT NULL,
            field_id TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (item_id, field_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Per-language field values
async fn create_unversioned_fields_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS unversioned_fields (
            item_id TEXT NOT NULL,
            language TEXT NOT NULL,
            field_id TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (item_id, language, field_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Per-language, per-version field values
async fn create_versioned_fields_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS versioned_fields (
            item_id TEXT NOT NULL,
            language TEXT NOT NULL,
            version INTEGER NOT NULL,
            field_id TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (item_id, language, version, field_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
