//! Batched subtree query construction
//!
//! One batch reads a subtree in two result sets on a single connection:
//!
//! 1. **Node metadata**: a recursive walk from the root down parent→child
//!    links, computing each node's path from ancestor names, materialised
//!    into a temporary table and filtered to the requested identifiers.
//! 2. **Field rows**: shared, unversioned and versioned field values joined
//!    against that temporary table, in the uniform shape
//!    `(item_id, language, field_id, value, version)`.
//!
//! Values of excluded fields are blanked while the rows themselves are kept,
//! so the field still lands in the right bucket on the reconstructed node.
//!
//! Every identifier, the root included, is a bound parameter.

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use treeport_common::uuid_utils;
use treeport_common::{Error, Result};
use uuid::Uuid;

/// Per-connection temporary table holding the batch's node metadata
pub const BATCH_TABLE: &str = "temp.batch_items";

/// One SQL statement of a batch with its positional bind values
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatement {
    pub sql: String,
    pub binds: Vec<String>,
}

impl BatchStatement {
    fn new(sql: String, binds: Vec<String>) -> Self {
        Self { sql, binds }
    }

    /// sqlx query with all values bound in order
    pub fn query(&self) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        let mut query = sqlx::query(&self.sql);
        for value in &self.binds {
            query = query.bind(value.as_str());
        }
        query
    }

    /// Statement text with literals substituted for placeholders
    ///
    /// For logging only; never execute the result.
    pub fn debug_sql(&self) -> String {
        let mut binds = self.binds.iter();
        let mut rendered = String::with_capacity(self.sql.len() + self.binds.len() * 40);

        for ch in self.sql.chars() {
            match ch {
                '?' => match binds.next() {
                    Some(value) => {
                        rendered.push('\'');
                        rendered.push_str(&value.replace('\'', "''"));
                        rendered.push('\'');
                    }
                    None => rendered.push('?'),
                },
                _ => rendered.push(ch),
            }
        }

        rendered
    }
}

/// The complete batch, in execution order
#[derive(Debug, Clone, PartialEq)]
pub struct BatchQuery {
    /// Drop and recreate the temporary node table
    pub setup: Vec<BatchStatement>,
    /// Result set 1: `(id, name, template_id, branch_id, parent_id, item_path)`
    pub nodes: BatchStatement,
    /// Result set 2: `(item_id, language, field_id, value, version)`
    pub fields: BatchStatement,
    /// Drop the temporary node table
    pub teardown: BatchStatement,
}

impl BatchQuery {
    /// Runnable script for the whole batch, for trace logging
    pub fn debug_sql(&self) -> String {
        self.setup
            .iter()
            .chain([&self.nodes, &self.fields, &self.teardown])
            .map(|statement| format!("{};", statement.debug_sql().trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Builds the batched subtree query
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBuilder;

impl QueryBuilder {
    /// Build the batch for `root_id`, keeping only `requested_ids`
    ///
    /// Values of `excluded_fields` are replaced by `''`.
    pub fn build(root_id: Uuid, requested_ids: &[Uuid], excluded_fields: &[Uuid]) -> Result<BatchQuery> {
        if requested_ids.is_empty() {
            return Err(Error::InvalidInput(
                "Cannot make a query for an empty root set".to_string(),
            ));
        }

        let mut create_binds = Vec::with_capacity(requested_ids.len() + 1);
        create_binds.push(uuid_utils::to_db(&root_id));
        create_binds.extend(requested_ids.iter().map(uuid_utils::to_db));

        let create_sql = format!(
            r#"
            CREATE TEMP TABLE batch_items AS
            WITH RECURSIVE item_tree (id, name, template_id, branch_id, parent_id, item_path) AS (
                SELECT base.id, base.name, base.template_id, base.branch_id, base.parent_id,
                       '/' || base.name
                FROM items AS base
                WHERE base.id = ?

                UNION ALL

                SELECT child.id, child.name, child.template_id, child.branch_id, child.parent_id,
                       parent.item_path || '/' || child.name
                FROM item_tree AS parent
                INNER JOIN items AS child
                    ON child.parent_id = parent.id
            )
            SELECT id, name, template_id, branch_id, parent_id, item_path
            FROM item_tree
            WHERE id {}
            "#,
            in_list(requested_ids.len())
        );

        let setup = vec![
            BatchStatement::new(format!("DROP TABLE IF EXISTS {}", BATCH_TABLE), Vec::new()),
            BatchStatement::new(create_sql, create_binds),
        ];

        let nodes = BatchStatement::new(
            format!(
                r#"
            SELECT id, name, template_id, branch_id, parent_id, item_path
            FROM {}
            "#,
                BATCH_TABLE
            ),
            Vec::new(),
        );

        let fields = Self::field_statement(excluded_fields);

        let teardown = BatchStatement::new(format!("DROP TABLE IF EXISTS {}", BATCH_TABLE), Vec::new());

        Ok(BatchQuery {
            setup,
            nodes,
            fields,
            teardown,
        })
    }

    fn field_statement(excluded_fields: &[Uuid]) -> BatchStatement {
        let shared_value = redacted_value("s", excluded_fields.len());
        let unversioned_value = redacted_value("u", excluded_fields.len());
        let versioned_value = redacted_value("v", excluded_fields.len());

        let sql = format!(
            r#"
            SELECT s.item_id AS item_id, '' AS language, s.field_id AS field_id, {shared_value} AS value, -1 AS version
            FROM shared_fields AS s
            INNER JOIN {table} AS t ON s.item_id = t.id
            UNION ALL
            SELECT u.item_id AS item_id, u.language AS language, u.field_id AS field_id, {unversioned_value} AS value, -1 AS version
            FROM unversioned_fields AS u
            INNER JOIN {table} AS t ON u.item_id = t.id
            UNION ALL
            SELECT v.item_id AS item_id, v.language AS language, v.field_id AS field_id, {versioned_value} AS value, v.version AS version
            FROM versioned_fields AS v
            INNER JOIN {table} AS t ON v.item_id = t.id
            "#,
            table = BATCH_TABLE,
        );

        // The exclusion list appears once per select
        let excluded: Vec<String> = excluded_fields.iter().map(uuid_utils::to_db).collect();
        let mut binds = Vec::with_capacity(excluded.len() * 3);
        for _ in 0..3 {
            binds.extend(excluded.iter().cloned());
        }

        BatchStatement::new(sql, binds)
    }
}

/// `IN (?, ?, ...)` with `count` placeholders
fn in_list(count: usize) -> String {
    let placeholders = vec!["?"; count].join(", ");
    format!("IN ({})", placeholders)
}

/// Value column for `alias`, blanked for excluded fields
fn redacted_value(alias: &str, excluded_count: usize) -> String {
    if excluded_count == 0 {
        return format!("{}.value", alias);
    }

    format!(
        "CASE WHEN {alias}.field_id {} THEN '' ELSE {alias}.value END",
        in_list(excluded_count),
        alias = alias
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(count: usize) -> Vec<Uuid> {
        (0..count).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn test_empty_requested_set_rejected() {
        let result = QueryBuilder::build(Uuid::new_v4(), &[], &[]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_root_is_bound_not_interpolated() {
        let root = Uuid::new_v4();
        let batch = QueryBuilder::build(root, &[root], &[]).unwrap();

        let create = &batch.setup[1];
        assert!(!create.sql.contains(&root.to_string()));
        assert_eq!(create.binds[0], root.to_string());
        assert!(create.sql.contains("WHERE base.id = ?"));
    }

    #[test]
    fn test_requested_ids_bound_in_order() {
        let root = Uuid::new_v4();
        let requested = ids(3);
        let batch = QueryBuilder::build(root, &requested, &[]).unwrap();

        let create = &batch.setup[1];
        assert!(create.sql.contains("IN (?, ?, ?)"));
        assert_eq!(create.binds.len(), 4);
        assert_eq!(&create.binds[1..], &requested.iter().map(|id| id.to_string()).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn test_exclusions_bound_once_per_select() {
        let excluded = ids(2);
        let batch = QueryBuilder::build(Uuid::new_v4(), &ids(1), &excluded).unwrap();

        assert_eq!(batch.fields.binds.len(), 6);
        assert_eq!(batch.fields.sql.matches("THEN '' ELSE").count(), 3);
        assert_eq!(batch.fields.sql.matches('?').count(), 6);
    }

    #[test]
    fn test_no_exclusions_selects_plain_value() {
        let batch = QueryBuilder::build(Uuid::new_v4(), &ids(1), &[]).unwrap();

        assert!(batch.fields.binds.is_empty());
        assert!(!batch.fields.sql.contains("CASE"));
        assert!(batch.fields.sql.contains("s.value AS value"));
    }

    #[test]
    fn test_field_rows_report_unversioned_sentinel() {
        let batch = QueryBuilder::build(Uuid::new_v4(), &ids(1), &[]).unwrap();

        assert_eq!(batch.fields.sql.matches("-1 AS version").count(), 2);
        assert!(batch.fields.sql.contains("v.version AS version"));
        assert_eq!(batch.fields.sql.matches("UNION ALL").count(), 2);
    }

    #[test]
    fn test_debug_sql_substitutes_literals() {
        let root = Uuid::new_v4();
        let batch = QueryBuilder::build(root, &[root], &[]).unwrap();

        let script = batch.debug_sql();
        assert!(script.contains(&format!("base.id = '{}'", root)));
        assert!(!batch.setup[1].debug_sql().contains('?'));
    }
}
