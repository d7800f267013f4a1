//! Applying nodes to the store
//!
//! [`SqliteNodeInstaller`] writes a node into the same four tables the
//! extractor reads: the item row is upserted and the node's field values
//! replace whatever the store held for it. Each node is its own transaction.
//!
//! Excluded fields belong to the target store: they are neither written nor
//! cleared, so a target keeps its own lock, owner and update stamps.

use crate::fanout::bulk;
use crate::filter::FieldFilter;
use crate::model::Node;
use sqlx::{SqliteConnection, SqlitePool};
use tokio::runtime::Handle;
use tracing::{debug, warn};
use treeport_common::events::{EventBus, TreeEvent};
use treeport_common::uuid_utils::{self, to_db};
use treeport_common::{Error, Result};

/// Per-call install behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Allow a sibling with the same name but a different id
    pub allow_duplicate_names: bool,
}

/// Applies one node to a content store
///
/// Called from fan-out worker threads, never from async tasks.
pub trait NodeInstaller: Send + Sync {
    fn install(&self, node: &Node, options: &InstallOptions) -> Result<()>;
}

/// Installs nodes into the SQLite content schema
pub struct SqliteNodeInstaller {
    pool: SqlitePool,
    runtime: Handle,
    filter: FieldFilter,
    events: Option<EventBus>,
}

impl SqliteNodeInstaller {
    /// `runtime` drives the database calls made from worker threads
    ///
    /// Uses the default field filter; see [`Self::with_filter`].
    pub fn new(pool: SqlitePool, runtime: Handle) -> Self {
        Self {
            pool,
            runtime,
            filter: FieldFilter::default(),
            events: None,
        }
    }

    /// Fields left untouched in the target
    pub fn with_filter(mut self, filter: FieldFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Write `node` in a single transaction
    ///
    /// Bulk-mode flags are read from the calling thread.
    pub async fn install_async(&self, node: &Node, options: &InstallOptions) -> Result<()> {
        if node.name.is_empty() {
            return Err(Error::InvalidInput(format!("Item {} has no name", node.id)));
        }

        let mut conn = self.pool.acquire().await?;

        // Take the write lock up front; a deferred transaction cannot wait for it
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let committed = match write_node(&mut conn, node, &self.filter, options).await {
            Ok(written) => match sqlx::query("COMMIT").execute(&mut *conn).await {
                Ok(_) => Ok(written),
                Err(e) => Err(Error::from(e)),
            },
            Err(e) => Err(e),
        };

        match committed {
            Ok(written) => {
                debug!(item_id = %node.id, path = %node.path, fields = written, "Installed item");
            }
            Err(e) => {
                // The connection goes back to the pool; it must not stay inside a transaction
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    warn!(item_id = %node.id, error = %rollback, "Rollback failed");
                }
                return Err(e);
            }
        }

        if !bulk::current().suppress_events {
            if let Some(events) = &self.events {
                events.emit_lossy(TreeEvent::NodeInstalled {
                    item_id: node.id,
                    path: node.path.clone(),
                    database: node.database.clone(),
                });
            }
        }

        Ok(())
    }
}

impl NodeInstaller for SqliteNodeInstaller {
    fn install(&self, node: &Node, options: &InstallOptions) -> Result<()> {
        self.runtime.block_on(self.install_async(node, options))
    }
}

/// Item row and field rows for one node; returns the number of field rows
async fn write_node(
    conn: &mut SqliteConnection,
    node: &Node,
    filter: &FieldFilter,
    options: &InstallOptions,
) -> Result<usize> {
    let id = to_db(&node.id);
    let parent_id = to_db(&node.parent_id);

    if !options.allow_duplicate_names {
        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM items WHERE parent_id = ? AND name = ? AND id <> ? LIMIT 1",
        )
        .bind(&parent_id)
        .bind(&node.name)
        .bind(&id)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(existing) = existing {
            return Err(Error::DuplicateName {
                name: node.name.clone(),
                parent_id: node.parent_id,
                existing_id: uuid_utils::parse(&existing)
                    .map_err(|e| Error::Internal(format!("Invalid identifier '{}' in store: {}", existing, e)))?,
            });
        }
    }

    sqlx::query(
        r#"
        INSERT INTO items (id, name, template_id, branch_id, parent_id)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            template_id = excluded.template_id,
            branch_id = excluded.branch_id,
            parent_id = excluded.parent_id
        "#,
    )
    .bind(&id)
    .bind(&node.name)
    .bind(to_db(&node.template_id))
    .bind(to_db(&node.branch_id))
    .bind(&parent_id)
    .execute(&mut *conn)
    .await?;

    let excludes = filter.sorted_excludes();
    let keep_excluded = if excludes.is_empty() {
        String::new()
    } else {
        format!(" AND field_id NOT IN ({})", vec!["?"; excludes.len()].join(", "))
    };

    for table in ["shared_fields", "unversioned_fields", "versioned_fields"] {
        let sql = format!("DELETE FROM {} WHERE item_id = ?{}", table, keep_excluded);
        let mut query = sqlx::query(&sql).bind(&id);
        for field_id in &excludes {
            query = query.bind(to_db(field_id));
        }
        query.execute(&mut *conn).await?;
    }

    let mut written = 0;

    for field in node.shared_fields.iter().filter(|f| !filter.is_excluded(&f.field_id)) {
        sqlx::query("INSERT OR REPLACE INTO shared_fields (item_id, field_id, value) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(to_db(&field.field_id))
            .bind(&field.value)
            .execute(&mut *conn)
            .await?;
        written += 1;
    }

    for bucket in &node.unversioned_fields {
        for field in bucket.fields.iter().filter(|f| !filter.is_excluded(&f.field_id)) {
            sqlx::query(
                "INSERT OR REPLACE INTO unversioned_fields (item_id, language, field_id, value) VALUES (?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&bucket.language)
            .bind(to_db(&field.field_id))
            .bind(&field.value)
            .execute(&mut *conn)
            .await?;
            written += 1;
        }
    }

    for bucket in &node.versions {
        for field in bucket.fields.iter().filter(|f| !filter.is_excluded(&f.field_id)) {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO versioned_fields (item_id, language, version, field_id, value)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&bucket.language)
            .bind(bucket.version)
            .bind(to_db(&field.field_id))
            .bind(&field.value)
            .execute(&mut *conn)
            .await?;
            written += 1;
        }
    }

    Ok(written)
}
