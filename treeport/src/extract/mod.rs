//! Subtree extraction
//!
//! [`SqlNodeExtractor`] runs one batch at a time: the batch query and the
//! ingestion of its results happen under an exclusive lock, on a single
//! pooled connection (the batch's temporary table is per connection).
//! Field rows are streamed off the cursor into a separate ingestion task
//! rather than collected first.

pub mod ingest;
pub mod query;

use crate::filter::FieldFilter;
use crate::model::Node;
use crate::template::TemplateFieldSource;
use futures::TryStreamExt;
use ingest::{FieldRow, IngestReport, NodeRow, ResultIngestor, TemplateCache};
use query::{BatchQuery, QueryBuilder};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, trace, warn};
use treeport_common::uuid_utils::to_db;
use treeport_common::{Error, Result};
use uuid::Uuid;

/// Field rows buffered between the cursor and the ingestion task
const FIELD_CHANNEL_CAPACITY: usize = 1024;

/// Ancestor walks deeper than this are treated as a parent cycle
const MAX_TREE_DEPTH: i64 = 1024;

/// Nodes reconstructed by one batch
#[derive(Debug)]
pub struct Extraction {
    pub nodes: Vec<Node>,
    pub corrupt_fields: usize,
    pub undeclared_fields: usize,
}

impl Extraction {
    pub fn is_clean(&self) -> bool {
        self.corrupt_fields == 0
    }
}

/// State guarded by the extractor lock
#[derive(Default)]
struct ExtractorState {
    /// Template metadata resolved by earlier batches; never invalidated
    template_cache: TemplateCache,
    last_nodes: usize,
}

/// Reads subtrees out of the SQLite content store
pub struct SqlNodeExtractor {
    pool: SqlitePool,
    database: String,
    templates: Arc<dyn TemplateFieldSource>,
    filter: FieldFilter,
    state: Mutex<ExtractorState>,
}

impl SqlNodeExtractor {
    pub fn new(
        pool: SqlitePool,
        database: impl Into<String>,
        templates: Arc<dyn TemplateFieldSource>,
        filter: FieldFilter,
    ) -> Self {
        Self {
            pool,
            database: database.into(),
            templates,
            filter,
            state: Mutex::new(ExtractorState::default()),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn filter(&self) -> &FieldFilter {
        &self.filter
    }

    /// Template metadata entries cached so far
    pub async fn cached_template_fields(&self) -> usize {
        self.state.lock().await.template_cache.len()
    }

    /// Nodes returned by the most recent batch
    pub async fn last_batch_size(&self) -> usize {
        self.state.lock().await.last_nodes
    }

    /// Path of the parent of `root_id`
    ///
    /// `Some("")` for a top-level node, `None` when the node does not exist.
    pub async fn resolve_parent_path(&self, root_id: Uuid) -> Result<Option<String>> {
        let ancestors: Vec<(String, i64)> = sqlx::query_as(
            r#"
            WITH RECURSIVE ancestors (id, name, parent_id, depth) AS (
                SELECT id, name, parent_id, 0
                FROM items
                WHERE id = ?

                UNION ALL

                SELECT parent.id, parent.name, parent.parent_id, child.depth + 1
                FROM ancestors AS child
                INNER JOIN items AS parent
                    ON parent.id = child.parent_id
                WHERE child.depth < ?
            )
            SELECT name, depth
            FROM ancestors
            ORDER BY depth DESC
            "#,
        )
        .bind(to_db(&root_id))
        .bind(MAX_TREE_DEPTH)
        .fetch_all(&self.pool)
        .await?;

        if ancestors.is_empty() {
            return Ok(None);
        }

        if ancestors.iter().any(|(_, depth)| *depth >= MAX_TREE_DEPTH) {
            return Err(Error::Internal(format!(
                "Ancestors of item {} form a cycle or exceed {} levels",
                root_id, MAX_TREE_DEPTH
            )));
        }

        let path = ancestors
            .iter()
            .filter(|(_, depth)| *depth > 0)
            .map(|(name, _)| format!("/{}", name))
            .collect::<String>();

        Ok(Some(path))
    }

    /// Reconstruct the requested nodes of the subtree under `root_id`
    ///
    /// `root_parent_path` is prefixed to every node path, see
    /// [`Self::resolve_parent_path`].
    pub async fn extract(&self, root_id: Uuid, requested_ids: &[Uuid], root_parent_path: &str) -> Result<Extraction> {
        let batch = QueryBuilder::build(root_id, requested_ids, &self.filter.sorted_excludes())?;
        trace!(sql = %batch.debug_sql(), "Subtree batch");

        let mut state = self.state.lock().await;
        let mut conn = self.pool.acquire().await?;

        for statement in &batch.setup {
            statement.query().execute(&mut *conn).await?;
        }

        let result = self
            .run_batch(&mut conn, &batch, root_parent_path, &mut state)
            .await;

        if let Err(e) = batch.teardown.query().execute(&mut *conn).await {
            warn!(error = %e, "Failed to drop batch table");
        }

        let report = result?;

        info!(
            database = %self.database,
            root_id = %root_id,
            requested = requested_ids.len(),
            nodes = report.nodes.len(),
            corrupt_fields = report.corrupt_fields,
            undeclared_fields = report.undeclared_fields,
            "Subtree batch ingested"
        );
        if !report.is_clean() {
            warn!(
                database = %self.database,
                corrupt_fields = report.corrupt_fields,
                "Batch contained corrupt field values; they were left out"
            );
        }

        state.last_nodes = report.nodes.len();

        Ok(Extraction {
            nodes: report.nodes.into_values().collect(),
            corrupt_fields: report.corrupt_fields,
            undeclared_fields: report.undeclared_fields,
        })
    }

    async fn run_batch(
        &self,
        conn: &mut SqliteConnection,
        batch: &BatchQuery,
        root_parent_path: &str,
        state: &mut ExtractorState,
    ) -> Result<IngestReport> {
        let rows = batch.nodes.query().fetch_all(&mut *conn).await?;
        let node_rows = rows.iter().map(NodeRow::from_row).collect::<Result<Vec<_>>>()?;

        let mut ingestor = ResultIngestor::with_cache(
            self.database.clone(),
            Arc::clone(&self.templates),
            std::mem::take(&mut state.template_cache),
        );
        let node_count = match ingestor.ingest_nodes(node_rows, root_parent_path) {
            Ok(count) => count,
            Err(e) => {
                state.template_cache = ingestor.into_cache();
                return Err(e);
            }
        };
        debug!(nodes = node_count, "Node metadata ingested");

        // The ingestor comes back even when a row fails so the cache survives
        let (tx, mut rx) = mpsc::channel::<FieldRow>(FIELD_CHANNEL_CAPACITY);
        let ingestion = tokio::spawn(async move {
            let mut failure = None;
            while let Some(row) = rx.recv().await {
                if let Err(e) = ingestor.ingest_field(row) {
                    failure = Some(e);
                    break;
                }
            }
            (ingestor, failure)
        });

        let streamed: Result<usize> = async {
            let mut count = 0;
            let mut rows = batch.fields.query().fetch(&mut *conn);
            while let Some(row) = rows.try_next().await? {
                // A closed channel means ingestion failed; its error is reported below
                if tx.send(FieldRow::from_row(&row)?).await.is_err() {
                    break;
                }
                count += 1;
            }
            Ok::<_, Error>(count)
        }
        .await;
        drop(tx);

        let (ingestor, failure) = ingestion
            .await
            .map_err(|e| Error::Internal(format!("Field ingestion task failed: {}", e)))?;
        let mut report = ingestor.finish();
        state.template_cache = std::mem::take(&mut report.cache);

        if let Some(e) = failure {
            return Err(e);
        }
        let field_rows = streamed?;
        debug!(field_rows, "Field rows ingested");

        Ok(report)
    }
}
