//! Bulk extract and install entry points
//!
//! Both operations end in the fan-out pool. Extraction first rebuilds the
//! requested nodes under the extractor lock and then serializes them in
//! parallel; installation hands caller-supplied nodes straight to the pool.
//! The pool blocks, so it runs on the blocking thread pool.

use crate::extract::SqlNodeExtractor;
use crate::fanout::bulk::BulkMode;
use crate::fanout::{FanoutOutcome, FanoutPool};
use crate::format::Formatter;
use crate::install::{InstallOptions, NodeInstaller};
use crate::model::Node;
use std::sync::Arc;
use tracing::{info, warn};
use treeport_common::events::{BatchOperation, EventBus, TreeEvent};
use treeport_common::{Error, Result};
use uuid::Uuid;

/// One serialized node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedNode {
    pub id: Uuid,
    pub path: String,
    pub text: String,
}

/// Bulk transfer of content subtrees
pub struct BulkTransfer {
    extractor: Arc<SqlNodeExtractor>,
    installer: Arc<dyn NodeInstaller>,
    formatter: Arc<dyn Formatter>,
    events: Option<EventBus>,
}

impl BulkTransfer {
    pub fn new(
        extractor: Arc<SqlNodeExtractor>,
        installer: Arc<dyn NodeInstaller>,
        formatter: Arc<dyn Formatter>,
    ) -> Self {
        Self {
            extractor,
            installer,
            formatter,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn extractor(&self) -> &SqlNodeExtractor {
        &self.extractor
    }

    pub fn formatter(&self) -> &dyn Formatter {
        self.formatter.as_ref()
    }

    /// Serialize the nodes of `requested_ids` found in the subtree of `root_id`
    ///
    /// Output order is unspecified. Identifiers outside the subtree are
    /// silently left out.
    pub async fn extract_subtree(&self, root_id: Uuid, requested_ids: &[Uuid]) -> Result<Vec<String>> {
        let serialized = self.serialize_subtree(root_id, requested_ids).await?;
        Ok(serialized.into_iter().map(|node| node.text).collect())
    }

    /// Same as [`Self::extract_subtree`], keeping each text's node identity
    pub async fn serialize_subtree(&self, root_id: Uuid, requested_ids: &[Uuid]) -> Result<Vec<SerializedNode>> {
        if root_id.is_nil() || requested_ids.is_empty() {
            return Ok(Vec::new());
        }

        let root_parent_path = match self.extractor.resolve_parent_path(root_id).await? {
            Some(path) => path,
            None => {
                warn!(root_id = %root_id, "Root item not found; nothing to extract");
                return Ok(Vec::new());
            }
        };

        let extraction = self
            .extractor
            .extract(root_id, requested_ids, &root_parent_path)
            .await?;

        let formatter = Arc::clone(&self.formatter);
        let outcome = run_blocking(move || {
            FanoutPool::new("extract", BulkMode::extraction()).run(extraction.nodes, |node: Node| {
                let mut out = Vec::new();
                formatter.write_node(&node, &mut out)?;
                let text = String::from_utf8(out)?;

                if text.trim().is_empty() {
                    return Ok(None);
                }
                Ok(Some(SerializedNode {
                    id: node.id,
                    path: node.path,
                    text,
                }))
            })
        })
        .await?;

        self.announce(BatchOperation::Extract, &outcome);
        Ok(outcome.results)
    }

    /// Apply `nodes` to the store; returns how many were installed
    ///
    /// A failing node is logged and does not stop the others.
    pub async fn install_batch(&self, nodes: Vec<Node>) -> Result<usize> {
        if nodes.is_empty() {
            return Ok(0);
        }

        let installer = Arc::clone(&self.installer);
        let outcome = run_blocking(move || {
            let options = InstallOptions {
                allow_duplicate_names: true,
            };

            FanoutPool::new("install", BulkMode::installation()).run(nodes, |node: Node| {
                info!(item_id = %node.id, path = %node.path, "Installing {}", node.path);
                installer.install(&node, &options)?;
                Ok(Some(()))
            })
        })
        .await?;

        self.announce(BatchOperation::Install, &outcome);
        Ok(outcome.succeeded)
    }

    fn announce<R>(&self, operation: BatchOperation, outcome: &FanoutOutcome<R>) {
        if let Some(events) = &self.events {
            events.emit_lossy(TreeEvent::BatchCompleted {
                operation,
                succeeded: outcome.succeeded,
                failed: outcome.failed,
            });
        }
    }
}

async fn run_blocking<R, F>(work: F) -> Result<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Internal(format!("Fan-out task failed: {}", e)))
}
