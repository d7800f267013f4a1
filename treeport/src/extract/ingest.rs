//! Reconstruction of nodes from batch query results
//!
//! Node metadata rows are read first and become [`Node`]s. Field rows are
//! then routed into each node's buckets according to the scope the node's
//! template declares for the field. A field row whose table disagrees with
//! the declared scope is corruption in the store: the value is dropped and
//! counted, the node is kept.

use crate::model::{FieldScope, FieldValue, Node, TemplateField};
use crate::template::TemplateFieldSource;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};
use treeport_common::uuid_utils;
use treeport_common::{Error, Result};
use uuid::Uuid;

/// Reconstructed nodes keyed by identifier
pub type NodeMap = HashMap<Uuid, Node>;

/// Template metadata already resolved, keyed by (field id, template id)
pub type TemplateCache = HashMap<(Uuid, Uuid), TemplateField>;

/// Initial capacity for the node map; batches are usually large
const NODE_MAP_CAPACITY: usize = 8087;

/// One row of the node metadata result set
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub id: Uuid,
    pub name: String,
    pub template_id: Uuid,
    pub branch_id: Uuid,
    pub parent_id: Uuid,
    /// Path relative to the root's parent, e.g. `/home/about`
    pub path: String,
}

impl NodeRow {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: parse_id(row.try_get("id")?)?,
            name: row.try_get("name")?,
            template_id: parse_id(row.try_get("template_id")?)?,
            branch_id: parse_id(row.try_get("branch_id")?)?,
            parent_id: parse_id(row.try_get("parent_id")?)?,
            path: row.try_get("item_path")?,
        })
    }
}

/// One row of the field result set
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRow {
    pub item_id: Uuid,
    /// Empty for shared rows
    pub language: String,
    pub field_id: Uuid,
    pub value: String,
    /// `-1` for shared and unversioned rows
    pub version: i64,
}

impl FieldRow {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            item_id: parse_id(row.try_get("item_id")?)?,
            language: row.try_get("language")?,
            field_id: parse_id(row.try_get("field_id")?)?,
            value: row.try_get("value")?,
            version: row.try_get("version")?,
        })
    }
}

fn parse_id(raw: String) -> Result<Uuid> {
    uuid_utils::parse(&raw)
        .map_err(|e| Error::Internal(format!("Invalid identifier '{}' in store: {}", raw, e)))
}

/// Where a field row ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPlacement {
    /// Appended to a bucket of the given scope
    Placed(FieldScope),
    /// The node's template does not declare the field; skipped
    Undeclared,
    /// The row's table disagrees with the declared scope; dropped
    Corrupt,
}

/// Outcome of one ingestion pass
#[derive(Debug)]
pub struct IngestReport {
    pub nodes: NodeMap,
    pub cache: TemplateCache,
    pub corrupt_fields: usize,
    pub undeclared_fields: usize,
}

impl IngestReport {
    /// No field was dropped as corrupt
    pub fn is_clean(&self) -> bool {
        self.corrupt_fields == 0
    }
}

/// Builds the node map for one batch
pub struct ResultIngestor {
    database: String,
    templates: Arc<dyn TemplateFieldSource>,
    cache: TemplateCache,
    nodes: NodeMap,
    corrupt_fields: usize,
    undeclared_fields: usize,
}

impl ResultIngestor {
    pub fn new(database: impl Into<String>, templates: Arc<dyn TemplateFieldSource>) -> Self {
        Self::with_cache(database, templates, TemplateCache::new())
    }

    /// Start from metadata resolved by an earlier pass
    pub fn with_cache(
        database: impl Into<String>,
        templates: Arc<dyn TemplateFieldSource>,
        cache: TemplateCache,
    ) -> Self {
        Self {
            database: database.into(),
            templates,
            cache,
            nodes: NodeMap::with_capacity(NODE_MAP_CAPACITY),
            corrupt_fields: 0,
            undeclared_fields: 0,
        }
    }

    /// Phase 1: create a node per metadata row
    ///
    /// `root_parent_path` is prefixed to every row's relative path.
    pub fn ingest_nodes<I>(&mut self, rows: I, root_parent_path: &str) -> Result<usize>
    where
        I: IntoIterator<Item = NodeRow>,
    {
        let mut count = 0;

        for row in rows {
            let mut node = Node::new(
                row.id,
                row.parent_id,
                row.template_id,
                row.name,
                format!("{}{}", root_parent_path, row.path),
                self.database.clone(),
            );
            node.branch_id = row.branch_id;

            if self.nodes.insert(node.id, node).is_some() {
                return Err(Error::Internal(format!(
                    "Item {} was returned twice by the item loader",
                    row.id
                )));
            }
            count += 1;
        }

        Ok(count)
    }

    /// Phase 2: route one field row into its node
    ///
    /// Fails only when the row's node was never ingested.
    pub fn ingest_field(&mut self, row: FieldRow) -> Result<FieldPlacement> {
        let template_id = match self.nodes.get(&row.item_id) {
            Some(node) => node.template_id,
            None => {
                return Err(Error::OrphanField {
                    item_id: row.item_id,
                    field_id: row.field_id,
                })
            }
        };

        let metadata = match self.template_field(row.field_id, template_id) {
            Some(metadata) => metadata,
            None => {
                // Usually a value left behind by a previous template; the
                // content API ignores these as well
                debug!(
                    item_id = %row.item_id,
                    field_id = %row.field_id,
                    template_id = %template_id,
                    "Skipping field not declared by template"
                );
                self.undeclared_fields += 1;
                return Ok(FieldPlacement::Undeclared);
            }
        };

        let FieldRow {
            item_id,
            language,
            field_id,
            value,
            version,
        } = row;

        let scope = metadata.scope;
        let node = match self.nodes.get_mut(&item_id) {
            Some(node) => node,
            None => return Err(Error::OrphanField { item_id, field_id }),
        };

        if !scope.accepts(&language, version) {
            let found_in = FieldScope::table_of(&language, version);
            let detail = if scope == FieldScope::Versioned && version >= 1 {
                " without a language"
            } else {
                ""
            };
            error!(
                database = %self.database,
                item_id = %item_id,
                field_id = %field_id,
                path = %node.path,
                "Data corruption in {}://{{{}}}! Field {{{}}} ({}) had a value in the {} fields table{}. The field value will be ignored.",
                self.database, item_id, field_id, scope, found_in, detail
            );
            self.corrupt_fields += 1;
            return Ok(FieldPlacement::Corrupt);
        }

        let mut field = FieldValue::new(field_id, value, language, version);
        field.name_hint = Some(metadata.name.clone());
        field.field_type = Some(metadata.field_type.clone());
        if metadata.is_blob {
            field.blob_id = uuid_utils::parse_blob_reference(&field.value);
        }

        match scope {
            FieldScope::Shared => node.shared_fields.push(field),
            FieldScope::Unversioned => {
                let language = field.language.clone();
                node.language_bucket(&language).fields.push(field);
            }
            FieldScope::Versioned => {
                let language = field.language.clone();
                node.version_bucket(&language, version).fields.push(field);
            }
        }

        Ok(FieldPlacement::Placed(scope))
    }

    /// Metadata for the pair, consulting the cache first
    fn template_field(&mut self, field_id: Uuid, template_id: Uuid) -> Option<TemplateField> {
        if let Some(field) = self.cache.get(&(field_id, template_id)) {
            return Some(field.clone());
        }

        let field = self.templates.field(field_id, template_id)?;
        self.cache.insert((field_id, template_id), field.clone());
        Some(field)
    }

    /// Give up on this pass, keeping only the resolved metadata
    pub fn into_cache(self) -> TemplateCache {
        self.cache
    }

    pub fn finish(self) -> IngestReport {
        IngestReport {
            nodes: self.nodes,
            cache: self.cache,
            corrupt_fields: self.corrupt_fields,
            undeclared_fields: self.undeclared_fields,
        }
    }
}
