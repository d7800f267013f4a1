//! Template field metadata
//!
//! The extractor needs to know, for every (field, template) pair it reads,
//! which scope the template declares for the field and whether the value is
//! a blob reference. Where that metadata comes from is up to the caller.

use crate::model::{FieldScope, TemplateField};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use treeport_common::{Error, Result};
use uuid::Uuid;

/// Source of template field metadata
pub trait TemplateFieldSource: Send + Sync {
    /// Metadata for `field_id` as declared by `template_id`, if declared
    fn field(&self, field_id: Uuid, template_id: Uuid) -> Option<TemplateField>;
}

/// In-memory template metadata keyed by (field id, template id)
#[derive(Debug, Clone, Default)]
pub struct TemplateFieldMap {
    fields: HashMap<(Uuid, Uuid), TemplateField>,
}

/// One entry of a template metadata file
#[derive(Debug, Clone, Deserialize)]
struct TemplateFieldEntry {
    field_id: Uuid,
    template_id: Uuid,
    name: String,
    #[serde(default = "default_field_type")]
    field_type: String,
    scope: FieldScope,
    #[serde(default)]
    is_blob: bool,
}

fn default_field_type() -> String {
    "Single-Line Text".to_string()
}

impl TemplateFieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `field_id` on `template_id`
    pub fn insert(&mut self, field_id: Uuid, template_id: Uuid, field: TemplateField) {
        self.fields.insert((field_id, template_id), field);
    }

    /// Builder-style declaration of a non-blob field
    pub fn declare(mut self, field_id: Uuid, template_id: Uuid, name: &str, scope: FieldScope) -> Self {
        self.insert(
            field_id,
            template_id,
            TemplateField {
                name: name.to_string(),
                field_type: default_field_type(),
                scope,
                is_blob: false,
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse a JSON array of field declarations
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<TemplateFieldEntry> = serde_json::from_str(json)?;

        let mut map = Self::new();
        for entry in entries {
            map.insert(
                entry.field_id,
                entry.template_id,
                TemplateField {
                    name: entry.name,
                    field_type: entry.field_type,
                    scope: entry.scope,
                    is_blob: entry.is_blob,
                },
            );
        }

        Ok(map)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}

impl TemplateFieldSource for TemplateFieldMap {
    fn field(&self, field_id: Uuid, template_id: Uuid) -> Option<TemplateField> {
        self.fields.get(&(field_id, template_id)).cloned()
    }
}
