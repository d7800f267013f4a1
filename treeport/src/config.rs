//! Settings resolution for the treeport binary
//!
//! Combines command-line arguments with the bootstrap TOML configuration
//! from `treeport-common` and builds the field filter and template metadata
//! the extractor needs. The TOML file is read first so its log level can
//! configure tracing; [`Settings::from_toml`] logs and must run after that.

use crate::filter::FieldFilter;
use crate::template::TemplateFieldMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use treeport_common::config::{self, FieldFilterConfig, TomlConfig};
use treeport_common::Result;

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: PathBuf,
    pub database_name: String,
    pub log_level: String,
    pub filter: FieldFilter,
    pub templates: TemplateFieldMap,
}

impl Settings {
    pub fn from_toml(toml: &TomlConfig, database_path: Option<&Path>) -> Result<Self> {
        Ok(Self {
            database_path: config::resolve_database_path(database_path, toml),
            database_name: toml.database_name.clone(),
            log_level: toml.logging.level.clone(),
            filter: field_filter(&toml.field_filter),
            templates: template_fields(toml.template_fields.as_deref())?,
        })
    }
}

/// Configured exclusion list, or the built-in one
pub fn field_filter(config: &FieldFilterConfig) -> FieldFilter {
    match &config.excludes {
        Some(excludes) => FieldFilter::with_excludes(excludes.iter().copied()),
        None => FieldFilter::default(),
    }
}

/// Template metadata from the configured file
///
/// Without a file every field is undeclared and extraction yields nodes
/// with empty buckets.
pub fn template_fields(path: Option<&Path>) -> Result<TemplateFieldMap> {
    match path {
        Some(path) => {
            let map = TemplateFieldMap::from_json_file(path)?;
            info!(path = %path.display(), fields = map.len(), "Loaded template field metadata");
            Ok(map)
        }
        None => {
            warn!("No template field metadata configured; extracted nodes will carry no fields");
            Ok(TemplateFieldMap::new())
        }
    }
}
