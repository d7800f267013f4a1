//! Node (de)serialization
//!
//! The on-disk grammar is the formatter's business. [`JsonFormatter`] is the
//! one shipped: pretty-printed JSON of the [`Node`] record.

use crate::filter::FieldFilter;
use crate::model::Node;
use std::io::{Read, Write};
use treeport_common::Result;

/// Converts nodes to and from a portable text form
pub trait Formatter: Send + Sync {
    fn write_node(&self, node: &Node, writer: &mut dyn Write) -> Result<()>;

    fn read_node(&self, reader: &mut dyn Read) -> Result<Node>;

    /// Extension used for files holding one node
    fn file_extension(&self) -> &'static str;
}

/// JSON formatter
///
/// Fields excluded by the filter are left out of the output entirely.
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    filter: FieldFilter,
}

impl JsonFormatter {
    pub fn new(filter: FieldFilter) -> Self {
        Self { filter }
    }

    fn filtered(&self, node: &Node) -> Node {
        let mut node = node.clone();
        let filter = &self.filter;

        node.shared_fields.retain(|field| !filter.is_excluded(&field.field_id));
        for bucket in &mut node.unversioned_fields {
            bucket.fields.retain(|field| !filter.is_excluded(&field.field_id));
        }
        for bucket in &mut node.versions {
            bucket.fields.retain(|field| !filter.is_excluded(&field.field_id));
        }

        node
    }
}

impl Formatter for JsonFormatter {
    fn write_node(&self, node: &Node, writer: &mut dyn Write) -> Result<()> {
        serde_json::to_writer_pretty(&mut *writer, &self.filtered(node))?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    fn read_node(&self, reader: &mut dyn Read) -> Result<Node> {
        Ok(serde_json::from_reader(reader)?)
    }

    fn file_extension(&self) -> &'static str {
        "json"
    }
}
