//! # treeport
//!
//! Bulk transfer of content subtrees between a SQLite content store and
//! portable node files.
//!
//! - [`extract`] rebuilds nodes from the item table and the three
//!   scope-partitioned field tables
//! - [`fanout`] serializes or installs a batch of nodes on a small pool of
//!   worker threads
//! - [`transfer::BulkTransfer`] ties both together

pub mod config;
pub mod extract;
pub mod fanout;
pub mod filter;
pub mod format;
pub mod install;
pub mod model;
pub mod template;
pub mod transfer;

pub use extract::SqlNodeExtractor;
pub use filter::FieldFilter;
pub use format::{Formatter, JsonFormatter};
pub use install::{InstallOptions, NodeInstaller, SqliteNodeInstaller};
pub use model::{FieldScope, FieldValue, Node};
pub use template::{TemplateFieldMap, TemplateFieldSource};
pub use transfer::BulkTransfer;
