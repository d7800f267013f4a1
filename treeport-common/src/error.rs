//! Common error types for treeport

use thiserror::Error;
use uuid::Uuid;

/// Common result type for treeport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across treeport crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Node (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A field row arrived for a node the batch query never returned.
    ///
    /// The field query is joined against the node query, so this means the
    /// batch itself is broken, not the stored data.
    #[error("Item {item_id} was not read by the item loader but had field {field_id} in the field loader")]
    OrphanField { item_id: Uuid, field_id: Uuid },

    /// Another node already uses this name under the same parent
    #[error("Duplicate name '{name}' under parent {parent_id} (existing item {existing_id})")]
    DuplicateName {
        name: String,
        parent_id: Uuid,
        existing_id: Uuid,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
