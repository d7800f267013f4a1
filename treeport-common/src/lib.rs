//! # treeport common library
//!
//! Shared code for the treeport content-tree migration tooling:
//! - Error type and result alias
//! - Bootstrap configuration (TOML + environment)
//! - Database initialization for the content tree schema
//! - Change notifications
//! - Identifier helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod uuid_utils;

pub use error::{Error, Result};
