//! Test Helper Utilities
//!
//! Shared utilities for testing treeport

#![allow(dead_code)]

pub mod db_utils;
pub mod log_capture;

// Re-export commonly used items
pub use db_utils::{
    count_rows, create_test_db, get_table_names, insert_item, insert_shared_field,
    insert_unversioned_field, insert_versioned_field,
};
pub use log_capture::{init_test_logging, LogCapture};
