//! Database initialization for the content tree store

pub mod init;

pub use init::*;
