//! Shared library for the manga tagger.
//!
//! This crate provides common functionality used by the tagger:
//! - Configuration management
//! - Database schema and the processed-file / metadata ledger
//! - Library path layout
//! - Logging infrastructure
//! - Shared data models

pub mod config;
pub mod db;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod paths;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use ledger::{Ledger, LedgerStats, MetadataLookup};
pub use logging::LogConfig;
pub use models::*;
pub use paths::LibraryPaths;

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
