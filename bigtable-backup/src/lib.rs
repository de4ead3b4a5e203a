//! Bigtable Backup Library
//!
//! Creates, lists, restores and deletes Cloud Bigtable backups stored in Cloud
//! Storage, using the Dataflow SequenceFile export/import templates.

pub mod commands;
pub mod config;
pub mod gcp;
pub mod index;
pub mod job;
pub mod paginate;
pub mod paths;
pub mod shutdown;
pub mod tables;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::{BackupError, Result};
