//! Custom error types for the backup tool.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No tables found with prefix {0}")]
    NoTablesFound(String),

    #[error("No backups found for table {0}")]
    NoBackupsFound(String),

    #[error("Error submitting job for table {table_id}: {source}")]
    Submission {
        table_id: String,
        #[source]
        source: Box<BackupError>,
    },

    #[error("Job {job_id} finished in state {state}")]
    JobFailed { job_id: String, state: String },

    #[error("Job {job_id} reported unrecognized state {state} {count} times in a row")]
    UnrecognizedState {
        job_id: String,
        state: String,
        count: u32,
    },

    #[error("Timed out waiting for job {0}")]
    DeadlineExceeded(String),

    #[error("Cancelled {0}")]
    Cancelled(String),

    #[error("Backup failed for tables: {}", .0.join(", "))]
    BatchFailed(Vec<String>),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("API error: HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// Wrap an error raised while submitting the job for `table_id`.
    pub fn submission(table_id: &str, source: BackupError) -> Self {
        BackupError::Submission {
            table_id: table_id.to_string(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
