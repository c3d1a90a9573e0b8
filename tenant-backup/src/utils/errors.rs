//! Custom error types for the backup job.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Copy failed: {0}")]
    CopyFailed(String),

    #[error("Source still busy after {attempts} retries")]
    RetriesExhausted { attempts: u32 },

    #[error("Source still busy after the {deadline:?} deadline")]
    DeadlineExceeded { deadline: std::time::Duration },

    #[error("Backup cancelled")]
    Cancelled,

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("failed to backup tenants: {}", .0.join(", "))]
    TenantsFailed(Vec<String>),
}

pub type Result<T> = std::result::Result<T, BackupError>;
