//! Tenant Backup Library
//!
//! Online backups of per-tenant SQLite databases: rotating local
//! generations, timestamped archive copies and archive retention.

pub mod archive;
pub mod config;
pub mod copier;
pub mod daemon;
pub mod generations;
pub mod orchestrator;
pub mod runner;
pub mod tenants;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use orchestrator::{Orchestrator, RunReport};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
