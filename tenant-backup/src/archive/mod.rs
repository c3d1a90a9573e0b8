//! Durable archive of swept backups.
//!
//! Archived copies live in an environment- and tenant-specific directory,
//! named after the recorded time of the generation they were swept from:
//!
//! ```text
//! /backups/production/12345678/main.sqlite3.20251014194804
//! ```

pub mod retention;
pub mod sweep;
pub mod timestamp;

pub use retention::{enforce, RetentionOutcome};
pub use sweep::{sweep, SweepOutcome};

use std::path::{Path, PathBuf};

/// Where archives for one environment are kept
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    pub sweep_root: PathBuf,
    pub environment: String,
}

impl ArchiveLayout {
    pub fn new(sweep_root: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            sweep_root: sweep_root.into(),
            environment: environment.into(),
        }
    }

    /// `<sweep_root>/<environment>/<tenant>`
    pub fn tenant_dir(&self, tenant_id: &str) -> PathBuf {
        self.sweep_root.join(&self.environment).join(tenant_id)
    }

    /// The root must be an existing, writable directory
    pub fn is_usable(&self) -> bool {
        self.sweep_root.is_dir() && is_writable(&self.sweep_root)
    }
}

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};
    access(path, AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}
