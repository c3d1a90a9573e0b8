//! Tenant enumeration.
//!
//! Tenants are laid out one directory each, with the database at a fixed
//! relative path:
//!
//! ```text
//! storage/tenants/development/12345678/db/
//! ├─ main.sqlite3
//! ├─ main.sqlite3.1
//! └─ main.sqlite3.2
//! ```

use crate::config::Config;
use crate::copier::{LiveDatabase, SqliteDatabase};
use crate::utils::errors::{BackupError, Result};
use std::path::{Path, PathBuf};

/// One independent database and backup namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub id: String,
    pub db_path: PathBuf,
}

impl Tenant {
    pub fn new(id: impl Into<String>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            db_path: db_path.into(),
        }
    }
}

/// Supplies tenants and a live connection to each.
pub trait TenantSource {
    fn tenants(&self) -> Result<Vec<Tenant>>;

    fn connect(&self, tenant: &Tenant) -> Result<Box<dyn LiveDatabase>>;
}

/// Tenants discovered under `<root>/<environment>/<tenant>/<db_file>`
#[derive(Debug, Clone)]
pub struct DirectoryTenants {
    root: PathBuf,
    db_file: PathBuf,
}

impl DirectoryTenants {
    pub fn new(tenants_root: &Path, environment: &str, db_file: &Path) -> Self {
        Self {
            root: tenants_root.join(environment),
            db_file: db_file.to_path_buf(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.tenants.root,
            &config.backup.environment,
            &config.tenants.db_file,
        )
    }
}

impl TenantSource for DirectoryTenants {
    fn tenants(&self) -> Result<Vec<Tenant>> {
        if !self.root.is_dir() {
            return Err(BackupError::Config(format!(
                "tenants root {} is not a directory",
                self.root.display()
            )));
        }

        let mut tenants = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let Some(id) = entry.file_name().to_str().map(str::to_owned) else {
                tracing::warn!(path = %entry.path().display(), "Skipping tenant directory with non UTF-8 name");
                continue;
            };

            let db_path = entry.path().join(&self.db_file);
            if db_path.is_file() {
                tenants.push(Tenant { id, db_path });
            } else {
                tracing::debug!(tenant = %id, path = %db_path.display(), "No database, skipping");
            }
        }

        tenants.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tenants)
    }

    fn connect(&self, tenant: &Tenant) -> Result<Box<dyn LiveDatabase>> {
        Ok(Box::new(SqliteDatabase::open(&tenant.db_path)?))
    }
}
