//! Configuration management for the backup job.
//!
//! Loads configuration from a TOML file, then applies environment variable
//! overrides (a `.env` file is honoured when present).

use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub tenants: TenantsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Number of local generations kept next to each database
    #[serde(default = "default_keep")]
    pub keep: usize,

    /// Pages copied per backup step
    #[serde(default = "default_step_pages")]
    pub step_pages: u32,

    /// Archive root, usually a network mount
    #[serde(default = "default_sweep_root")]
    pub sweep_root: PathBuf,

    /// Archived copies older than this are removed
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    /// Deployment environment, used as the first archive path segment
    #[serde(default = "default_environment")]
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Consecutive busy/locked steps tolerated before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Wall-clock budget for one tenant's copy loop
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantsConfig {
    /// Directory holding `<environment>/<tenant>/` trees
    #[serde(default = "default_tenants_root")]
    pub root: PathBuf,

    /// Database path relative to each tenant directory
    #[serde(default = "default_db_file")]
    pub db_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Cron expression (with seconds) for daemon mode
    #[serde(default = "default_cron")]
    pub cron: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_keep() -> usize {
    5
}

fn default_step_pages() -> u32 {
    1024
}

fn default_sweep_root() -> PathBuf {
    PathBuf::from("/backups")
}

fn default_retention_days() -> u64 {
    30
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_max_retries() -> u32 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    10
}

fn default_max_backoff_ms() -> u64 {
    1000
}

fn default_deadline_secs() -> u64 {
    600
}

fn default_tenants_root() -> PathBuf {
    PathBuf::from("storage/tenants")
}

fn default_db_file() -> PathBuf {
    PathBuf::from("db/main.sqlite3")
}

fn default_cron() -> String {
    // hourly, on the hour
    "0 0 * * * *".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            keep: default_keep(),
            step_pages: default_step_pages(),
            sweep_root: default_sweep_root(),
            retention_days: default_retention_days(),
            environment: default_environment(),
        }
    }
}

impl BackupConfig {
    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(SECS_PER_DAY))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

impl Default for TenantsConfig {
    fn default() -> Self {
        Self {
            root: default_tenants_root(),
            db_file: default_db_file(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { cron: default_cron() }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| BackupError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from `path` if given, otherwise defaults, then apply env overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BACKUP_*` / `LOG_LEVEL` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BACKUP_ENV") {
            self.backup.environment = v;
        }
        if let Some(v) = lookup("BACKUP_SWEEP_ROOT") {
            self.backup.sweep_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("BACKUP_TENANTS_ROOT") {
            self.tenants.root = PathBuf::from(v);
        }
        if let Some(v) = lookup("BACKUP_KEEP") {
            self.backup.keep = parse_var("BACKUP_KEEP", &v)?;
        }
        if let Some(v) = lookup("BACKUP_STEP_PAGES") {
            self.backup.step_pages = parse_var("BACKUP_STEP_PAGES", &v)?;
        }
        if let Some(v) = lookup("BACKUP_RETENTION_DAYS") {
            self.backup.retention_days = parse_var("BACKUP_RETENTION_DAYS", &v)?;
        }
        if let Some(v) = lookup("BACKUP_SCHEDULE") {
            self.schedule.cron = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log.level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.backup.keep == 0 {
            return Err(BackupError::Config("keep must be at least 1".into()));
        }
        if self.backup.step_pages == 0 {
            return Err(BackupError::Config("step_pages must be at least 1".into()));
        }
        if i32::try_from(self.backup.step_pages).is_err() {
            return Err(BackupError::Config(format!(
                "step_pages must not exceed {}",
                i32::MAX
            )));
        }
        if self.retry.max_retries == 0 {
            return Err(BackupError::Config("max_retries must be at least 1".into()));
        }
        if self.backup.environment.trim().is_empty() {
            return Err(BackupError::Config("environment must not be empty".into()));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BackupError::Config(format!("{key}: invalid value {value:?}")))
}
