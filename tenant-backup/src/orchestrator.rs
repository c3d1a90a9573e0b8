//! Runs rotation, backup, sweep and retention for every tenant.
//!
//! A tenant's failure is recorded and the run moves on to the next tenant;
//! the aggregate outcome is only decided once every tenant was attempted.

use crate::archive::{self, ArchiveLayout, RetentionOutcome, SweepOutcome};
use crate::config::Config;
use crate::generations;
use crate::runner::{BackupRunner, RetryPolicy};
use crate::tenants::{Tenant, TenantSource};
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantFailure {
    pub tenant: String,
    pub reason: String,
}

/// Tenants that hit a terminal error during one run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct FailureSet {
    failures: Vec<TenantFailure>,
}

impl FailureSet {
    pub fn record(&mut self, tenant: &str, error: &BackupError) {
        self.failures.push(TenantFailure {
            tenant: tenant.to_string(),
            reason: error.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn tenant_ids(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.tenant.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TenantFailure> {
        self.failures.iter()
    }
}

/// Outcome of one orchestration run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub succeeded: Vec<String>,
    pub failed: FailureSet,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Error naming every failed tenant, if any
    pub fn into_result(self) -> Result<RunReport> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(BackupError::TenantsFailed(self.failed.tenant_ids()))
        }
    }
}

pub struct Orchestrator {
    keep: usize,
    step_pages: u32,
    retention_window: Duration,
    layout: ArchiveLayout,
    runner: BackupRunner,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: &Config, cancel: CancellationToken) -> Self {
        Self {
            keep: config.backup.keep,
            step_pages: config.backup.step_pages,
            retention_window: config.backup.retention_window(),
            layout: ArchiveLayout::new(&config.backup.sweep_root, &config.backup.environment),
            runner: BackupRunner::new(RetryPolicy::from(&config.retry), cancel.clone()),
            cancel,
        }
    }

    /// Back up every tenant from `source`.
    ///
    /// Only a failure to enumerate tenants is returned as an error; per-tenant
    /// failures are collected in the report.
    pub fn run(&self, source: &dyn TenantSource) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("backup_run", run_id = %run_id);
        let _enter = span.enter();

        let started_at = Utc::now();
        let tenants = source.tenants()?;
        tracing::info!(count = tenants.len(), "Starting tenant backups");

        let mut succeeded = Vec::new();
        let mut failed = FailureSet::default();

        for (i, tenant) in tenants.iter().enumerate() {
            if self.cancel.is_cancelled() {
                for skipped in &tenants[i..] {
                    failed.record(&skipped.id, &BackupError::Cancelled);
                }
                tracing::warn!(skipped = tenants.len() - i, "Run cancelled, remaining tenants not attempted");
                break;
            }

            match self.backup_tenant(source, tenant) {
                Ok(()) => succeeded.push(tenant.id.clone()),
                Err(e) => {
                    tracing::error!(tenant = %tenant.id, error = %e, "Tenant backup failed");
                    failed.record(&tenant.id, &e);
                }
            }
        }

        tracing::info!(
            succeeded = succeeded.len(),
            failed = failed.iter().count(),
            "Tenant backups finished"
        );

        Ok(RunReport {
            run_id,
            started_at,
            succeeded,
            failed,
        })
    }

    fn backup_tenant(&self, source: &dyn TenantSource, tenant: &Tenant) -> Result<()> {
        generations::rotate(&tenant.db_path, self.keep)?;

        let mut db = source.connect(tenant)?;
        self.runner.run(tenant, db.as_mut(), self.step_pages)?;
        drop(db);

        let kept = generations::existing_generations(&tenant.db_path, self.keep).len();
        tracing::debug!(tenant = %tenant.id, generations = kept, "Local generations");

        if let SweepOutcome::Swept(path) = archive::sweep(&self.layout, tenant)? {
            tracing::debug!(tenant = %tenant.id, path = %path.display(), "Archive updated");
        }

        if let RetentionOutcome::Enforced(removed) =
            archive::enforce(&self.layout, tenant, self.retention_window, SystemTime::now())?
        {
            tracing::debug!(tenant = %tenant.id, removed = removed.len(), "Retention enforced");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copier::testing::{ScriptedDatabase, ScriptedTenants};
    use crate::copier::StepStatus;
    use crate::generations::generation_path;
    use crate::tenants::DirectoryTenants;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn test_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.backup.environment = "production".into();
        config.backup.sweep_root = root.join("backups");
        config.backup.keep = 3;
        config.backup.step_pages = 4;
        config.tenants.root = root.join("tenants");
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_ms = 2;
        config.retry.max_retries = 3;
        config
    }

    fn tenant(root: &Path, id: &str) -> std::io::Result<Tenant> {
        let db_dir = root.join("tenants/production").join(id).join("db");
        fs::create_dir_all(&db_dir)?;
        Ok(Tenant::new(id, db_dir.join("main.sqlite3")))
    }

    fn archives(config: &Config, id: &str) -> Vec<PathBuf> {
        let dir = config.backup.sweep_root.join("production").join(id);
        fs::read_dir(dir)
            .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_failed_tenant_does_not_block_others() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = test_config(temp_dir.path());
        fs::create_dir_all(&config.backup.sweep_root)?;

        let a = tenant(temp_dir.path(), "aaaa")?;
        let b = tenant(temp_dir.path(), "bbbb")?;
        let source = ScriptedTenants::default()
            .with(
                a.clone(),
                ScriptedDatabase::new(
                    40,
                    vec![
                        StepStatus::Progress,
                        StepStatus::Failed("database disk image is malformed".into()),
                    ],
                ),
            )
            .with(b.clone(), ScriptedDatabase::new(40, vec![]));

        let report = Orchestrator::new(&config, CancellationToken::new()).run(&source)?;

        assert_eq!(report.succeeded, vec!["bbbb".to_string()]);
        assert_eq!(report.failed.tenant_ids(), vec!["aaaa".to_string()]);
        assert!(generation_path(&b.db_path, 1).is_file());
        assert_eq!(archives(&config, "bbbb").len(), 1);
        assert!(!generation_path(&a.db_path, 1).exists());
        assert!(archives(&config, "aaaa").is_empty());

        match report.into_result() {
            Err(BackupError::TenantsFailed(ids)) => assert_eq!(ids, vec!["aaaa".to_string()]),
            other => panic!("expected aggregate failure, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_all_tenants_succeed() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = test_config(temp_dir.path());
        fs::create_dir_all(&config.backup.sweep_root)?;

        let source = ScriptedTenants::default()
            .with(tenant(temp_dir.path(), "aaaa")?, ScriptedDatabase::new(8, vec![]))
            .with(
                tenant(temp_dir.path(), "bbbb")?,
                ScriptedDatabase::new(8, vec![StepStatus::Retryable, StepStatus::Retryable]),
            );

        let report = Orchestrator::new(&config, CancellationToken::new()).run(&source)?;

        assert!(report.is_success());
        assert_eq!(report.succeeded.len(), 2);
        assert!(report.into_result().is_ok());
        Ok(())
    }

    #[test]
    fn test_unreachable_tenant_is_recorded() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = test_config(temp_dir.path());

        let source = ScriptedTenants::default()
            .unreachable(tenant(temp_dir.path(), "aaaa")?)
            .with(tenant(temp_dir.path(), "bbbb")?, ScriptedDatabase::new(8, vec![]));

        let report = Orchestrator::new(&config, CancellationToken::new()).run(&source)?;

        assert_eq!(report.failed.tenant_ids(), vec!["aaaa".to_string()]);
        assert_eq!(report.succeeded, vec!["bbbb".to_string()]);
        Ok(())
    }

    #[test]
    fn test_rotation_error_fails_only_that_tenant() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = test_config(temp_dir.path());
        fs::create_dir_all(&config.backup.sweep_root)?;

        let a = tenant(temp_dir.path(), "aaaa")?;
        let b = tenant(temp_dir.path(), "bbbb")?;
        // The oldest slot is a non-empty directory, so it cannot be dropped
        let blocked = generation_path(&a.db_path, config.backup.keep);
        fs::create_dir_all(blocked.join("occupied"))?;

        let source = ScriptedTenants::default()
            .with(a.clone(), ScriptedDatabase::new(8, vec![]))
            .with(b.clone(), ScriptedDatabase::new(8, vec![]));

        let report = Orchestrator::new(&config, CancellationToken::new()).run(&source)?;

        assert_eq!(report.succeeded, vec!["bbbb".to_string()]);
        let failures: Vec<_> = report.failed.iter().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].tenant, "aaaa");
        assert!(failures[0].reason.starts_with("I/O error"), "{}", failures[0].reason);
        assert!(!generation_path(&a.db_path, 1).exists());
        assert!(archives(&config, "aaaa").is_empty());
        assert_eq!(archives(&config, "bbbb").len(), 1);
        Ok(())
    }

    #[test]
    fn test_missing_sweep_root_does_not_fail_tenant() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = test_config(temp_dir.path());

        let t = tenant(temp_dir.path(), "aaaa")?;
        let source = ScriptedTenants::default().with(t.clone(), ScriptedDatabase::new(8, vec![]));

        let report = Orchestrator::new(&config, CancellationToken::new()).run(&source)?;

        assert!(report.is_success());
        assert!(generation_path(&t.db_path, 1).is_file());
        assert!(!config.backup.sweep_root.exists());
        Ok(())
    }

    #[test]
    fn test_repeated_runs_rotate_generations() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = test_config(temp_dir.path());
        let t = tenant(temp_dir.path(), "aaaa")?;
        let source = ScriptedTenants::default().with(t.clone(), ScriptedDatabase::new(8, vec![]));
        let orchestrator = Orchestrator::new(&config, CancellationToken::new());

        for _ in 0..5 {
            assert!(orchestrator.run(&source)?.is_success());
        }

        assert_eq!(generations::existing_generations(&t.db_path, 10).len(), 3);
        Ok(())
    }

    #[test]
    fn test_cancelled_run_records_remaining_tenants() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = test_config(temp_dir.path());
        let source = ScriptedTenants::default()
            .with(tenant(temp_dir.path(), "aaaa")?, ScriptedDatabase::new(8, vec![]))
            .with(tenant(temp_dir.path(), "bbbb")?, ScriptedDatabase::new(8, vec![]));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = Orchestrator::new(&config, cancel).run(&source)?;

        assert!(report.succeeded.is_empty());
        assert_eq!(
            report.failed.tenant_ids(),
            vec!["aaaa".to_string(), "bbbb".to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_sqlite_tenants_end_to_end() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = test_config(temp_dir.path());
        fs::create_dir_all(&config.backup.sweep_root)?;

        for id in ["10000001", "10000002"] {
            let t = tenant(temp_dir.path(), id)?;
            let conn = rusqlite::Connection::open(&t.db_path)?;
            conn.execute_batch(
                "CREATE TABLE notifications (id INTEGER PRIMARY KEY, body TEXT);
                 INSERT INTO notifications (body) VALUES ('assigned'), ('mentioned');",
            )?;
        }

        let source = DirectoryTenants::from_config(&config);
        let report = Orchestrator::new(&config, CancellationToken::new())
            .run(&source)?
            .into_result()?;

        assert_eq!(report.succeeded, vec!["10000001".to_string(), "10000002".to_string()]);
        for id in ["10000001", "10000002"] {
            let swept = archives(&config, id);
            assert_eq!(swept.len(), 1);
            let rows: i64 = rusqlite::Connection::open(&swept[0])?
                .query_row("SELECT COUNT(*) FROM notifications", [], |r| r.get(0))?;
            assert_eq!(rows, 2);
        }
        Ok(())
    }
}
