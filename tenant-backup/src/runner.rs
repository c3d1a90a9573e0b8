//! Drives a stepwise copy of a tenant's live database into generation 1.

use crate::config::RetryConfig;
use crate::copier::{CopySummary, LiveDatabase, StepStatus, StepwiseCopier};
use crate::generations::{companion_paths, generation_path};
use crate::tenants::Tenant;
use crate::utils::errors::{BackupError, Result};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Bounds on how long a busy source is retried
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub deadline: Duration,
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based), doubling up to `max_backoff`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            deadline: Duration::from_secs(config.deadline_secs),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Produces generation 1 for a tenant
pub struct BackupRunner {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl BackupRunner {
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    /// Copy `db` into generation 1 of `tenant`, `step_pages` pages at a time.
    ///
    /// On any failure the partial generation 1 is removed, so later phases
    /// never observe an aborted copy.
    pub fn run(&self, tenant: &Tenant, db: &mut dyn LiveDatabase, step_pages: u32) -> Result<CopySummary> {
        let dest = generation_path(&tenant.db_path, 1);
        let started = Instant::now();

        let result = db.stepwise_copy(&dest, &mut |copier| {
            self.drive(tenant, copier, step_pages, started)
        });

        match result {
            Ok(summary) => {
                tracing::info!(
                    tenant = %tenant.id,
                    "Backup complete in {:.1} ms. Wrote {} pages to {:?}",
                    summary.elapsed.as_secs_f64() * 1000.0,
                    summary.pages,
                    dest
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!(tenant = %tenant.id, error = %e, "Backup failed");
                discard_partial(&dest);
                Err(e)
            }
        }
    }

    fn drive(
        &self,
        tenant: &Tenant,
        copier: &mut dyn StepwiseCopier,
        step_pages: u32,
        started: Instant,
    ) -> Result<CopySummary> {
        let mut retries = 0u32;
        let mut consecutive = 0u32;
        // Start of the current busy streak; the deadline only bounds waiting
        let mut busy_since: Option<Instant> = None;

        loop {
            let report = copier.step(step_pages);
            match report.status {
                StepStatus::Complete => {
                    return Ok(CopySummary {
                        pages: report.total,
                        retries,
                        elapsed: started.elapsed(),
                    });
                }
                StepStatus::Progress => {
                    consecutive = 0;
                    busy_since = None;
                    tracing::debug!(tenant = %tenant.id, "Wrote {} of {} pages.", report.written(), report.total);
                }
                StepStatus::Retryable => {
                    consecutive += 1;
                    retries += 1;
                    if consecutive > self.policy.max_retries {
                        return Err(BackupError::RetriesExhausted {
                            attempts: self.policy.max_retries,
                        });
                    }

                    let backoff = self.policy.backoff(consecutive);
                    let waiting = busy_since.get_or_insert_with(Instant::now).elapsed();
                    if waiting + backoff > self.policy.deadline {
                        return Err(BackupError::DeadlineExceeded {
                            deadline: self.policy.deadline,
                        });
                    }

                    tracing::debug!(tenant = %tenant.id, attempt = consecutive, "Busy, retrying in {:?}.", backoff);
                    self.pause(backoff)?;
                }
                StepStatus::Failed(reason) => {
                    tracing::error!(tenant = %tenant.id, "Failed with status {}.", reason);
                    return Err(BackupError::CopyFailed(reason));
                }
            }

            if self.cancel.is_cancelled() {
                return Err(BackupError::Cancelled);
            }
        }
    }

    /// Sleep for `backoff`, waking early on cancellation.
    fn pause(&self, backoff: Duration) -> Result<()> {
        const SLICE: Duration = Duration::from_millis(50);

        let until = Instant::now() + backoff;
        loop {
            if self.cancel.is_cancelled() {
                return Err(BackupError::Cancelled);
            }
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            std::thread::sleep((until - now).min(SLICE));
        }
    }
}

/// Remove an aborted generation 1 and any journal left beside it.
fn discard_partial(dest: &Path) {
    let mut paths = vec![dest.to_path_buf()];
    paths.extend(companion_paths(dest));

    for path in paths {
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::warn!(path = %path.display(), "Removed incomplete backup file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(path = %path.display(), error = %e, "Failed to remove incomplete backup file"),
        }
    }
}
