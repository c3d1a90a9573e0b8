use crate::config::Config;
use crate::orchestrator::{Orchestrator, RunReport};
use crate::tenants::DirectoryTenants;
use crate::utils::errors::{BackupError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

/// Periodically runs the tenant backup job on a cron schedule.
pub struct BackupScheduler {
    scheduler: Mutex<JobScheduler>,
    config: Arc<Config>,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
}

impl BackupScheduler {
    pub async fn new(config: Arc<Config>, cancel: CancellationToken) -> Result<Self> {
        let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            config,
            cancel,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub async fn schedule(&self, cron_expression: &str) -> Result<()> {
        let config = self.config.clone();
        let cancel = self.cancel.clone();
        let running = self.running.clone();

        let job = Job::new_async(cron_expression, move |_uuid, _lock| {
            let config = config.clone();
            let cancel = cancel.clone();
            let running = running.clone();
            Box::pin(async move {
                match run_exclusive(config, cancel, running).await {
                    None => tracing::warn!("Skipping scheduled run: previous backup still running"),
                    Some(Ok(report)) => match report.into_result() {
                        Ok(report) => {
                            tracing::info!(run_id = %report.run_id, tenants = report.succeeded.len(), "Scheduled backup finished");
                        }
                        Err(e) => tracing::error!(error = %e, "Scheduled backup failed"),
                    },
                    Some(Err(e)) => tracing::error!(error = %e, "Scheduled backup failed"),
                }
            })
        })
        .map_err(scheduler_error)?;

        self.scheduler
            .lock()
            .await
            .add(job)
            .await
            .map_err(scheduler_error)?;
        tracing::info!(cron = %cron_expression, "Backup job scheduled");
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.scheduler.lock().await.start().await.map_err(scheduler_error)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.scheduler.lock().await.shutdown().await.map_err(scheduler_error)
    }
}

/// Run one orchestration on the blocking pool, off the async workers.
pub async fn run_blocking(config: Arc<Config>, cancel: CancellationToken) -> Result<RunReport> {
    tokio::task::spawn_blocking(move || {
        let source = DirectoryTenants::from_config(&config);
        Orchestrator::new(&config, cancel).run(&source)
    })
    .await
    .map_err(|e| BackupError::Scheduler(format!("backup task panicked: {e}")))?
}

/// Like [`run_blocking`], but `None` if a run is already in flight.
async fn run_exclusive(
    config: Arc<Config>,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
) -> Option<Result<RunReport>> {
    if running.swap(true, Ordering::AcqRel) {
        return None;
    }
    let _guard = InFlight(running);
    Some(run_blocking(config, cancel).await)
}

/// Clears the in-flight flag when the run ends, however it ends.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn scheduler_error(e: impl std::fmt::Display) -> BackupError {
    BackupError::Scheduler(e.to_string())
}
