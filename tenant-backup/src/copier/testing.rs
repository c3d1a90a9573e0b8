//! Deterministic in-memory copiers for tests.

use super::{CopyDriver, CopySummary, LiveDatabase, StepReport, StepStatus, StepwiseCopier};
use crate::tenants::{Tenant, TenantSource};
use crate::utils::errors::{BackupError, Result};
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Bytes written to the destination per copied page
pub(crate) const PAGE_SIZE: usize = 16;

/// Source whose step results follow a script.
///
/// Scripted `Progress` copies up to the requested pages, `Retryable` and
/// `Failed` copy nothing, `Complete` copies the rest. Once the script runs
/// out the copier either keeps copying until done or, for
/// [`ScriptedDatabase::busy_after`], reports `Retryable` forever.
#[derive(Clone)]
pub(crate) struct ScriptedDatabase {
    total: u64,
    script: VecDeque<StepStatus>,
    busy_forever: bool,
    step_delay: Duration,
    written: Arc<Mutex<Vec<u64>>>,
}

impl ScriptedDatabase {
    pub(crate) fn new(total: u64, script: Vec<StepStatus>) -> Self {
        Self {
            total,
            script: script.into(),
            busy_forever: false,
            step_delay: Duration::ZERO,
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn busy_after(script: Vec<StepStatus>) -> Self {
        Self {
            busy_forever: true,
            ..Self::new(1_000, script)
        }
    }

    /// Sleep this long inside every step, like a large or slow source
    pub(crate) fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Written-page counter observed after every step
    pub(crate) fn written_log(&self) -> Arc<Mutex<Vec<u64>>> {
        Arc::clone(&self.written)
    }
}

impl LiveDatabase for ScriptedDatabase {
    fn stepwise_copy(&mut self, dest: &Path, drive: &mut CopyDriver<'_>) -> Result<CopySummary> {
        let mut copier = ScriptedCopier {
            file: File::create(dest)?,
            total: self.total,
            remaining: self.total,
            script: std::mem::take(&mut self.script),
            busy_forever: self.busy_forever,
            step_delay: self.step_delay,
            written: Arc::clone(&self.written),
            io_error: None,
        };
        let summary = drive(&mut copier)?;
        if let Some(e) = copier.io_error.take() {
            return Err(BackupError::Io(e));
        }
        copier.file.sync_all()?;
        Ok(summary)
    }
}

struct ScriptedCopier {
    file: File,
    total: u64,
    remaining: u64,
    script: VecDeque<StepStatus>,
    busy_forever: bool,
    step_delay: Duration,
    written: Arc<Mutex<Vec<u64>>>,
    io_error: Option<std::io::Error>,
}

impl ScriptedCopier {
    fn copy(&mut self, pages: u64) {
        let n = pages.min(self.remaining);
        let bytes = vec![b'p'; n as usize * PAGE_SIZE];
        if let Err(e) = self.file.write_all(&bytes) {
            self.io_error.get_or_insert(e);
        }
        self.remaining -= n;
    }

    fn natural(&mut self, pages: u64) -> StepStatus {
        self.copy(pages);
        if self.remaining == 0 {
            StepStatus::Complete
        } else {
            StepStatus::Progress
        }
    }
}

impl StepwiseCopier for ScriptedCopier {
    fn step(&mut self, pages: u32) -> StepReport {
        if !self.step_delay.is_zero() {
            std::thread::sleep(self.step_delay);
        }
        let pages = u64::from(pages);
        let status = match self.script.pop_front() {
            Some(StepStatus::Progress) => self.natural(pages),
            Some(StepStatus::Complete) => {
                self.copy(self.remaining);
                StepStatus::Complete
            }
            Some(other) => other,
            None if self.busy_forever => StepStatus::Retryable,
            None => self.natural(pages),
        };

        let report = StepReport {
            status,
            remaining: self.remaining,
            total: self.total,
        };
        if let Ok(mut log) = self.written.lock() {
            log.push(report.written());
        }
        report
    }
}

/// Fixed tenant list backed by scripted databases
#[derive(Default)]
pub(crate) struct ScriptedTenants {
    tenants: Vec<Tenant>,
    databases: HashMap<String, ScriptedDatabase>,
}

impl ScriptedTenants {
    pub(crate) fn with(mut self, tenant: Tenant, db: ScriptedDatabase) -> Self {
        self.databases.insert(tenant.id.clone(), db);
        self.tenants.push(tenant);
        self
    }

    /// A tenant whose connection cannot be established
    pub(crate) fn unreachable(mut self, tenant: Tenant) -> Self {
        self.tenants.push(tenant);
        self
    }
}

impl TenantSource for ScriptedTenants {
    fn tenants(&self) -> Result<Vec<Tenant>> {
        Ok(self.tenants.clone())
    }

    fn connect(&self, tenant: &Tenant) -> Result<Box<dyn LiveDatabase>> {
        match self.databases.get(&tenant.id) {
            Some(db) => Ok(Box::new(db.clone())),
            None => Err(BackupError::CopyFailed(format!(
                "no connection for tenant {}",
                tenant.id
            ))),
        }
    }
}
