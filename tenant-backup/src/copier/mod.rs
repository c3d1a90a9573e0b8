//! Stepwise (online) copy capability.
//!
//! A [`LiveDatabase`] owns a tenant's live source handle. For one backup it
//! opens the destination, hands a [`StepwiseCopier`] to the caller's driver
//! closure, and finalizes the destination once the driver returns. The
//! driver decides how to react to each [`StepStatus`]; engines only report.

pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

use crate::utils::errors::Result;
use std::path::Path;
use std::time::Duration;

pub use sqlite::SqliteDatabase;

/// Outcome of a single copy step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Pages were copied and more remain
    Progress,

    /// The destination is a complete, consistent copy
    Complete,

    /// The source is momentarily busy or locked; nothing was copied
    Retryable,

    /// Unrecoverable engine error
    Failed(String),
}

/// Status plus page counters reported after a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub status: StepStatus,
    pub remaining: u64,
    pub total: u64,
}

impl StepReport {
    /// Pages already in the destination
    pub fn written(&self) -> u64 {
        self.total.saturating_sub(self.remaining)
    }
}

/// One bounded increment of page copying from a live source.
pub trait StepwiseCopier {
    /// Copy up to `pages` pages. A non-positive engine limit is never passed.
    fn step(&mut self, pages: u32) -> StepReport;
}

/// Result of a completed copy session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySummary {
    pub pages: u64,
    pub retries: u32,
    pub elapsed: Duration,
}

/// Driver invoked with the copier for the duration of one session.
pub type CopyDriver<'d> = dyn FnMut(&mut dyn StepwiseCopier) -> Result<CopySummary> + 'd;

/// A live, lockable database that can be copied while it stays in use.
pub trait LiveDatabase: Send {
    /// Open or create `dest`, run `drive` against a copier targeting it, and
    /// finalize the destination before returning the driver's result.
    fn stepwise_copy(&mut self, dest: &Path, drive: &mut CopyDriver<'_>) -> Result<CopySummary>;
}
