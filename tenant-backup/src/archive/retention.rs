//! Removes archived copies older than the retention window.

use super::timestamp::{age, recorded_time};
use super::ArchiveLayout;
use crate::tenants::Tenant;
use crate::utils::errors::Result;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionOutcome {
    /// Files removed from the tenant's archive directory
    Enforced(Vec<PathBuf>),

    /// The sweep root is missing or read-only
    RootUnavailable,
}

/// Delete every regular file under the tenant's archive directory whose age
/// at `now` is at least `window`.
///
/// Local generations are not consulted; archive retention is its own policy.
pub fn enforce(
    layout: &ArchiveLayout,
    tenant: &Tenant,
    window: Duration,
    now: SystemTime,
) -> Result<RetentionOutcome> {
    if !layout.is_usable() {
        tracing::warn!(
            tenant = %tenant.id,
            "Skipping retention enforcement, {:?} does not exist or is not writable.",
            layout.sweep_root
        );
        return Ok(RetentionOutcome::RootUnavailable);
    }

    let dest_dir = layout.tenant_dir(&tenant.id);
    let mut removed = Vec::new();
    if !dest_dir.is_dir() {
        return Ok(RetentionOutcome::Enforced(removed));
    }

    for entry in WalkDir::new(&dest_dir) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if age(recorded_time(path)?, now) >= window {
            std::fs::remove_file(path)?;
            tracing::info!(tenant = %tenant.id, "Removed old swept backup {:?}.", path);
            removed.push(path.to_path_buf());
        }
    }

    Ok(RetentionOutcome::Enforced(removed))
}
