//! Copies the newest local generation into the archive.

use super::timestamp::{archive_name, recorded_time};
use super::ArchiveLayout;
use crate::generations::generation_path;
use crate::tenants::Tenant;
use crate::utils::errors::Result;
use std::fs::File;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Generation 1 was archived at this path
    Swept(PathBuf),

    /// The sweep root is missing or read-only
    RootUnavailable,

    /// No generation 1 to sweep
    NoBackup,
}

/// Archive generation 1 of `tenant` as `<tenant_dir>/<basename>.<timestamp>`.
///
/// The copy is written to a temporary file in the destination directory and
/// renamed into place, so a partially written archive is never visible.
/// Sweeping the same generation again overwrites the same archive file.
pub fn sweep(layout: &ArchiveLayout, tenant: &Tenant) -> Result<SweepOutcome> {
    if !layout.is_usable() {
        tracing::warn!(
            tenant = %tenant.id,
            "Skipping sweep, {:?} does not exist or is not writable.",
            layout.sweep_root
        );
        return Ok(SweepOutcome::RootUnavailable);
    }

    let backup_file = generation_path(&tenant.db_path, 1);
    let dest_dir = layout.tenant_dir(&tenant.id);
    std::fs::create_dir_all(&dest_dir)?;

    if !backup_file.is_file() {
        tracing::warn!(tenant = %tenant.id, "No backup file found at {:?} to sweep.", backup_file);
        return Ok(SweepOutcome::NoBackup);
    }

    let recorded = recorded_time(&backup_file)?;
    let swept_file = dest_dir.join(archive_name(&tenant.db_path, recorded));

    let mut staged = tempfile::Builder::new()
        .prefix(".sweep-")
        .tempfile_in(&dest_dir)?;
    let mut source = File::open(&backup_file)?;
    std::io::copy(&mut source, staged.as_file_mut())?;
    staged.as_file().set_modified(recorded)?;
    staged.as_file().sync_all()?;
    staged.persist(&swept_file).map_err(|e| e.error)?;

    tracing::info!(tenant = %tenant.id, "Swept backup to {:?}.", swept_file);
    Ok(SweepOutcome::Swept(swept_file))
}
