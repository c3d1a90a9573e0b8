//! Local backup generations.
//!
//! Generation `i` of a database lives at `<db_path>.<i>`; generation 1 is
//! always the newest completed backup.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Path of generation `index` for the database at `db_path`
pub fn generation_path(db_path: &Path, index: usize) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

/// Journal files SQLite may keep beside a database file
pub fn companion_paths(path: &Path) -> Vec<PathBuf> {
    ["-journal", "-wal", "-shm"]
        .iter()
        .map(|suffix| {
            let mut name = OsString::from(path.as_os_str());
            name.push(suffix);
            PathBuf::from(name)
        })
        .collect()
}

/// Shift every generation down one slot, dropping the oldest and freeing generation 1.
///
/// Missing generations are skipped, so a cold start with fewer than `keep`
/// files is fine and repeated calls are harmless. Leftover journals beside
/// generation 1 are removed so the next backup never opens them as hot journals.
pub fn rotate(db_path: &Path, keep: usize) -> std::io::Result<()> {
    for j in (2..=keep).rev() {
        let fresher = generation_path(db_path, j - 1);
        let staler = generation_path(db_path, j);

        if j == keep {
            ignore_missing(std::fs::remove_file(&staler))?;
        }

        // TODO: benchmark backing up into the previous generation instead of a fresh file.
        if ignore_missing(std::fs::rename(&fresher, &staler))? {
            tracing::debug!(from = %fresher.display(), to = %staler.display(), "Rotated generation");
        }
    }

    for stale in companion_paths(&generation_path(db_path, 1)) {
        if ignore_missing(std::fs::remove_file(&stale))? {
            tracing::warn!(path = %stale.display(), "Removed stale journal");
        }
    }
    Ok(())
}

/// Existing generation files, newest first
pub fn existing_generations(db_path: &Path, keep: usize) -> Vec<PathBuf> {
    (1..=keep)
        .map(|i| generation_path(db_path, i))
        .filter(|p| p.exists())
        .collect()
}

/// `Ok(true)` if the operation happened, `Ok(false)` if its source was absent.
fn ignore_missing(result: std::io::Result<()>) -> std::io::Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
