//! Recorded backup times and archive names.
//!
//! The recorded time of a backup file is its modification time: it is set
//! when the copy finishes writing, survives generation renames, and is
//! carried onto archived copies.

use chrono::{DateTime, Utc};
use std::ffi::OsString;
use std::path::Path;
use std::time::SystemTime;

/// Fixed-width UTC stamp used as the archive name suffix
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

pub fn recorded_time(path: &Path) -> std::io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

pub fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format(ARCHIVE_TIMESTAMP_FORMAT)
        .to_string()
}

/// `<basename of db_path>.<YYYYMMDDHHMMSS>`
pub fn archive_name(db_path: &Path, time: SystemTime) -> OsString {
    let mut name = db_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("database"));
    name.push(".");
    name.push(format_timestamp(time));
    name
}

/// Time elapsed since `time`, zero if it lies in the future
pub fn age(time: SystemTime, now: SystemTime) -> std::time::Duration {
    now.duration_since(time).unwrap_or_default()
}
