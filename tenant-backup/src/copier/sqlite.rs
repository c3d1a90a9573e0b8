//! SQLite online backup through `rusqlite::backup`.

use super::{CopyDriver, CopySummary, LiveDatabase, StepReport, StepStatus, StepwiseCopier};
use crate::utils::errors::Result;
use rusqlite::backup::{Backup, StepResult};
use rusqlite::{Connection, OpenFlags};
use std::os::raw::c_int;
use std::path::Path;
use std::time::Duration;

/// A tenant's live SQLite database, held open for the duration of its backup.
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Open an existing database. Missing files are an error, never created.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::from_connection(conn)
    }

    /// Wrap an already-established connection.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        // Contention must surface as BUSY/LOCKED so the runner's backoff applies.
        conn.busy_timeout(Duration::ZERO)?;
        Ok(Self { conn })
    }
}

impl LiveDatabase for SqliteDatabase {
    fn stepwise_copy(&mut self, dest: &Path, drive: &mut CopyDriver<'_>) -> Result<CopySummary> {
        let mut dest_conn = Connection::open(dest)?;
        dest_conn.busy_timeout(Duration::ZERO)?;

        let outcome = {
            let backup = Backup::new(&self.conn, &mut dest_conn)?;
            let mut copier = SqliteCopier { backup };
            drive(&mut copier)
        };
        // Dropping the backup above finished the session; closing flushes the destination.
        let summary = outcome?;
        dest_conn.close().map_err(|(_, e)| e)?;
        Ok(summary)
    }
}

struct SqliteCopier<'a, 'b> {
    backup: Backup<'a, 'b>,
}

impl StepwiseCopier for SqliteCopier<'_, '_> {
    fn step(&mut self, pages: u32) -> StepReport {
        let limit = c_int::try_from(pages).unwrap_or(c_int::MAX).max(1);
        let status = match self.backup.step(limit) {
            Ok(StepResult::Done) => StepStatus::Complete,
            Ok(StepResult::More) => StepStatus::Progress,
            Ok(StepResult::Busy) | Ok(StepResult::Locked) => StepStatus::Retryable,
            #[allow(unreachable_patterns)]
            Ok(other) => StepStatus::Failed(format!("unexpected step result {:?}", other)),
            Err(e) => StepStatus::Failed(e.to_string()),
        };

        let progress = self.backup.progress();
        StepReport {
            status,
            remaining: u64::try_from(progress.remaining).unwrap_or(0),
            total: u64::try_from(progress.pagecount).unwrap_or(0),
        }
    }
}
