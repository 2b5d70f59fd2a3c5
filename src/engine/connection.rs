//! Database Connections
//!
//! A [`Connection`] wraps one rusqlite handle together with the metadata the
//! pool needs: the absolute path, the read-only flag fixed at open time, and
//! the operation mutex that serializes all statements on the handle.
//!
//! # SQLite policy
//! - read-only openers get `SQLITE_OPEN_READ_ONLY`; writers get
//!   read/write/create
//! - journaling is WAL, synchronous is NORMAL, foreign keys are enforced
//! - busy timeout defaults to 5000 ms
//! - exactly one underlying handle per path; SQLite writers serialize and
//!   additional handles only invite lock contention

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::OpenFlags;

use crate::error::Result;

/// Default SQLite busy timeout
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Options controlling how a database file is opened
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    /// Open the handle read-only; writing statements fail at the engine
    pub read_only: bool,
    /// SQLite busy timeout
    pub busy_timeout: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { read_only: false, busy_timeout: DEFAULT_BUSY_TIMEOUT }
    }
}

impl OpenOptions {
    /// Read-only open with default timeout
    #[must_use]
    pub fn read_only() -> Self {
        Self { read_only: true, ..Self::default() }
    }
}

/// A shared database connection.
///
/// The handle is owned exclusively by the pool and shared across sessions
/// behind an `Arc`; the internal mutex serializes every statement so
/// concurrent callers see linearizable results.
pub struct Connection {
    handle: Mutex<rusqlite::Connection>,
    path: PathBuf,
    read_only: bool,
}

impl Connection {
    /// Open a database connection with the given options.
    pub fn open(path: impl AsRef<Path>, opts: OpenOptions) -> Result<Self> {
        let path = path.as_ref();

        let flags = if opts.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };

        let handle = rusqlite::Connection::open_with_flags(path, flags)?;
        handle.busy_timeout(opts.busy_timeout)?;
        handle.pragma_update(None, "foreign_keys", "ON")?;

        // Journal mode is a database-level property; only writers may set it.
        if !opts.read_only {
            handle.pragma_update(None, "journal_mode", "WAL")?;
            handle.pragma_update(None, "synchronous", "NORMAL")?;
        }

        Ok(Self { handle: Mutex::new(handle), path: path.to_path_buf(), read_only: opts.read_only })
    }

    /// Open a database in read-only mode.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, OpenOptions::read_only())
    }

    /// Open a database in read-write mode.
    pub fn open_read_write(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, OpenOptions::default())
    }

    /// The absolute path this connection was opened on
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the handle was opened read-only. Fixed for the life of the
    /// connection; the pool never upgrades a handle in place.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Run a closure against the underlying handle while holding the
    /// operation mutex. All statement execution goes through here.
    pub fn with_handle<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> Result<T>) -> Result<T> {
        let guard = self.handle.lock();
        f(&guard)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_db(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("scratch.db");
        let conn = rusqlite::Connection::open(&path).expect("create db");
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", [])
            .expect("create table");
        path
    }

    #[test]
    fn test_open_applies_wal_policy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = scratch_db(&dir);

        let conn = Connection::open_read_write(&path).expect("open");
        conn.with_handle(|c| {
            let mode: String =
                c.pragma_query_value(None, "journal_mode", |row| row.get(0)).expect("pragma");
            assert_eq!(mode.to_lowercase(), "wal");

            let fk: i64 =
                c.pragma_query_value(None, "foreign_keys", |row| row.get(0)).expect("pragma");
            assert_eq!(fk, 1);
            Ok(())
        })
        .expect("with_handle");
    }

    #[test]
    fn test_read_only_refuses_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = scratch_db(&dir);

        let conn = Connection::open_read_only(&path).expect("open ro");
        assert!(conn.is_read_only());

        let err = conn
            .with_handle(|c| {
                c.execute("INSERT INTO t (v) VALUES ('x')", [])?;
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.error_code(), "READ_ONLY");
    }

    #[test]
    fn test_read_write_allows_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = scratch_db(&dir);

        let conn = Connection::open_read_write(&path).expect("open rw");
        assert!(!conn.is_read_only());

        conn.with_handle(|c| {
            c.execute("INSERT INTO t (v) VALUES ('x')", [])?;
            Ok(())
        })
        .expect("insert");
    }

    #[test]
    fn test_open_missing_file_read_only_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.db");
        assert!(Connection::open_read_only(&missing).is_err());
    }
}
