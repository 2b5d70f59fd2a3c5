//! Advisory Write Locks
//!
//! The lock manager grants one advisory write lock per database path, keyed
//! by session id. It exists to give callers an intelligible "held by X since
//! 14:02" error before SQLite raises a raw busy error; it is cooperative
//! only and independent of any engine-level locking.
//!
//! Re-entrance by the same session is a no-op success. A busy/locked error
//! surfacing from the engine despite this layer is a correctness signal and
//! is logged as such by the manager.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{Result, StudioError};

/// Who holds a lock, and since when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    /// Display name of the holder (user name or anonymous pseudonym)
    pub holder: String,
    /// Session that owns the lock
    pub session_id: String,
    /// Acquisition time
    pub since: DateTime<Utc>,
}

/// Manages advisory write locks across sessions.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: RwLock<HashMap<String, LockInfo>>,
}

impl LockManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to acquire the write lock on a database path.
    ///
    /// Succeeds when the path is unlocked or when the same session already
    /// holds it. Fails with [`StudioError::LockHeld`] otherwise.
    pub fn try_lock(&self, path: &str, holder: &str, session_id: &str) -> Result<()> {
        let mut locks = self.locks.write();

        if let Some(info) = locks.get(path) {
            if info.session_id == session_id {
                return Ok(());
            }
            return Err(StudioError::LockHeld {
                database: path.to_string(),
                holder: info.holder.clone(),
                since: info.since,
            });
        }

        locks.insert(
            path.to_string(),
            LockInfo {
                holder: holder.to_string(),
                session_id: session_id.to_string(),
                since: Utc::now(),
            },
        );
        Ok(())
    }

    /// Release a lock if the session owns it; no-op otherwise.
    pub fn unlock(&self, path: &str, session_id: &str) {
        let mut locks = self.locks.write();
        if locks.get(path).is_some_and(|info| info.session_id == session_id) {
            locks.remove(path);
        }
    }

    /// Release every lock held by a session.
    pub fn release_all_for_session(&self, session_id: &str) {
        self.locks.write().retain(|_, info| info.session_id != session_id);
    }

    /// Whether a path is currently locked
    #[must_use]
    pub fn is_locked(&self, path: &str) -> bool {
        self.locks.read().contains_key(path)
    }

    /// Lock info for a path, if any
    #[must_use]
    pub fn get(&self, path: &str) -> Option<LockInfo> {
        self.locks.read().get(path).cloned()
    }

    /// Snapshot of all current locks
    #[must_use]
    pub fn list(&self) -> HashMap<String, LockInfo> {
        self.locks.read().clone()
    }

    /// Run an action while holding the write lock; the lock is released on
    /// every exit path, including failure.
    pub fn with_write_lock<T>(
        &self,
        path: &str,
        holder: &str,
        session_id: &str,
        action: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        self.try_lock(path, holder, session_id)?;
        let result = action();
        self.unlock(path, session_id);
        result
    }
}
