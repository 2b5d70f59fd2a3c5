//! Live Session Registry
//!
//! Tracks active sessions in a thread-safe map keyed by session id. The
//! transport hands over an identified user and remote address; the registry
//! assigns the id, mirrors the session into the history store, and releases
//! the session's advisory locks when it ends.
//!
//! History writes on registration and end are best-effort: a failing store
//! never takes a session down with it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

use crate::access::User;
use crate::engine::LockManager;
use crate::history::{SessionRecord, Store};

/// Minimum seconds between history mirrors of activity updates
const TOUCH_MIRROR_SECS: i64 = 30;

/// An active session.
pub struct Session {
    pub id: String,
    pub user: User,
    pub remote_addr: Option<String>,
    started_at: DateTime<Utc>,
    last_activity: Mutex<DateTime<Utc>>,
    last_mirrored: Mutex<DateTime<Utc>>,
}

impl Session {
    fn new(user: User, remote_addr: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user,
            remote_addr,
            started_at: now,
            last_activity: Mutex::new(now),
            last_mirrored: Mutex::new(now),
        }
    }

    /// When the session started
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time of the most recent activity
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock()
    }

    /// How long the session has been running
    #[must_use]
    pub fn duration(&self) -> ChronoDuration {
        Utc::now() - self.started_at
    }

    /// How long since the last activity
    #[must_use]
    pub fn idle_time(&self) -> ChronoDuration {
        Utc::now() - self.last_activity()
    }

    fn touch(&self) -> bool {
        let now = Utc::now();
        *self.last_activity.lock() = now;

        let mut mirrored = self.last_mirrored.lock();
        if (now - *mirrored).num_seconds() >= TOUCH_MIRROR_SECS {
            *mirrored = now;
            return true;
        }
        false
    }

    /// Build the persisted mirror of this session.
    #[must_use]
    pub fn to_record(&self) -> SessionRecord {
        SessionRecord::new(self.id.clone(), &self.user, self.remote_addr.clone())
    }
}

/// The registry of live sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    history: Option<Arc<Store>>,
    locks: Arc<LockManager>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(history: Option<Arc<Store>>, locks: Arc<LockManager>) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), history, locks }
    }

    /// Register a session for an identified user and mirror it to history.
    pub fn create(&self, user: User, remote_addr: Option<String>) -> Arc<Session> {
        let session = Arc::new(Session::new(user, remote_addr));
        self.sessions.write().insert(session.id.clone(), Arc::clone(&session));

        if let Some(history) = &self.history {
            if let Err(e) = history.create_session(&session.to_record()) {
                warn!(session_id = %session.id, error = %e, "could not persist session");
            }
        }

        session
    }

    /// Look up a live session.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// End a session: drop it from the registry, mark the history row
    /// inactive, and release all advisory locks it still holds.
    pub fn end(&self, id: &str) {
        self.sessions.write().remove(id);

        if let Some(history) = &self.history {
            if let Err(e) = history.end_session(id) {
                warn!(session_id = %id, error = %e, "could not close session history row");
            }
        }

        self.locks.release_all_for_session(id);
    }

    /// All live sessions.
    #[must_use]
    pub fn list_active(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Record activity on a session. Mirrors to history at most once per
    /// throttle interval so hot sessions do not hammer the store.
    pub fn touch(&self, id: &str) {
        let Some(session) = self.get(id) else {
            return;
        };

        let mirror = session.touch();
        if mirror {
            if let Some(history) = &self.history {
                if let Err(e) = history.update_session_activity(id) {
                    warn!(session_id = %id, error = %e, "could not mirror session activity");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_store() -> (tempfile::TempDir, SessionRegistry, Arc<Store>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(Store::open(dir.path().join("data")).expect("store"));
        let registry =
            SessionRegistry::new(Some(Arc::clone(&store)), Arc::new(LockManager::new()));
        (dir, registry, store)
    }

    #[test]
    fn test_create_and_get() {
        let (_dir, registry, _store) = registry_with_store();

        let session = registry.create(User::authenticated("alice"), Some("1.2.3.4:22".into()));
        assert_eq!(registry.count(), 1);

        let found = registry.get(&session.id).expect("session");
        assert_eq!(found.user.display_name(), "alice");
    }

    #[test]
    fn test_create_mirrors_to_history() {
        let (_dir, registry, store) = registry_with_store();

        let session = registry.create(User::authenticated("alice"), None);
        let record = store.get_session(&session.id).expect("get").expect("present");
        assert!(record.is_active);
        assert_eq!(record.user_name.as_deref(), Some("alice"));
    }

    #[test]
    fn test_end_marks_history_inactive() {
        let (_dir, registry, store) = registry_with_store();

        let session = registry.create(User::authenticated("alice"), None);
        registry.end(&session.id);

        assert_eq!(registry.count(), 0);
        assert!(registry.get(&session.id).is_none());

        let record = store.get_session(&session.id).expect("get").expect("present");
        assert!(!record.is_active);
    }

    #[test]
    fn test_end_releases_session_locks() {
        let locks = Arc::new(LockManager::new());
        let registry = SessionRegistry::new(None, Arc::clone(&locks));

        let session = registry.create(User::authenticated("alice"), None);
        locks.try_lock("/data/a.db", "alice", &session.id).expect("lock");
        locks.try_lock("/data/b.db", "alice", &session.id).expect("lock");

        registry.end(&session.id);
        assert!(!locks.is_locked("/data/a.db"));
        assert!(!locks.is_locked("/data/b.db"));
    }

    #[test]
    fn test_touch_updates_activity() {
        let registry = SessionRegistry::new(None, Arc::new(LockManager::new()));
        let session = registry.create(User::anonymous("misty-owl-07"), None);

        let before = session.last_activity();
        std::thread::sleep(std::time::Duration::from_millis(5));
        registry.touch(&session.id);
        assert!(session.last_activity() > before);
    }

    #[test]
    fn test_touch_unknown_session_is_noop() {
        let registry = SessionRegistry::new(None, Arc::new(LockManager::new()));
        registry.touch("missing");
    }

    #[test]
    fn test_session_ids_are_unique() {
        let registry = SessionRegistry::new(None, Arc::new(LockManager::new()));
        let a = registry.create(User::authenticated("a"), None);
        let b = registry.create(User::authenticated("b"), None);
        assert_ne!(a.id, b.id);
        assert_eq!(registry.count(), 2);
    }
}
