//! Database Manager
//!
//! The single authorization- and locking-aware facade over discovery, the
//! connection pool, the lock manager, and the query engine. Every command
//! resolves its database reference here.
//!
//! # Pool Discipline
//! At most one [`Connection`] per absolute path. The open mode is decided by
//! the first opener's access level; when a writer arrives at a read-only
//! cached handle, a read-write handle replaces it in the cache and the old
//! handle closes once its last holder drops it. A handle is never more
//! permissive than its opener's level at open time.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error};

use super::connection::{Connection, OpenOptions};
use super::discovery::{Discovery, DiscoveredDatabase};
use super::lock::LockManager;
use super::query::{self, QueryKind, QueryResult};
use crate::access::{Level, Resolver, User};
use crate::config::{Config, DatabaseSource};
use crate::error::{Result, StudioError};

/// A database entry in a listing, stamped with the caller's resolved level.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseInfo {
    pub path: PathBuf,
    pub alias: String,
    pub description: String,
    pub size: u64,
    pub mod_time: DateTime<Utc>,
    pub access_level: Level,
}

/// Orchestrates discovery, access resolution, connection pooling, advisory
/// locking, and query execution.
pub struct Manager {
    discovery: Discovery,
    connections: Arc<Mutex<HashMap<PathBuf, Arc<Connection>>>>,
    locks: Arc<LockManager>,
    resolver: RwLock<Arc<Resolver>>,
}

impl Manager {
    /// Create a manager from a validated configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            discovery: Discovery::new(config.databases.clone()),
            connections: Arc::new(Mutex::new(HashMap::new())),
            locks: Arc::new(LockManager::new()),
            resolver: RwLock::new(Arc::new(config.build_resolver())),
        }
    }

    /// Start discovery. When a database disappears from discovery and has no
    /// active operation, its pooled connection is closed best-effort.
    pub fn start(&mut self) -> Result<()> {
        let connections = Arc::clone(&self.connections);
        self.discovery.on_change(move |added, removed| {
            if !added.is_empty() {
                debug!(count = added.len(), "databases discovered");
            }
            let mut pool = connections.lock();
            for db in removed {
                if let Some(conn) = pool.get(&db.path) {
                    // Idle means the pool holds the only reference.
                    if Arc::strong_count(conn) == 1 {
                        pool.remove(&db.path);
                        debug!(path = %db.path.display(), "closed connection for removed database");
                    }
                }
            }
        });
        self.discovery.start()
    }

    /// Stop discovery and close all pooled connections.
    pub fn stop(&mut self) {
        self.discovery.stop();
        self.connections.lock().clear();
    }

    /// The discovery service
    #[must_use]
    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// The advisory lock manager, shared so the session registry can
    /// release a session's locks when it ends
    #[must_use]
    pub fn locks(&self) -> Arc<LockManager> {
        Arc::clone(&self.locks)
    }

    /// Swap in a new resolver. Concurrent operations see either the old or
    /// the new resolver, never a torn view.
    pub fn update_resolver(&self, resolver: Resolver) {
        *self.resolver.write() = Arc::new(resolver);
    }

    /// Replace discovery sources and rescan (config reload path).
    pub fn update_sources(&self, sources: Vec<DatabaseSource>) {
        self.discovery.update_sources(sources);
    }

    /// Force a discovery rescan.
    pub fn refresh(&self) {
        self.discovery.refresh();
    }

    fn current_resolver(&self) -> Arc<Resolver> {
        Arc::clone(&self.resolver.read())
    }

    /// Databases the user can read, stamped with resolved levels.
    #[must_use]
    pub fn list_databases(&self, user: &User) -> Vec<DatabaseInfo> {
        let resolver = self.current_resolver();
        let mut listed: Vec<DatabaseInfo> = self
            .discovery
            .databases()
            .into_iter()
            .filter_map(|db| {
                let level =
                    resolver.resolve(Some(user), &db.path.to_string_lossy(), &db.alias);
                level.can_read().then(|| DatabaseInfo {
                    path: db.path.clone(),
                    alias: db.alias.clone(),
                    description: db.description.clone(),
                    size: db.size,
                    mod_time: db.mod_time,
                    access_level: level,
                })
            })
            .collect();
        listed.sort_by(|a, b| a.alias.cmp(&b.alias));
        listed
    }

    /// Look up a discovered database by path or alias.
    #[must_use]
    pub fn get(&self, path_or_alias: &str) -> Option<Arc<DiscoveredDatabase>> {
        self.discovery.get(path_or_alias)
    }

    /// The user's access level for a database; `None` when it is unknown.
    #[must_use]
    pub fn access_level(&self, user: &User, path_or_alias: &str) -> Level {
        let Some(db) = self.discovery.get(path_or_alias) else {
            return Level::None;
        };
        self.current_resolver().resolve(Some(user), &db.path.to_string_lossy(), &db.alias)
    }

    /// Open (or return the cached) connection for a database the user can
    /// read. The handle's mode reflects the opener's level at open time.
    pub fn open_connection(&self, path_or_alias: &str, user: &User) -> Result<Arc<Connection>> {
        let db = self
            .discovery
            .get(path_or_alias)
            .ok_or_else(|| StudioError::not_found(path_or_alias.to_string()))?;

        let level =
            self.current_resolver().resolve(Some(user), &db.path.to_string_lossy(), &db.alias);
        if !level.can_read() {
            return Err(StudioError::access_denied(format!(
                "no read access to {path_or_alias}"
            )));
        }

        let mut pool = self.connections.lock();
        if let Some(cached) = pool.get(&db.path) {
            // Never hand a writer a read-only handle: open a fresh
            // read-write handle and swap it in. Holders of the old handle
            // finish on it; it closes when the last of them drops it.
            if cached.is_read_only() && level.can_write() {
                let upgraded = Arc::new(Connection::open(&db.path, OpenOptions::default())?);
                pool.insert(db.path.clone(), Arc::clone(&upgraded));
                return Ok(upgraded);
            }
            return Ok(Arc::clone(cached));
        }

        let opts = OpenOptions { read_only: !level.can_write(), ..OpenOptions::default() };
        let conn = Arc::new(Connection::open(&db.path, opts)?);
        pool.insert(db.path.clone(), Arc::clone(&conn));
        Ok(conn)
    }

    /// Close and drop the pooled connection for a database, if any.
    pub fn close_connection(&self, path_or_alias: &str) {
        if let Some(db) = self.discovery.get(path_or_alias) {
            self.connections.lock().remove(&db.path);
        }
    }

    /// Execute SQL with authorization and, for writes, the advisory lock
    /// held for the duration of the call and released on every exit path.
    pub fn execute_query(
        &self,
        path_or_alias: &str,
        user: &User,
        session_id: &str,
        sql: &str,
    ) -> Result<QueryResult> {
        let db = self
            .discovery
            .get(path_or_alias)
            .ok_or_else(|| StudioError::not_found(path_or_alias.to_string()))?;

        let kind = query::classify(sql);
        if kind == QueryKind::Write {
            let level =
                self.current_resolver().resolve(Some(user), &db.path.to_string_lossy(), &db.alias);
            if !level.can_write() {
                return Err(StudioError::access_denied(format!(
                    "no write access to {path_or_alias}"
                )));
            }
        }

        let conn = self.open_connection(path_or_alias, user)?;
        let path_key = db.path.to_string_lossy().into_owned();

        let result = if kind == QueryKind::Write {
            self.locks.with_write_lock(&path_key, user.display_name(), session_id, || {
                query::execute(&conn, sql, &[])
            })
        } else {
            query::execute(&conn, sql, &[])
        };

        if let Err(ref e) = result {
            if e.is_engine_busy() {
                // The advisory layer should have prevented this.
                error!(
                    path = %db.path.display(),
                    error = %e,
                    "engine busy despite advisory lock (application lock failure)"
                );
            }
        }

        result
    }

    /// Stream the raw database file to a sink. Requires download access.
    pub fn stream_database(
        &self,
        path_or_alias: &str,
        user: &User,
        sink: &mut dyn io::Write,
    ) -> Result<u64> {
        let db = self
            .discovery
            .get(path_or_alias)
            .ok_or_else(|| StudioError::not_found(path_or_alias.to_string()))?;

        let level =
            self.current_resolver().resolve(Some(user), &db.path.to_string_lossy(), &db.alias);
        if !level.can_download() {
            return Err(StudioError::access_denied(format!(
                "no download access to {path_or_alias}"
            )));
        }

        let mut file = std::fs::File::open(&db.path)
            .map_err(|e| StudioError::engine(format!("could not open database file: {e}")))?;
        io::copy(&mut file, sink)
            .map_err(|e| StudioError::engine(format!("could not stream database file: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a manager over a temp dir holding one populated database.
    fn fixture(users_json: &str) -> (tempfile::TempDir, Manager) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("test.db");
        {
            let conn = rusqlite::Connection::open(&db_path).expect("create");
            conn.execute_batch(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
                 INSERT INTO users (name) VALUES ('alpha'), ('beta');",
            )
            .expect("seed");
        }

        let config_json = format!(r#"{{"users": {users_json}}}"#);
        let mut config: Config = serde_json::from_str(&config_json).expect("config");
        config.databases = vec![DatabaseSource {
            path: db_path.display().to_string(),
            ..DatabaseSource::default()
        }];

        let mut manager = Manager::new(&config);
        manager.start().expect("start");
        (dir, manager)
    }

    fn reader_config() -> &'static str {
        r#"[
            {"name": "reader", "access": [{"pattern": "*", "level": "read-only"}]},
            {"name": "writer", "access": [{"pattern": "*", "level": "read-write"}]}
        ]"#
    }

    #[test]
    fn test_list_databases_filtered() {
        let (_dir, manager) = fixture(reader_config());

        let visible = manager.list_databases(&User::authenticated("reader"));
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].access_level, Level::ReadOnly);

        let hidden = manager.list_databases(&User::authenticated("stranger"));
        assert!(hidden.is_empty());
    }

    #[test]
    fn test_admin_sees_all_databases_as_admin() {
        let (_dir, manager) = fixture("[]");
        let visible = manager.list_databases(&User::local_admin());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].access_level, Level::Admin);
    }

    #[test]
    fn test_unknown_database_is_not_found() {
        let (_dir, manager) = fixture(reader_config());
        let err = manager
            .execute_query("missing", &User::authenticated("writer"), "s1", "SELECT 1")
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_open_denied_without_read() {
        let (_dir, manager) = fixture(reader_config());
        let err = manager.open_connection("test", &User::authenticated("stranger")).unwrap_err();
        assert_eq!(err.error_code(), "ACCESS_DENIED");
    }

    #[test]
    fn test_pool_returns_same_connection() {
        let (_dir, manager) = fixture(reader_config());
        let writer = User::authenticated("writer");

        let first = manager.open_connection("test", &writer).expect("open");
        let second = manager.open_connection("test", &writer).expect("open again");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_reader_gets_read_only_connection() {
        let (_dir, manager) = fixture(reader_config());
        let conn =
            manager.open_connection("test", &User::authenticated("reader")).expect("open");
        assert!(conn.is_read_only());
    }

    #[test]
    fn test_writer_upgrades_read_only_cache() {
        let (_dir, manager) = fixture(reader_config());

        let ro = manager.open_connection("test", &User::authenticated("reader")).expect("ro");
        assert!(ro.is_read_only());

        let rw = manager.open_connection("test", &User::authenticated("writer")).expect("rw");
        assert!(!rw.is_read_only());

        // The cache now serves the writable handle to everyone.
        let again =
            manager.open_connection("test", &User::authenticated("reader")).expect("again");
        assert!(Arc::ptr_eq(&rw, &again));
    }

    #[test]
    fn test_execute_query_denies_writes_for_reader() {
        let (_dir, manager) = fixture(reader_config());
        let err = manager
            .execute_query(
                "test",
                &User::authenticated("reader"),
                "s1",
                "DELETE FROM users WHERE id = 1",
            )
            .unwrap_err();
        assert_eq!(err.error_code(), "ACCESS_DENIED");
        assert!(err.message().contains("no write access"));

        // And nothing changed.
        let rows = manager
            .execute_query("test", &User::authenticated("reader"), "s1", "SELECT COUNT(*) FROM users")
            .expect("count");
        assert_eq!(rows.rows[0][0], rusqlite::types::Value::Integer(2));
    }

    #[test]
    fn test_execute_query_reads_for_reader() {
        let (_dir, manager) = fixture(reader_config());
        let result = manager
            .execute_query("test", &User::authenticated("reader"), "s1", "SELECT name FROM users ORDER BY id")
            .expect("select");
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn test_write_blocked_by_held_lock() {
        let (_dir, manager) = fixture(reader_config());
        let db_path = manager.get("test").expect("db").path.to_string_lossy().into_owned();

        // Session A holds the advisory lock.
        manager.locks().try_lock(&db_path, "alice", "session-a").expect("lock");

        let err = manager
            .execute_query(
                "test",
                &User::authenticated("writer"),
                "session-b",
                "UPDATE users SET name = 'x' WHERE id = 1",
            )
            .unwrap_err();

        match err {
            StudioError::LockHeld { ref holder, .. } => assert_eq!(holder, "alice"),
            other => panic!("expected LockHeld, got {other:?}"),
        }

        // The engine was never touched.
        let unchanged = manager
            .execute_query("test", &User::authenticated("writer"), "session-a", "SELECT name FROM users WHERE id = 1")
            .expect("select");
        assert_eq!(unchanged.rows[0][0], rusqlite::types::Value::Text("alpha".to_string()));
    }

    #[test]
    fn test_write_lock_released_after_execute() {
        let (_dir, manager) = fixture(reader_config());
        let writer = User::authenticated("writer");

        manager
            .execute_query("test", &writer, "s1", "UPDATE users SET name = 'y' WHERE id = 1")
            .expect("update");

        let db_path = manager.get("test").expect("db").path.to_string_lossy().into_owned();
        assert!(!manager.locks().is_locked(&db_path));
    }

    #[test]
    fn test_same_session_reenters_lock() {
        let (_dir, manager) = fixture(reader_config());
        let writer = User::authenticated("writer");
        let db_path = manager.get("test").expect("db").path.to_string_lossy().into_owned();

        manager.locks().try_lock(&db_path, "writer", "s1").expect("lock");
        manager
            .execute_query("test", &writer, "s1", "UPDATE users SET name = 'z' WHERE id = 1")
            .expect("re-entrant write");
    }

    #[test]
    fn test_stream_database_requires_read() {
        let (_dir, manager) = fixture(reader_config());

        let mut sink = Vec::new();
        let err = manager
            .stream_database("test", &User::authenticated("stranger"), &mut sink)
            .unwrap_err();
        assert_eq!(err.error_code(), "ACCESS_DENIED");

        let copied = manager
            .stream_database("test", &User::authenticated("reader"), &mut sink)
            .expect("stream");
        assert!(copied > 0);
        // SQLite file header
        assert!(sink.starts_with(b"SQLite format 3\0"));
    }

    #[test]
    fn test_update_resolver_swaps_atomically() {
        let (_dir, manager) = fixture("[]");
        let user = User::authenticated("late");

        assert_eq!(manager.access_level(&user, "test"), Level::None);

        let mut resolver = Resolver::new();
        resolver.add_user_rule("late", "*", Level::ReadWrite);
        manager.update_resolver(resolver);

        assert_eq!(manager.access_level(&user, "test"), Level::ReadWrite);
    }
}
