//! History Store
//!
//! A private SQLite database holding session, query, and audit records. The
//! store opens with the same engine policy as catalog databases (WAL,
//! normal synchronous, foreign keys on, 5 s busy timeout) and migrates its
//! schema idempotently on every open.
//!
//! Writes are synchronous and bounded by the busy timeout; per-session
//! ordering follows from that directly.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::params;

use super::names::NameGenerator;
use super::{AuditRecord, QueryRecord, SessionRecord};
use crate::engine::Connection;
use crate::error::{Result, StudioError};

/// File name of the history database inside the data directory
const HISTORY_DB: &str = "history.db";

const MIGRATION: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_name TEXT,
    public_key_fingerprint TEXT,
    anonymous_name TEXT,
    remote_addr TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    last_active_at DATETIME,
    is_active INTEGER DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_sessions_user_name ON sessions(user_name);
CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at);
CREATE INDEX IF NOT EXISTS idx_sessions_is_active ON sessions(is_active);

CREATE TABLE IF NOT EXISTS query_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT REFERENCES sessions(id),
    database_path TEXT,
    query TEXT,
    execution_time_ms INTEGER,
    rows_affected INTEGER,
    error TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_query_history_session_id ON query_history(session_id);
CREATE INDEX IF NOT EXISTS idx_query_history_database_path ON query_history(database_path);
CREATE INDEX IF NOT EXISTS idx_query_history_created_at ON query_history(created_at);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT REFERENCES sessions(id),
    action TEXT,
    database_path TEXT,
    table_name TEXT,
    details TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_audit_log_session_id ON audit_log(session_id);
CREATE INDEX IF NOT EXISTS idx_audit_log_action ON audit_log(action);
CREATE INDEX IF NOT EXISTS idx_audit_log_database_path ON audit_log(database_path);
CREATE INDEX IF NOT EXISTS idx_audit_log_created_at ON audit_log(created_at);
";

/// Optional filters for history listings. Results are ordered by
/// `created_at` descending.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub session_id: Option<String>,
    pub database_path: Option<String>,
    /// Only meaningful for the audit log
    pub action: Option<String>,
    pub since: Option<DateTime<Utc>>,
    /// 0 means no limit
    pub limit: usize,
}

impl HistoryFilter {
    /// Filter by nothing but a row limit.
    #[must_use]
    pub fn latest(limit: usize) -> Self {
        Self { limit, ..Self::default() }
    }
}

/// The history store.
pub struct Store {
    conn: Connection,
    names: Mutex<NameGenerator>,
}

impl Store {
    /// Open (creating if needed) the history database under a data
    /// directory and migrate its schema.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)
            .map_err(|e| StudioError::config(format!("could not create data directory: {e}")))?;

        let conn = Connection::open_read_write(data_dir.join(HISTORY_DB))?;
        conn.with_handle(|c| {
            c.execute_batch(MIGRATION)?;
            Ok(())
        })?;

        Ok(Self { conn, names: Mutex::new(NameGenerator::new()) })
    }

    /// Generate a pseudonym for an anonymous caller.
    pub fn generate_anonymous_name(&self) -> String {
        self.names.lock().generate()
    }

    /// Persist a new session row.
    pub fn create_session(&self, record: &SessionRecord) -> Result<()> {
        self.conn.with_handle(|c| {
            c.execute(
                "INSERT INTO sessions (id, user_name, public_key_fingerprint, anonymous_name,
                                       remote_addr, created_at, last_active_at, is_active)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id,
                    record.user_name,
                    record.public_key_fingerprint,
                    record.anonymous_name,
                    record.remote_addr,
                    record.created_at,
                    record.last_active_at,
                    record.is_active,
                ],
            )?;
            Ok(())
        })
    }

    /// Refresh a session's last-active time.
    pub fn update_session_activity(&self, session_id: &str) -> Result<()> {
        self.conn.with_handle(|c| {
            c.execute(
                "UPDATE sessions SET last_active_at = ? WHERE id = ?",
                params![Utc::now(), session_id],
            )?;
            Ok(())
        })
    }

    /// Mark a session inactive.
    pub fn end_session(&self, session_id: &str) -> Result<()> {
        self.conn.with_handle(|c| {
            c.execute(
                "UPDATE sessions SET is_active = 0, last_active_at = ? WHERE id = ?",
                params![Utc::now(), session_id],
            )?;
            Ok(())
        })
    }

    /// Fetch one session row.
    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.conn.with_handle(|c| {
            let mut stmt = c.prepare(
                "SELECT id, user_name, public_key_fingerprint, anonymous_name, remote_addr,
                        created_at, last_active_at, is_active
                 FROM sessions WHERE id = ?",
            )?;
            let mut rows = stmt.query_map([session_id], scan_session)?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
    }

    /// List sessions, most recently active first.
    pub fn list_sessions(&self, active_only: bool, limit: usize) -> Result<Vec<SessionRecord>> {
        let mut sql = String::from(
            "SELECT id, user_name, public_key_fingerprint, anonymous_name, remote_addr,
                    created_at, last_active_at, is_active
             FROM sessions",
        );
        if active_only {
            sql.push_str(" WHERE is_active = 1");
        }
        sql.push_str(" ORDER BY last_active_at DESC");
        if limit > 0 {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        self.conn.with_handle(|c| {
            let mut stmt = c.prepare(&sql)?;
            let sessions = stmt
                .query_map([], scan_session)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(sessions)
        })
    }

    /// Persist one query record. The record's `id` is assigned by the store
    /// and ignored on input.
    pub fn record_query(&self, record: &QueryRecord) -> Result<()> {
        self.conn.with_handle(|c| {
            c.execute(
                "INSERT INTO query_history (session_id, database_path, query,
                                            execution_time_ms, rows_affected, error, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.session_id,
                    record.database_path,
                    record.query,
                    record.execution_time_ms,
                    record.rows_affected,
                    record.error,
                    record.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// List query records matching the filter, newest first.
    pub fn list_query_history(&self, filter: &HistoryFilter) -> Result<Vec<QueryRecord>> {
        let mut sql = String::from(
            "SELECT id, session_id, database_path, query, execution_time_ms,
                    rows_affected, error, created_at
             FROM query_history WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(session_id) = &filter.session_id {
            sql.push_str(" AND session_id = ?");
            args.push(Box::new(session_id.clone()));
        }
        if let Some(database_path) = &filter.database_path {
            sql.push_str(" AND database_path = ?");
            args.push(Box::new(database_path.clone()));
        }
        if let Some(since) = filter.since {
            sql.push_str(" AND created_at >= ?");
            args.push(Box::new(since));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");
        if filter.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", filter.limit));
        }

        self.conn.with_handle(|c| {
            let mut stmt = c.prepare(&sql)?;
            let records = stmt
                .query_map(rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())), scan_query)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(records)
        })
    }

    /// Query records for a specific authenticated user, newest first.
    pub fn query_history_for_user(&self, user_name: &str, limit: usize) -> Result<Vec<QueryRecord>> {
        let mut sql = String::from(
            "SELECT qh.id, qh.session_id, qh.database_path, qh.query, qh.execution_time_ms,
                    qh.rows_affected, qh.error, qh.created_at
             FROM query_history qh
             JOIN sessions s ON qh.session_id = s.id
             WHERE s.user_name = ?
             ORDER BY qh.created_at DESC, qh.id DESC",
        );
        if limit > 0 {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        self.conn.with_handle(|c| {
            let mut stmt = c.prepare(&sql)?;
            let records = stmt
                .query_map([user_name], scan_query)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(records)
        })
    }

    /// Persist one audit entry; `details` is JSON-encoded when present.
    pub fn record_audit(
        &self,
        session_id: &str,
        action: &str,
        database_path: &str,
        table_name: Option<&str>,
        details: Option<&serde_json::Value>,
    ) -> Result<()> {
        let details_text = details.map(serde_json::Value::to_string);
        self.conn.with_handle(|c| {
            c.execute(
                "INSERT INTO audit_log (session_id, action, database_path, table_name, details, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![session_id, action, database_path, table_name, details_text, Utc::now()],
            )?;
            Ok(())
        })
    }

    /// List audit entries matching the filter, newest first.
    pub fn list_audit_log(&self, filter: &HistoryFilter) -> Result<Vec<AuditRecord>> {
        let mut sql = String::from(
            "SELECT id, session_id, action, database_path, table_name, details, created_at
             FROM audit_log WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(session_id) = &filter.session_id {
            sql.push_str(" AND session_id = ?");
            args.push(Box::new(session_id.clone()));
        }
        if let Some(action) = &filter.action {
            sql.push_str(" AND action = ?");
            args.push(Box::new(action.clone()));
        }
        if let Some(database_path) = &filter.database_path {
            sql.push_str(" AND database_path = ?");
            args.push(Box::new(database_path.clone()));
        }
        if let Some(since) = filter.since {
            sql.push_str(" AND created_at >= ?");
            args.push(Box::new(since));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");
        if filter.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", filter.limit));
        }

        self.conn.with_handle(|c| {
            let mut stmt = c.prepare(&sql)?;
            let records = stmt
                .query_map(rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())), scan_audit)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(records)
        })
    }
}

fn scan_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        user_name: row.get(1)?,
        public_key_fingerprint: row.get(2)?,
        anonymous_name: row.get(3)?,
        remote_addr: row.get(4)?,
        created_at: row.get(5)?,
        last_active_at: row.get(6)?,
        is_active: row.get::<_, i64>(7)? != 0,
    })
}

fn scan_query(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueryRecord> {
    Ok(QueryRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        database_path: row.get(2)?,
        query: row.get(3)?,
        execution_time_ms: row.get(4)?,
        rows_affected: row.get(5)?,
        error: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn scan_audit(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRecord> {
    Ok(AuditRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        action: row.get(2)?,
        database_path: row.get(3)?,
        table_name: row.get(4)?,
        details: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::User;
    use crate::history::actions;

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("data")).expect("open store");
        (dir, store)
    }

    fn record(session_id: &str, query: &str) -> QueryRecord {
        QueryRecord {
            id: 0,
            session_id: session_id.to_string(),
            database_path: "/data/test.db".to_string(),
            query: query.to_string(),
            execution_time_ms: 3,
            rows_affected: 1,
            error: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_migration_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data = dir.path().join("data");
        let _first = Store::open(&data).expect("first open");
        let _second = Store::open(&data).expect("second open");
    }

    #[test]
    fn test_session_lifecycle() {
        let (_dir, store) = open_store();

        let session = SessionRecord::new("s1", &User::authenticated("alice"), None);
        store.create_session(&session).expect("create");

        let loaded = store.get_session("s1").expect("get").expect("present");
        assert!(loaded.is_active);
        assert_eq!(loaded.user_name.as_deref(), Some("alice"));

        store.update_session_activity("s1").expect("touch");
        store.end_session("s1").expect("end");

        let ended = store.get_session("s1").expect("get").expect("present");
        assert!(!ended.is_active);

        assert!(store.get_session("missing").expect("get").is_none());
    }

    #[test]
    fn test_list_sessions_active_only() {
        let (_dir, store) = open_store();

        for id in ["a", "b", "c"] {
            let session = SessionRecord::new(id, &User::authenticated(id), None);
            store.create_session(&session).expect("create");
        }
        store.end_session("b").expect("end");

        let active = store.list_sessions(true, 0).expect("list");
        let ids: Vec<&str> = active.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(active.len(), 2);
        assert!(!ids.contains(&"b"));

        let all = store.list_sessions(false, 0).expect("list all");
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_query_history_filters() {
        let (_dir, store) = open_store();

        store.record_query(&record("s1", "SELECT 1")).expect("q1");
        store.record_query(&record("s1", "SELECT 2")).expect("q2");
        store.record_query(&record("s2", "SELECT 3")).expect("q3");

        let all = store.list_query_history(&HistoryFilter::default()).expect("all");
        assert_eq!(all.len(), 3);

        let s1 = store
            .list_query_history(&HistoryFilter {
                session_id: Some("s1".to_string()),
                ..HistoryFilter::default()
            })
            .expect("s1");
        assert_eq!(s1.len(), 2);

        let limited = store.list_query_history(&HistoryFilter::latest(1)).expect("limited");
        assert_eq!(limited.len(), 1);
        // Newest first.
        assert_eq!(limited[0].query, "SELECT 3");
    }

    #[test]
    fn test_query_history_for_user() {
        let (_dir, store) = open_store();

        let session = SessionRecord::new("s1", &User::authenticated("alice"), None);
        store.create_session(&session).expect("create");
        store.record_query(&record("s1", "SELECT 1")).expect("q");
        store.record_query(&record("orphan", "SELECT 2")).expect("q");

        let records = store.query_history_for_user("alice", 0).expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].query, "SELECT 1");
    }

    #[test]
    fn test_audit_log_round_trip() {
        let (_dir, store) = open_store();

        store
            .record_audit(
                "s1",
                actions::INSERT,
                "/data/test.db",
                Some("users"),
                Some(&serde_json::json!({"data": {"name": "x"}})),
            )
            .expect("audit");
        store
            .record_audit("s1", actions::DELETE, "/data/test.db", Some("users"), None)
            .expect("audit");

        let all = store.list_audit_log(&HistoryFilter::default()).expect("list");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].action, actions::DELETE);

        let inserts = store
            .list_audit_log(&HistoryFilter {
                action: Some(actions::INSERT.to_string()),
                ..HistoryFilter::default()
            })
            .expect("filtered");
        assert_eq!(inserts.len(), 1);
        assert!(inserts[0].details.as_deref().unwrap_or_default().contains("name"));
    }

    #[test]
    fn test_anonymous_name_delegation() {
        let (_dir, store) = open_store();
        let name = store.generate_anonymous_name();
        assert_eq!(name.split('-').count(), 3);
    }
}
