//! Session, Query, and Audit History
//!
//! Durable records of who connected, what they ran, and what changed, kept
//! in a private metadata database separate from the served catalog. Live
//! session state is tracked by the session registry; this module owns the
//! persisted mirror.

pub mod names;
pub mod store;

pub use names::NameGenerator;
pub use store::{HistoryFilter, Store};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::access::User;

/// Audit action names as stored in the audit log.
pub mod actions {
    pub const QUERY: &str = "query";
    pub const SELECT: &str = "select";
    pub const INSERT: &str = "insert";
    pub const UPDATE: &str = "update";
    pub const DELETE: &str = "delete";
    pub const EXPORT: &str = "export";
    pub const DOWNLOAD: &str = "download";
    pub const CREATE_TABLE: &str = "create_table";
    pub const DROP_TABLE: &str = "drop_table";
    pub const ADD_COLUMN: &str = "add_column";
    pub const DROP_COLUMN: &str = "drop_column";
}

/// The persisted mirror of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub id: String,
    /// Authenticated username, if any
    pub user_name: Option<String>,
    /// SSH key fingerprint, if identified by key
    pub public_key_fingerprint: Option<String>,
    /// Generated pseudonym for anonymous callers
    pub anonymous_name: Option<String>,
    pub remote_addr: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub is_active: bool,
}

impl SessionRecord {
    /// Build the persisted mirror for a live session.
    #[must_use]
    pub fn new(id: impl Into<String>, user: &User, remote_addr: Option<String>) -> Self {
        let now = Utc::now();
        let mut record = Self {
            id: id.into(),
            user_name: None,
            public_key_fingerprint: None,
            anonymous_name: None,
            remote_addr,
            created_at: now,
            last_active_at: now,
            is_active: true,
        };

        if user.is_anonymous {
            record.anonymous_name = user.anonymous_name.clone();
        } else {
            record.user_name = user.name.clone();
            record.public_key_fingerprint = user.public_key_fingerprint.clone();
        }

        record
    }

    /// Display name: username, pseudonym, or "unknown"
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.user_name
            .as_deref()
            .or(self.anonymous_name.as_deref())
            .unwrap_or("unknown")
    }

    /// Whether the session carries an authenticated user
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user_name.is_some()
    }
}

/// One executed statement, immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRecord {
    pub id: i64,
    pub session_id: String,
    pub database_path: String,
    pub query: String,
    pub execution_time_ms: i64,
    pub rows_affected: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One audited action with its intent and outcome details.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: i64,
    pub session_id: String,
    pub action: String,
    pub database_path: String,
    pub table_name: Option<String>,
    /// Arbitrary details, JSON-encoded
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_record_authenticated() {
        let mut user = User::authenticated("alice");
        user.public_key_fingerprint = Some("SHA256:abc".to_string());

        let record = SessionRecord::new("s1", &user, Some("10.0.0.1:9".to_string()));
        assert_eq!(record.user_name.as_deref(), Some("alice"));
        assert_eq!(record.public_key_fingerprint.as_deref(), Some("SHA256:abc"));
        assert!(record.anonymous_name.is_none());
        assert!(record.is_authenticated());
        assert_eq!(record.display_name(), "alice");
    }

    #[test]
    fn test_session_record_anonymous() {
        let user = User::anonymous("bold-heron-33");
        let record = SessionRecord::new("s2", &user, None);
        assert!(record.user_name.is_none());
        assert_eq!(record.anonymous_name.as_deref(), Some("bold-heron-33"));
        assert!(!record.is_authenticated());
        assert_eq!(record.display_name(), "bold-heron-33");
    }
}
