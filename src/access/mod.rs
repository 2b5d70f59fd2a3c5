//! Access Levels and Resolution
//!
//! This module classifies a (user, database) pair to one of four ordered
//! access levels and resolves effective access from configured rules.
//!
//! # Resolution Order
//! 1. Admin flag or membership in the admin set → `Admin` immediately
//! 2. The user's own rules, in order; first matching pattern wins
//! 3. Public rules, in order; first matching pattern wins
//! 4. The anonymous default level
//!
//! A matched rule returns its level even when that level is `None`: an
//! explicit deny stops fallback to later tiers.
//!
//! # Pattern Matching
//! Patterns use glob semantics (`*`, `?`, `[set]`, `**` for recursive
//! segments) and are tried against the alias exactly, the alias as a glob,
//! the path exactly, the path as a glob, and finally the file's basename as
//! a glob. Matching is pure; it never touches the filesystem. An empty
//! pattern never matches.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

/// The access level a user has to a database.
///
/// Levels are totally ordered: `None < ReadOnly < ReadWrite < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    /// The user cannot see or access the database
    None,
    /// Browsing data, viewing schema, SELECT queries, and exports
    ReadOnly,
    /// All read operations plus INSERT/UPDATE/DELETE and schema changes
    ReadWrite,
    /// All operations including DROP and raw file downloads
    Admin,
}

impl Level {
    /// Parse a config-file level string. Unknown strings resolve to `None`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "read-only" | "readonly" | "ro" => Self::ReadOnly,
            "read-write" | "readwrite" | "rw" => Self::ReadWrite,
            "admin" => Self::Admin,
            _ => Self::None,
        }
    }

    /// True if the level allows read operations
    #[must_use]
    pub fn can_read(self) -> bool {
        self >= Self::ReadOnly
    }

    /// True if the level allows write operations
    #[must_use]
    pub fn can_write(self) -> bool {
        self >= Self::ReadWrite
    }

    /// True if the level allows admin operations
    #[must_use]
    pub fn can_admin(self) -> bool {
        self >= Self::Admin
    }

    /// True if the level allows downloading the raw database file.
    /// Anyone with read access can download since they already see all the data.
    #[must_use]
    pub fn can_download(self) -> bool {
        self >= Self::ReadOnly
    }

    /// String form used in listings and config files
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ReadOnly => "read-only",
            Self::ReadWrite => "read-write",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Level {
    fn default() -> Self {
        Self::None
    }
}

/// An identified caller. Exactly one of `name` or `anonymous_name` is
/// populated; the value is immutable for the life of a session.
#[derive(Debug, Clone, Default)]
pub struct User {
    /// Authenticated username, if any
    pub name: Option<String>,
    /// Admin flag; may be true only for authenticated users
    pub is_admin: bool,
    /// SSH public key fingerprint, if identified by key
    pub public_key_fingerprint: Option<String>,
    /// Whether the caller is unauthenticated
    pub is_anonymous: bool,
    /// Generated pseudonym for anonymous callers (e.g. "azure-tiger-42")
    pub anonymous_name: Option<String>,
    /// Remote address as reported by the transport
    pub remote_address: Option<String>,
}

impl User {
    /// An authenticated user
    #[must_use]
    pub fn authenticated(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }

    /// An anonymous user carrying a generated pseudonym
    #[must_use]
    pub fn anonymous(anonymous_name: impl Into<String>) -> Self {
        Self {
            is_anonymous: true,
            anonymous_name: Some(anonymous_name.into()),
            ..Self::default()
        }
    }

    /// The local-mode user: authenticated and always admin
    #[must_use]
    pub fn local_admin() -> Self {
        Self { name: Some("local".to_string()), is_admin: true, ..Self::default() }
    }

    /// The name to display for the user
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.is_anonymous {
            return self.anonymous_name.as_deref().unwrap_or("unknown");
        }
        self.name.as_deref().unwrap_or("unknown")
    }
}

/// An access rule: a glob pattern paired with the level it grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub pattern: String,
    pub level: Level,
}

/// Basic database identity used when filtering a listing through the resolver.
#[derive(Debug, Clone)]
pub struct DatabaseIdentity {
    pub path: String,
    pub alias: String,
    pub level: Level,
}

/// Resolves access levels for users and databases.
///
/// A resolver is immutable after construction; configuration reloads build
/// a fresh resolver and swap it in atomically at the manager.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    /// Default access level for anonymous callers with no matching rule
    anonymous_level: Level,
    /// Rules applied to everyone, in declaration order
    public_rules: Vec<Rule>,
    /// Per-user rules, in declaration order
    user_rules: HashMap<String, Vec<Rule>>,
    /// Usernames with full access to everything
    admins: HashSet<String>,
}

impl Resolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default access level for anonymous callers
    pub fn set_anonymous_level(&mut self, level: Level) {
        self.anonymous_level = level;
    }

    /// Mark a user as admin
    pub fn add_admin(&mut self, name: impl Into<String>) {
        self.admins.insert(name.into());
    }

    /// Append a public rule
    pub fn add_public_rule(&mut self, pattern: impl Into<String>, level: Level) {
        self.public_rules.push(Rule { pattern: pattern.into(), level });
    }

    /// Append a rule for a specific user
    pub fn add_user_rule(&mut self, name: impl Into<String>, pattern: impl Into<String>, level: Level) {
        self.user_rules
            .entry(name.into())
            .or_default()
            .push(Rule { pattern: pattern.into(), level });
    }

    /// Determine the access level for a user to a database identified by
    /// absolute path and alias.
    #[must_use]
    pub fn resolve(&self, user: Option<&User>, path: &str, alias: &str) -> Level {
        if let Some(user) = user {
            if user.is_admin && !user.is_anonymous {
                return Level::Admin;
            }
            if !user.is_anonymous {
                if let Some(name) = user.name.as_deref() {
                    if self.admins.contains(name) {
                        return Level::Admin;
                    }
                    if let Some(rules) = self.user_rules.get(name) {
                        if let Some(level) = match_rules(rules, path, alias) {
                            return level;
                        }
                    }
                }
            }
        }

        if let Some(level) = match_rules(&self.public_rules, path, alias) {
            return level;
        }

        self.anonymous_level
    }

    /// True if the user has at least read access to the database
    #[must_use]
    pub fn can_access(&self, user: Option<&User>, path: &str, alias: &str) -> bool {
        self.resolve(user, path, alias).can_read()
    }

    /// Filter (path, alias) pairs to those the user can read, stamping each
    /// with its resolved level.
    #[must_use]
    pub fn list_accessible(
        &self,
        user: Option<&User>,
        databases: &[(String, String)],
    ) -> Vec<DatabaseIdentity> {
        databases
            .iter()
            .filter_map(|(path, alias)| {
                let level = self.resolve(user, path, alias);
                level.can_read().then(|| DatabaseIdentity {
                    path: path.clone(),
                    alias: alias.clone(),
                    level,
                })
            })
            .collect()
    }
}

/// Find the first matching rule and return its level. `None` (the Option)
/// means no rule matched; `Some(Level::None)` is an explicit deny.
fn match_rules(rules: &[Rule], path: &str, alias: &str) -> Option<Level> {
    rules
        .iter()
        .find(|rule| pattern_matches(&rule.pattern, path, alias))
        .map(|rule| rule.level)
}

/// Check a pattern against a database's alias, path, and basename, in that
/// order. Pure string matching; the filesystem is never consulted.
fn pattern_matches(pattern: &str, path: &str, alias: &str) -> bool {
    let pattern = pattern.trim();
    let path = path.trim();
    let alias = alias.trim();

    if pattern.is_empty() {
        return false;
    }

    if !alias.is_empty() {
        if pattern == alias {
            return true;
        }
        if glob_matches(pattern, alias) {
            return true;
        }
    }

    if !path.is_empty() {
        if pattern == path {
            return true;
        }
        if glob_matches(pattern, path) {
            return true;
        }
        if let Some(basename) = Path::new(path).file_name().and_then(|n| n.to_str()) {
            if glob_matches(pattern, basename) {
                return true;
            }
        }
    }

    false
}

/// Glob match where `*` and `?` stop at path separators and `**` crosses
/// them. Invalid patterns never match.
fn glob_matches(pattern: &str, candidate: &str) -> bool {
    const OPTIONS: MatchOptions = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    Pattern::new(pattern).is_ok_and(|p| p.matches_with(candidate, OPTIONS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::None < Level::ReadOnly);
        assert!(Level::ReadOnly < Level::ReadWrite);
        assert!(Level::ReadWrite < Level::Admin);
    }

    #[test]
    fn test_capability_monotonicity() {
        // can_write implies can_read; can_admin implies both
        for level in [Level::None, Level::ReadOnly, Level::ReadWrite, Level::Admin] {
            if level.can_write() {
                assert!(level.can_read(), "{level} writes but cannot read");
            }
            if level.can_admin() {
                assert!(level.can_read() && level.can_write(), "{level} admin but restricted");
            }
        }
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("read-only"), Level::ReadOnly);
        assert_eq!(Level::parse("RO"), Level::ReadOnly);
        assert_eq!(Level::parse("readwrite"), Level::ReadWrite);
        assert_eq!(Level::parse(" admin "), Level::Admin);
        assert_eq!(Level::parse("none"), Level::None);
        assert_eq!(Level::parse("garbage"), Level::None);
    }

    #[test]
    fn test_admin_via_flag() {
        let resolver = Resolver::new();
        let mut user = User::authenticated("someone");
        user.is_admin = true;
        assert_eq!(resolver.resolve(Some(&user), "/any/path.db", "any"), Level::Admin);
    }

    #[test]
    fn test_admin_via_admin_list() {
        let mut resolver = Resolver::new();
        resolver.add_admin("root_user");
        let user = User::authenticated("root_user");
        assert_eq!(resolver.resolve(Some(&user), "/any/path.db", "any"), Level::Admin);
    }

    #[test]
    fn test_unknown_user_has_no_access() {
        let resolver = Resolver::new();
        let user = User::authenticated("stranger");
        assert_eq!(resolver.resolve(Some(&user), "/data/test.db", "test"), Level::None);
    }

    #[test]
    fn test_missing_user_gets_anonymous_level() {
        let mut resolver = Resolver::new();
        resolver.set_anonymous_level(Level::ReadOnly);
        assert_eq!(resolver.resolve(None, "/data/test.db", "test"), Level::ReadOnly);
    }

    #[test]
    fn test_read_only_user_cannot_write() {
        let mut resolver = Resolver::new();
        resolver.add_user_rule("reader", "*", Level::ReadOnly);
        resolver.add_user_rule("writer", "*", Level::ReadWrite);

        let reader = resolver.resolve(Some(&User::authenticated("reader")), "/data/test.db", "test");
        assert!(reader.can_read());
        assert!(!reader.can_write());

        let writer = resolver.resolve(Some(&User::authenticated("writer")), "/data/test.db", "test");
        assert!(writer.can_read());
        assert!(writer.can_write());
    }

    #[test]
    fn test_user_rules_win_over_public_rules() {
        let mut resolver = Resolver::new();
        resolver.add_public_rule("*", Level::ReadOnly);
        resolver.add_user_rule("dev", "*", Level::ReadWrite);

        let dev = User::authenticated("dev");
        let guest = User::authenticated("guest");
        assert_eq!(resolver.resolve(Some(&dev), "/data/x.db", "x"), Level::ReadWrite);
        assert_eq!(resolver.resolve(Some(&guest), "/data/x.db", "x"), Level::ReadOnly);
    }

    #[test]
    fn test_first_match_wins_within_a_list() {
        let mut resolver = Resolver::new();
        resolver.add_public_rule("secret*", Level::None);
        resolver.add_public_rule("*", Level::ReadOnly);

        assert_eq!(resolver.resolve(None, "/data/secret_plans.db", "secret_plans"), Level::None);
        assert_eq!(resolver.resolve(None, "/data/open.db", "open"), Level::ReadOnly);
    }

    #[test]
    fn test_explicit_deny_blocks_anonymous_fallback() {
        let mut resolver = Resolver::new();
        resolver.set_anonymous_level(Level::ReadOnly);
        resolver.add_public_rule("blocked", Level::None);

        assert_eq!(resolver.resolve(None, "/data/blocked.db", "blocked"), Level::None);
        assert_eq!(resolver.resolve(None, "/data/other.db", "other"), Level::ReadOnly);
    }

    #[test]
    fn test_anonymous_user_skips_user_rules() {
        let mut resolver = Resolver::new();
        resolver.add_user_rule("azure-tiger-42", "*", Level::Admin);

        let anon = User::anonymous("azure-tiger-42");
        assert_eq!(resolver.resolve(Some(&anon), "/data/x.db", "x"), Level::None);
    }

    #[test]
    fn test_pattern_alias_exact() {
        assert!(pattern_matches("sales", "/data/sales.db", "sales"));
    }

    #[test]
    fn test_pattern_alias_glob() {
        assert!(pattern_matches("public_*", "/data/p.db", "public_data"));
        assert!(!pattern_matches("public_*", "/data/p.db", "private_data"));
    }

    #[test]
    fn test_pattern_path_glob() {
        assert!(pattern_matches("/data/shared/*.db", "/data/shared/a.db", ""));
        // `*` must not cross directory separators
        assert!(!pattern_matches("/data/*.db", "/data/sub/a.db", ""));
    }

    #[test]
    fn test_pattern_doublestar_recurses() {
        assert!(pattern_matches("/srv/**/*.db", "/srv/a/b/c/deep.db", ""));
    }

    #[test]
    fn test_pattern_basename() {
        assert!(pattern_matches("users.db", "/var/lib/app/users.db", "app-users"));
    }

    #[test]
    fn test_pattern_charset() {
        assert!(pattern_matches("db[0-9]", "/data/db1.sqlite", "db1"));
        assert!(!pattern_matches("db[0-9]", "/data/dbx.sqlite", "dbx"));
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        assert!(!pattern_matches("", "/data/a.db", "a"));
        assert!(!pattern_matches("  ", "/data/a.db", "a"));
    }

    #[test]
    fn test_list_accessible_stamps_levels() {
        let mut resolver = Resolver::new();
        resolver.add_user_rule("dev", "staging*", Level::ReadWrite);
        resolver.add_public_rule("*", Level::None);

        let databases = vec![
            ("/data/staging.db".to_string(), "staging".to_string()),
            ("/data/prod.db".to_string(), "prod".to_string()),
        ];

        let visible = resolver.list_accessible(Some(&User::authenticated("dev")), &databases);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].alias, "staging");
        assert_eq!(visible[0].level, Level::ReadWrite);
    }

    #[test]
    fn test_admin_sees_everything() {
        let resolver = Resolver::new();
        let mut user = User::authenticated("boss");
        user.is_admin = true;

        let databases = vec![
            ("/a.db".to_string(), "a".to_string()),
            ("/b.db".to_string(), "b".to_string()),
        ];
        let visible = resolver.list_accessible(Some(&user), &databases);
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|d| d.level == Level::Admin));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(User::authenticated("alice").display_name(), "alice");
        assert_eq!(User::anonymous("misty-owl-07").display_name(), "misty-owl-07");
        assert_eq!(User::default().display_name(), "unknown");
    }
}
