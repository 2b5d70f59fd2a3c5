//! Configuration Management
//!
//! This module defines the validated in-memory configuration and loads it
//! from a JSON file. The configuration is the sole source of non-default
//! policy: database sources, per-user access rules, public rules, and the
//! anonymous access level all come from here.
//!
//! # Hot Reload
//! A [`watcher::ConfigWatcher`] re-parses the file on change and hands the
//! new `Config` to reload callbacks. The resolver built from a config is
//! immutable; reloads build a fresh one and swap it at the manager.

pub mod watcher;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::access::{Level, Resolver};
use crate::error::{Result, StudioError};

/// Default data directory for the history database and server state
pub const DEFAULT_DATA_DIR: &str = ".sqlite-tui";

/// The application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Instance name, shown in listings and logs
    pub name: String,

    /// Server-related settings (opaque to the core; consumed by the transport)
    pub server: ServerConfig,

    /// Database sources: file paths, directories, or globs
    pub databases: Vec<DatabaseSource>,

    /// Anonymous access level (none, read-only, read-write)
    pub anonymous_access: String,

    /// Allow keyless SSH connections (consumed by the transport)
    pub allow_keyless: bool,

    /// Users and their access rules
    pub users: Vec<UserConfig>,

    /// Public database rules (apply to every caller)
    pub public: Vec<PublicRule>,

    /// Data directory for the history database
    pub data_dir: PathBuf,

    /// Path this config was loaded from
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "sqlite-tui".to_string(),
            server: ServerConfig::default(),
            databases: Vec::new(),
            anonymous_access: "none".to_string(),
            allow_keyless: false,
            users: Vec::new(),
            public: Vec::new(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            path: None,
        }
    }
}

/// Server configuration consumed by the transport layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ssh: SshConfig,
    pub local: LocalConfig,
}

/// SSH listener settings. The core never opens the listener; these values
/// pass through to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub enabled: bool,
    pub listen: String,
    pub host_key_path: String,
    pub idle_timeout: String,
    pub max_timeout: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: ":2222".to_string(),
            host_key_path: format!("{DEFAULT_DATA_DIR}/host_key"),
            idle_timeout: "30m".to_string(),
            max_timeout: "24h".to_string(),
        }
    }
}

/// Local (standalone) mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub enabled: bool,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// A source of database files: a single file, a directory, or a glob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSource {
    /// File path, directory, or glob pattern
    pub path: String,

    /// Alias template. A `*` in the template is replaced with the file's
    /// stem when the source expands to multiple files.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub alias: String,

    /// Human-facing description shown in listings
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Whether directory sources are walked recursively
    pub recursive: bool,
}

/// An access rule as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRule {
    pub pattern: String,
    pub level: String,
}

/// A user entry in the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub name: String,
    pub admin: bool,
    pub public_keys: Vec<String>,
    pub access: Vec<AccessRule>,
}

/// A publicly accessible database pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicRule {
    pub pattern: String,
    pub level: String,
}

impl Config {
    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let abs = path
            .canonicalize()
            .map_err(|e| StudioError::config(format!("could not resolve config path: {e}")))?;

        let contents = fs::read_to_string(&abs)
            .map_err(|e| StudioError::config(format!("could not read config file: {e}")))?;

        let mut config: Self = serde_json::from_str(&contents)
            .map_err(|e| StudioError::config(format!("invalid config file: {e}")))?;

        config.path = Some(abs);
        Ok(config)
    }

    /// A minimal configuration for local mode: one source pointing at the
    /// given path, everything else defaulted.
    #[must_use]
    pub fn for_local_path(path: impl Into<String>) -> Self {
        Self {
            databases: vec![DatabaseSource {
                path: path.into(),
                description: "Local database".to_string(),
                ..DatabaseSource::default()
            }],
            ..Self::default()
        }
    }

    /// The path this config was loaded from, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Build an access resolver from the configured rules.
    #[must_use]
    pub fn build_resolver(&self) -> Resolver {
        let mut resolver = Resolver::new();
        resolver.set_anonymous_level(Level::parse(&self.anonymous_access));

        for rule in &self.public {
            resolver.add_public_rule(&rule.pattern, Level::parse(&rule.level));
        }

        for user in &self.users {
            if user.admin {
                resolver.add_admin(&user.name);
            }
            for rule in &user.access {
                resolver.add_user_rule(&user.name, &rule.pattern, Level::parse(&rule.level));
            }
        }

        resolver
    }

    /// Look up a configured user by SSH public key fingerprint.
    #[must_use]
    pub fn find_user_by_key_fingerprint(&self, fingerprint: &str) -> Option<&UserConfig> {
        self.users
            .iter()
            .find(|u| u.public_keys.iter().any(|k| k == fingerprint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(json: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let mut f = fs::File::create(&path).expect("create config");
        f.write_all(json.as_bytes()).expect("write config");
        (dir, path)
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.anonymous_access, "none");
        assert!(!config.allow_keyless);
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert!(config.server.ssh.enabled);
        assert!(config.server.local.enabled);
    }

    #[test]
    fn test_load_minimal() {
        let (_dir, path) = write_config(
            r#"{
                "databases": [{"path": "./data/*.db", "alias": "data-*"}],
                "anonymous_access": "read-only"
            }"#,
        );

        let config = Config::load(&path).expect("load");
        assert_eq!(config.databases.len(), 1);
        assert_eq!(config.databases[0].alias, "data-*");
        assert_eq!(config.anonymous_access, "read-only");
        assert!(config.path().is_some());
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let (_dir, path) = write_config("{not json");
        let err = Config::load(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_build_resolver() {
        let (_dir, path) = write_config(
            r#"{
                "anonymous_access": "none",
                "public": [{"pattern": "public_*", "level": "read-only"}],
                "users": [
                    {"name": "ops", "admin": true},
                    {"name": "dev", "access": [{"pattern": "*", "level": "read-write"}]}
                ]
            }"#,
        );

        let config = Config::load(&path).expect("load");
        let resolver = config.build_resolver();

        let ops = crate::access::User::authenticated("ops");
        assert_eq!(resolver.resolve(Some(&ops), "/x.db", "x"), Level::Admin);

        let dev = crate::access::User::authenticated("dev");
        assert_eq!(resolver.resolve(Some(&dev), "/x.db", "x"), Level::ReadWrite);

        assert_eq!(resolver.resolve(None, "/p.db", "public_stats"), Level::ReadOnly);
        assert_eq!(resolver.resolve(None, "/p.db", "private"), Level::None);
    }

    #[test]
    fn test_find_user_by_key_fingerprint() {
        let config = Config {
            users: vec![UserConfig {
                name: "alice".to_string(),
                public_keys: vec!["SHA256:abcdef".to_string()],
                ..UserConfig::default()
            }],
            ..Config::default()
        };

        assert_eq!(
            config.find_user_by_key_fingerprint("SHA256:abcdef").map(|u| u.name.as_str()),
            Some("alice")
        );
        assert!(config.find_user_by_key_fingerprint("SHA256:other").is_none());
    }

    #[test]
    fn test_local_path_config() {
        let config = Config::for_local_path("./mydb.db");
        assert_eq!(config.databases.len(), 1);
        assert_eq!(config.databases[0].path, "./mydb.db");
    }
}
