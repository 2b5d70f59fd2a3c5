//! Command Surface
//!
//! The transport-agnostic command dispatcher shared by SSH exec sessions
//! and local mode. A [`CommandContext`] carries the identified user, the
//! session id, the argument vector, and the output/error sinks; the
//! [`Handler`] routes the command name and leaves an exit code behind.
//!
//! Exit codes: 0 on success, 1 on user error (missing flags, unknown
//! command, access denied, not found, query failure). Destructive commands
//! fail closed: missing guard flags mean the engine is never touched.

mod admin;
mod data;
mod database;
mod export;
mod query;
mod schema_cmd;
mod util;

use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::access::User;
use crate::engine::{Manager, QueryResult};
use crate::error::Result;
use crate::history::{QueryRecord, Store};
use crate::output::OutputFormat;
use crate::session::SessionRegistry;

type ReloadHook = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Routes commands and owns the shared collaborators.
pub struct Handler {
    manager: Arc<Manager>,
    history: Option<Arc<Store>>,
    registry: Option<Arc<SessionRegistry>>,
    reload_hook: Option<ReloadHook>,
    version: String,
}

impl Handler {
    #[must_use]
    pub fn new(
        manager: Arc<Manager>,
        history: Option<Arc<Store>>,
        registry: Option<Arc<SessionRegistry>>,
        version: impl Into<String>,
    ) -> Self {
        Self { manager, history, registry, reload_hook: None, version: version.into() }
    }

    /// Wire the `reload-config` command to a reload action (server mode).
    #[must_use]
    pub fn with_reload_hook(mut self, hook: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.reload_hook = Some(Arc::new(hook));
        self
    }

    /// Dispatch one command. The context's exit code is 0 unless a handler
    /// reported an error.
    pub fn handle(&self, command: &str, ctx: &mut CommandContext<'_>) {
        match command {
            // Database commands
            "ls" | "list" => self.cmd_list(ctx),
            "info" => self.cmd_info(ctx),
            "tables" => self.cmd_tables(ctx),
            "schema" => self.cmd_schema(ctx),

            // Query commands
            "query" => self.cmd_query(ctx),
            "select" => self.cmd_select(ctx),
            "count" => self.cmd_count(ctx),

            // Data commands
            "insert" => self.cmd_insert(ctx),
            "update" => self.cmd_update(ctx),
            "delete" => self.cmd_delete(ctx),

            // Export commands
            "export" => self.cmd_export(ctx),
            "download" => self.cmd_download(ctx),

            // Schema commands
            "create-table" => self.cmd_create_table(ctx),
            "add-column" => self.cmd_add_column(ctx),
            "drop-table" => self.cmd_drop_table(ctx),

            // Admin commands
            "sessions" => self.cmd_sessions(ctx),
            "history" => self.cmd_history(ctx),
            "audit" => self.cmd_audit(ctx),
            "reload-config" => self.cmd_reload_config(ctx),

            // Utility commands
            "whoami" => self.cmd_whoami(ctx),
            "help" => self.cmd_help(ctx),
            "version" => self.cmd_version(ctx),

            unknown => {
                ctx.fail(format!("Unknown command: {unknown}\nRun 'help' for usage."));
            }
        }
    }

    /// Execute SQL through the manager and persist the query record.
    fn run_query(&self, ctx: &mut CommandContext<'_>, db_name: &str, sql: &str) -> Result<QueryResult> {
        let result = self.manager.execute_query(db_name, &ctx.user, ctx.session_id(), sql);
        self.record_query_history(ctx, db_name, sql, &result);
        result
    }

    /// Persist one query record covering success or failure.
    fn record_query_history(
        &self,
        ctx: &CommandContext<'_>,
        db_name: &str,
        sql: &str,
        result: &Result<QueryResult>,
    ) {
        let Some(history) = &self.history else {
            return;
        };

        let database_path = self
            .manager
            .get(db_name)
            .map(|db| db.path.to_string_lossy().into_owned())
            .unwrap_or_else(|| db_name.to_string());

        let record = match result {
            Ok(r) => QueryRecord {
                id: 0,
                session_id: ctx.session_id().to_string(),
                database_path,
                query: sql.to_string(),
                execution_time_ms: r.duration.as_millis() as i64,
                rows_affected: r.rows_affected as i64,
                error: None,
                created_at: Utc::now(),
            },
            Err(e) => QueryRecord {
                id: 0,
                session_id: ctx.session_id().to_string(),
                database_path,
                query: sql.to_string(),
                execution_time_ms: 0,
                rows_affected: 0,
                error: Some(e.message()),
                created_at: Utc::now(),
            },
        };

        if let Err(e) = history.record_query(&record) {
            warn!(error = %e, "could not persist query record");
        }
    }

    /// Record an audit entry for an action that reached the engine.
    fn record_audit(
        &self,
        ctx: &CommandContext<'_>,
        action: &str,
        db_name: &str,
        table: Option<&str>,
        details: Option<serde_json::Value>,
    ) {
        let Some(history) = &self.history else {
            return;
        };

        let database_path = self
            .manager
            .get(db_name)
            .map(|db| db.path.to_string_lossy().into_owned())
            .unwrap_or_else(|| db_name.to_string());

        if let Err(e) =
            history.record_audit(ctx.session_id(), action, &database_path, table, details.as_ref())
        {
            warn!(error = %e, "could not persist audit record");
        }
    }
}

/// Per-command execution context.
pub struct CommandContext<'a> {
    pub user: User,
    /// Session id assigned by the registry; empty in local one-shot mode
    pub session_id: Option<String>,
    /// Arguments after the command name
    pub args: Vec<String>,
    pub out: &'a mut dyn Write,
    pub err: &'a mut dyn Write,
    exit_code: i32,
}

impl<'a> CommandContext<'a> {
    #[must_use]
    pub fn new(
        user: User,
        session_id: Option<String>,
        args: Vec<String>,
        out: &'a mut dyn Write,
        err: &'a mut dyn Write,
    ) -> Self {
        Self { user, session_id, args, out, err, exit_code: 0 }
    }

    /// The exit code left behind by the handler
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Mark the command failed
    pub fn exit(&mut self, code: i32) {
        self.exit_code = code;
    }

    /// Write a one-line error message and set exit code 1
    pub fn fail(&mut self, message: impl AsRef<str>) {
        let _ = writeln!(self.err, "{}", message.as_ref());
        self.exit(1);
    }

    /// The session id, or empty when running without a registry
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.session_id.as_deref().unwrap_or("")
    }

    /// Value of a `--name=value` flag
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<&str> {
        let long = format!("--{name}=");
        let short = format!("-{name}=");
        self.args.iter().find_map(|arg| {
            arg.strip_prefix(&long).or_else(|| arg.strip_prefix(&short))
        })
    }

    /// Presence of a boolean `--name` flag
    #[must_use]
    pub fn has_flag(&self, name: &str) -> bool {
        let long = format!("--{name}");
        let short = format!("-{name}");
        self.args.iter().any(|arg| arg == &long || arg == &short)
    }

    /// Arguments that are not flags
    #[must_use]
    pub fn positional(&self) -> Vec<&str> {
        self.args
            .iter()
            .filter(|arg| !arg.starts_with('-'))
            .map(String::as_str)
            .collect()
    }

    /// The output format requested by `--format`
    #[must_use]
    pub fn format(&self) -> OutputFormat {
        self.flag("format").map(OutputFormat::parse).unwrap_or_default()
    }

    /// Parsed numeric flag, falling back to a default
    #[must_use]
    pub fn numeric_flag(&self, name: &str, default: usize) -> usize {
        self.flag(name).and_then(|v| v.parse().ok()).unwrap_or(default)
    }
}

impl Handler {
    /// Ensure read access; reports the missing capability on failure.
    fn require_read(&self, ctx: &mut CommandContext<'_>, db_name: &str) -> bool {
        if self.manager.access_level(&ctx.user, db_name).can_read() {
            return true;
        }
        ctx.fail(format!("Access denied: no read access to {db_name}"));
        false
    }

    /// Ensure write access; reports the missing capability on failure.
    fn require_write(&self, ctx: &mut CommandContext<'_>, db_name: &str) -> bool {
        if self.manager.access_level(&ctx.user, db_name).can_write() {
            return true;
        }
        ctx.fail(format!("Access denied: no write access to {db_name}"));
        false
    }

    /// Ensure the caller carries the admin flag.
    fn require_admin(&self, ctx: &mut CommandContext<'_>) -> bool {
        if ctx.user.is_admin && !ctx.user.is_anonymous {
            return true;
        }
        ctx.fail("Access denied: admin access required");
        false
    }
}
