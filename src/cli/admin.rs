//! Admin commands: `sessions`, `history`, `audit`, `reload-config`.


use super::{CommandContext, Handler};
use crate::history::HistoryFilter;
use crate::output::{self, OutputFormat};

impl Handler {
    /// `sessions [--format=json]`: list active sessions.
    pub(super) fn cmd_sessions(&self, ctx: &mut CommandContext<'_>) {
        if !self.require_admin(ctx) {
            return;
        }

        let Some(registry) = &self.registry else {
            ctx.fail("sessions command is only available in server mode");
            return;
        };

        let sessions = registry.list_active();

        if ctx.format() == OutputFormat::Json {
            let entries: Vec<serde_json::Value> = sessions
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "id": s.id,
                        "user": s.user.display_name(),
                        "remote_addr": s.remote_addr,
                        "duration": output::format_duration(s.duration()),
                        "idle": output::format_duration(s.idle_time()),
                    })
                })
                .collect();
            let _ = output::print_json(ctx.out, &entries);
            return;
        }

        if sessions.is_empty() {
            let _ = writeln!(ctx.out, "No active sessions");
            return;
        }

        let _ = writeln!(ctx.out, "ID\tUSER\tREMOTE\tDURATION\tIDLE");
        for s in &sessions {
            let short_id = s.id.get(..8).unwrap_or(&s.id);
            let _ = writeln!(
                ctx.out,
                "{}\t{}\t{}\t{}\t{}",
                short_id,
                s.user.display_name(),
                s.remote_addr.as_deref().unwrap_or("-"),
                output::format_duration(s.duration()),
                output::format_duration(s.idle_time()),
            );
        }
    }

    /// `history [--limit=N] [--format=json]`: recent query history.
    pub(super) fn cmd_history(&self, ctx: &mut CommandContext<'_>) {
        if !self.require_admin(ctx) {
            return;
        }

        let Some(history) = &self.history else {
            ctx.fail("History not available in local mode");
            return;
        };

        let limit = ctx.numeric_flag("limit", 50);
        let records = match history.list_query_history(&HistoryFilter::latest(limit)) {
            Ok(records) => records,
            Err(e) => {
                ctx.fail(format!("Error fetching history: {e}"));
                return;
            }
        };

        if ctx.format() == OutputFormat::Json {
            let _ = output::print_json(ctx.out, &records);
            return;
        }

        if records.is_empty() {
            let _ = writeln!(ctx.out, "No query history");
            return;
        }

        let _ = writeln!(ctx.out, "TIME\tDATABASE\tDURATION\tQUERY");
        for record in &records {
            let _ = writeln!(
                ctx.out,
                "{}\t{}\t{}ms\t{}",
                record.created_at.format("%H:%M:%S"),
                record.database_path,
                record.execution_time_ms,
                output::truncate(&record.query, 50),
            );
        }
    }

    /// `audit [--limit=N] [--format=json]`: recent audit entries.
    pub(super) fn cmd_audit(&self, ctx: &mut CommandContext<'_>) {
        if !self.require_admin(ctx) {
            return;
        }

        let Some(history) = &self.history else {
            ctx.fail("Audit log not available in local mode");
            return;
        };

        let limit = ctx.numeric_flag("limit", 50);
        let entries = match history.list_audit_log(&HistoryFilter::latest(limit)) {
            Ok(entries) => entries,
            Err(e) => {
                ctx.fail(format!("Error fetching audit log: {e}"));
                return;
            }
        };

        if ctx.format() == OutputFormat::Json {
            let _ = output::print_json(ctx.out, &entries);
            return;
        }

        if entries.is_empty() {
            let _ = writeln!(ctx.out, "No audit log entries");
            return;
        }

        let _ = writeln!(ctx.out, "TIME\tACTION\tDATABASE\tTABLE\tDETAILS");
        for entry in &entries {
            let _ = writeln!(
                ctx.out,
                "{}\t{}\t{}\t{}\t{}",
                entry.created_at.format("%H:%M:%S"),
                entry.action,
                entry.database_path,
                entry.table_name.as_deref().unwrap_or(""),
                output::truncate(entry.details.as_deref().unwrap_or(""), 40),
            );
        }
    }

    /// `reload-config`: re-read the configuration through the hook wired
    /// by the server entry point.
    pub(super) fn cmd_reload_config(&self, ctx: &mut CommandContext<'_>) {
        if !self.require_admin(ctx) {
            return;
        }

        let Some(reload) = &self.reload_hook else {
            ctx.fail("reload-config is only available in server mode");
            return;
        };

        match reload() {
            Ok(()) => {
                let _ = writeln!(ctx.out, "Configuration reloaded");
            }
            Err(e) => ctx.fail(format!("Reload failed: {e}")),
        }
    }
}
