//! Export commands: `export`, `download`.

use super::{CommandContext, Handler};
use crate::engine::query;
use crate::engine::SelectOptions;
use crate::history::actions;
use crate::output::{self, OutputFormat};

impl Handler {
    /// `export <database> <table> [--format=csv|json] [--where=...]`:
    /// export table rows to stdout. Defaults to CSV.
    pub(super) fn cmd_export(&self, ctx: &mut CommandContext<'_>) {
        let positional = ctx.positional();
        if positional.len() < 2 {
            ctx.fail("Usage: export <database> <table> [--format=csv|json]");
            return;
        }
        let (db_name, table) = (positional[0].to_string(), positional[1].to_string());

        if !self.require_read(ctx, &db_name) {
            return;
        }

        let conn = match self.manager.open_connection(&db_name, &ctx.user) {
            Ok(conn) => conn,
            Err(e) => {
                ctx.fail(format!("Failed to open database: {e}"));
                return;
            }
        };

        let mut opts = SelectOptions::unlimited();
        if let Some(where_clause) = ctx.flag("where") {
            opts.where_clause = Some(where_clause.to_string());
        }

        let result = match query::select(&conn, &table, &opts) {
            Ok(result) => result,
            Err(e) => {
                ctx.fail(format!("Query error: {e}"));
                return;
            }
        };

        // Exports default to CSV, unlike the table default elsewhere.
        let format = match ctx.flag("format") {
            None => OutputFormat::Csv,
            Some("csv") => OutputFormat::Csv,
            Some("json") => OutputFormat::Json,
            Some(other) => {
                ctx.fail(format!("Unknown format: {other} (use csv or json)"));
                return;
            }
        };

        let _ = output::print_query_result(ctx.out, &result, format);

        self.record_audit(
            ctx,
            actions::EXPORT,
            &db_name,
            Some(&table),
            Some(serde_json::json!({"rows": result.rows.len()})),
        );
    }

    /// `download <database>`: stream the raw database file to stdout.
    pub(super) fn cmd_download(&self, ctx: &mut CommandContext<'_>) {
        let positional = ctx.positional();
        let Some(&db_name) = positional.first() else {
            ctx.fail("Usage: download <database>");
            return;
        };
        let db_name = db_name.to_string();

        if !self.require_read(ctx, &db_name) {
            return;
        }

        match self.manager.stream_database(&db_name, &ctx.user, ctx.out) {
            Ok(bytes) => {
                self.record_audit(
                    ctx,
                    actions::DOWNLOAD,
                    &db_name,
                    None,
                    Some(serde_json::json!({"bytes": bytes})),
                );
            }
            Err(e) => ctx.fail(format!("Download error: {e}")),
        }
    }
}
