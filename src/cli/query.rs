//! Query commands: `query`, `select`, `count`.


use super::{CommandContext, Handler};
use crate::engine::query::{self, quote_identifier};
use crate::engine::SelectOptions;
use crate::history::actions;
use crate::output::{self, OutputFormat};

impl Handler {
    /// `query <database> "<sql>"`: execute raw SQL. Read access always
    /// required; write access when the SQL classifies as writing.
    pub(super) fn cmd_query(&self, ctx: &mut CommandContext<'_>) {
        let positional = ctx.positional();
        if positional.len() < 2 {
            ctx.fail("Usage: query <database> \"<sql>\"");
            return;
        }
        let (db_name, sql) = (positional[0].to_string(), positional[1].to_string());

        if !self.require_read(ctx, &db_name) {
            return;
        }
        let writing = !query::classify(&sql).is_read_only();
        if writing && !self.require_write(ctx, &db_name) {
            return;
        }

        match self.run_query(ctx, &db_name, &sql) {
            Ok(result) => {
                if writing {
                    self.record_audit(
                        ctx,
                        actions::QUERY,
                        &db_name,
                        None,
                        Some(serde_json::json!({
                            "sql": sql,
                            "rows_affected": result.rows_affected,
                        })),
                    );
                }
                let format = ctx.format();
                let _ = output::print_query_result(ctx.out, &result, format);
            }
            Err(e) => ctx.fail(format!("Query error: {e}")),
        }
    }

    /// `select <database> <table> [--columns] [--where] [--limit]
    /// [--offset]`: browse table data.
    pub(super) fn cmd_select(&self, ctx: &mut CommandContext<'_>) {
        let positional = ctx.positional();
        if positional.len() < 2 {
            ctx.fail("Usage: select <database> <table> [--where=...] [--limit=N] [--offset=N]");
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

        let mut opts = SelectOptions::default();
        if let Some(columns) = ctx.flag("columns") {
            opts.columns = columns
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(where_clause) = ctx.flag("where") {
            opts.where_clause = Some(where_clause.to_string());
        }
        if let Some(order_by) = ctx.flag("order-by") {
            opts.order_by = Some(order_by.to_string());
        }
        opts.limit = ctx.numeric_flag("limit", opts.limit);
        opts.offset = ctx.numeric_flag("offset", 0);

        match query::select(&conn, &table, &opts) {
            Ok(result) => {
                let format = ctx.format();
                let _ = output::print_query_result(ctx.out, &result, format);
            }
            Err(e) => ctx.fail(format!("Query error: {e}")),
        }
    }

    /// `count <database> <table> [--where=...]`: count rows.
    pub(super) fn cmd_count(&self, ctx: &mut CommandContext<'_>) {
        let positional = ctx.positional();
        if positional.len() < 2 {
            ctx.fail("Usage: count <database> <table> [--where=...]");
            return;
        }
        let (db_name, table) = (positional[0].to_string(), positional[1].to_string());

        if !self.require_read(ctx, &db_name) {
            return;
        }

        let mut sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(&table));
        if let Some(where_clause) = ctx.flag("where") {
            sql.push_str(" WHERE ");
            sql.push_str(where_clause);
        }

        match self.run_query(ctx, &db_name, &sql) {
            Ok(result) => {
                let Some(count) = result.rows.first().and_then(|row| row.first()) else {
                    ctx.fail("Query error: count returned no rows");
                    return;
                };
                if ctx.format() == OutputFormat::Json {
                    let _ = output::print_json(
                        ctx.out,
                        &serde_json::json!({"count": query::value_to_json(count)}),
                    );
                } else {
                    let _ = writeln!(ctx.out, "{}", query::format_value(count));
                }
            }
            Err(e) => ctx.fail(format!("Query error: {e}")),
        }
    }
}
