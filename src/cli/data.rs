//! Data mutation commands: `insert`, `update`, `delete`.
//!
//! All three check write access first, hold the advisory write lock for the
//! duration of the statement, and audit what reached the engine. The guard
//! flags fail closed: a missing `--where` or `--confirm` means the engine
//! is never touched.


use super::{CommandContext, Handler};
use crate::engine::query;
use crate::history::actions;
use crate::output::{self, OutputFormat};

impl Handler {
    /// `insert <database> <table> --json='{"col":"val"}'`
    pub(super) fn cmd_insert(&self, ctx: &mut CommandContext<'_>) {
        let positional = ctx.positional();
        if positional.len() < 2 {
            ctx.fail("Usage: insert <database> <table> --json='{\"col\":\"val\"}'");
            return;
        }
        let (db_name, table) = (positional[0].to_string(), positional[1].to_string());

        if !self.require_write(ctx, &db_name) {
            return;
        }

        let Some(json_data) = ctx.flag("json").map(str::to_string) else {
            ctx.fail("Error: --json flag is required");
            return;
        };
        let data: serde_json::Map<String, serde_json::Value> =
            match serde_json::from_str(&json_data) {
                Ok(data) => data,
                Err(e) => {
                    ctx.fail(format!("Error parsing JSON: {e}"));
                    return;
                }
            };

        let conn = match self.manager.open_connection(&db_name, &ctx.user) {
            Ok(conn) => conn,
            Err(e) => {
                ctx.fail(format!("Failed to open database: {e}"));
                return;
            }
        };

        let path = conn.path().to_string_lossy().into_owned();
        let result = self.manager.locks().with_write_lock(
            &path,
            ctx.user.display_name(),
            ctx.session_id(),
            || query::insert(&conn, &table, &data),
        );

        match result {
            Ok(result) => {
                if ctx.format() == OutputFormat::Json {
                    let _ = output::print_json(
                        ctx.out,
                        &serde_json::json!({
                            "last_insert_id": result.last_insert_id,
                            "rows_affected": result.rows_affected,
                        }),
                    );
                } else {
                    let _ = writeln!(ctx.out, "Inserted row with ID: {}", result.last_insert_id);
                }

                self.record_audit(
                    ctx,
                    actions::INSERT,
                    &db_name,
                    Some(&table),
                    Some(serde_json::json!({"data": json_data})),
                );
            }
            Err(e) => ctx.fail(format!("Insert error: {e}")),
        }
    }

    /// `update <database> <table> --where="..." --set='{"col":"val"}'`
    pub(super) fn cmd_update(&self, ctx: &mut CommandContext<'_>) {
        let positional = ctx.positional();
        if positional.len() < 2 {
            ctx.fail("Usage: update <database> <table> --where=\"...\" --set='{\"col\":\"val\"}'");
            return;
        }
        let (db_name, table) = (positional[0].to_string(), positional[1].to_string());

        if !self.require_write(ctx, &db_name) {
            return;
        }

        let Some(where_clause) = ctx.flag("where").map(str::to_string) else {
            ctx.fail("Error: --where is required to prevent accidental full-table updates");
            return;
        };
        let Some(set_data) = ctx.flag("set").map(str::to_string) else {
            ctx.fail("Error: --set flag is required");
            return;
        };
        let data: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(&set_data)
        {
            Ok(data) => data,
            Err(e) => {
                ctx.fail(format!("Error parsing JSON: {e}"));
                return;
            }
        };

        let conn = match self.manager.open_connection(&db_name, &ctx.user) {
            Ok(conn) => conn,
            Err(e) => {
                ctx.fail(format!("Failed to open database: {e}"));
                return;
            }
        };

        let path = conn.path().to_string_lossy().into_owned();
        let result = self.manager.locks().with_write_lock(
            &path,
            ctx.user.display_name(),
            ctx.session_id(),
            || query::update(&conn, &table, &data, &where_clause, &[]),
        );

        match result {
            Ok(result) => {
                if ctx.format() == OutputFormat::Json {
                    let _ = output::print_json(
                        ctx.out,
                        &serde_json::json!({"rows_affected": result.rows_affected}),
                    );
                } else {
                    let _ = writeln!(ctx.out, "Updated {} row(s)", result.rows_affected);
                }

                self.record_audit(
                    ctx,
                    actions::UPDATE,
                    &db_name,
                    Some(&table),
                    Some(serde_json::json!({"where": where_clause, "set": set_data})),
                );
            }
            Err(e) => ctx.fail(format!("Update error: {e}")),
        }
    }

    /// `delete <database> <table> --where="..." --confirm`
    pub(super) fn cmd_delete(&self, ctx: &mut CommandContext<'_>) {
        let positional = ctx.positional();
        if positional.len() < 2 {
            ctx.fail("Usage: delete <database> <table> --where=\"...\" --confirm");
            return;
        }
        let (db_name, table) = (positional[0].to_string(), positional[1].to_string());

        if !self.require_write(ctx, &db_name) {
            return;
        }

        if !ctx.has_flag("confirm") && !ctx.has_flag("force") {
            ctx.fail("Error: --confirm is required to prevent accidental deletes");
            return;
        }

        let Some(where_clause) = ctx.flag("where").map(str::to_string) else {
            ctx.fail("Error: --where is required to prevent accidental full-table deletes");
            return;
        };

        let conn = match self.manager.open_connection(&db_name, &ctx.user) {
            Ok(conn) => conn,
            Err(e) => {
                ctx.fail(format!("Failed to open database: {e}"));
                return;
            }
        };

        let path = conn.path().to_string_lossy().into_owned();
        let result = self.manager.locks().with_write_lock(
            &path,
            ctx.user.display_name(),
            ctx.session_id(),
            || query::delete(&conn, &table, &where_clause, &[]),
        );

        match result {
            Ok(result) => {
                if ctx.format() == OutputFormat::Json {
                    let _ = output::print_json(
                        ctx.out,
                        &serde_json::json!({"rows_affected": result.rows_affected}),
                    );
                } else {
                    let _ = writeln!(ctx.out, "Deleted {} row(s)", result.rows_affected);
                }

                self.record_audit(
                    ctx,
                    actions::DELETE,
                    &db_name,
                    Some(&table),
                    Some(serde_json::json!({"where": where_clause})),
                );
            }
            Err(e) => ctx.fail(format!("Delete error: {e}")),
        }
    }
}
