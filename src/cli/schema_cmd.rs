//! Structural commands: `create-table`, `add-column`, `drop-table`.
//!
//! Column specs use the mini-grammar `name:type[:modifier]*` joined by
//! commas, with modifiers `pk`, `notnull`, `unique`, and `default=value`.
//! Types pass through to the engine untouched.


use super::{CommandContext, Handler};
use crate::engine::query::quote_identifier;
use crate::history::actions;
use crate::output::{self, OutputFormat};

impl Handler {
    /// `create-table <database> <table> --columns="c:type[:mod],…"` or
    /// `--sql="CREATE TABLE …"`.
    pub(super) fn cmd_create_table(&self, ctx: &mut CommandContext<'_>) {
        let positional = ctx.positional();
        if positional.len() < 2 {
            ctx.fail(
                "Usage: create-table <database> <table> --columns=\"col:type[:pk|notnull],..\"\n   \
                 or: create-table <database> <table> --sql=\"CREATE TABLE ...\"",
            );
            return;
        }
        let (db_name, table) = (positional[0].to_string(), positional[1].to_string());

        if !self.require_write(ctx, &db_name) {
            return;
        }

        let sql = if let Some(raw) = ctx.flag("sql") {
            raw.to_string()
        } else if let Some(spec) = ctx.flag("columns") {
            build_create_table_sql(&table, spec)
        } else {
            ctx.fail("Error: --columns or --sql is required");
            return;
        };

        match self.run_query(ctx, &db_name, &sql) {
            Ok(result) => {
                if ctx.format() == OutputFormat::Json {
                    let _ = output::print_json(
                        ctx.out,
                        &serde_json::json!({
                            "created": table,
                            "rows_affected": result.rows_affected,
                        }),
                    );
                } else {
                    let _ = writeln!(ctx.out, "Table '{table}' created successfully");
                }

                self.record_audit(
                    ctx,
                    actions::CREATE_TABLE,
                    &db_name,
                    Some(&table),
                    Some(serde_json::json!({"sql": sql})),
                );
            }
            Err(e) => ctx.fail(format!("Error creating table: {e}")),
        }
    }

    /// `add-column <database> <table> <column> <type> [--default=...] [--notnull]`
    pub(super) fn cmd_add_column(&self, ctx: &mut CommandContext<'_>) {
        let positional = ctx.positional();
        if positional.len() < 4 {
            ctx.fail("Usage: add-column <database> <table> <column> <type> [--default=...] [--notnull]");
            return;
        }
        let (db_name, table, column, col_type) = (
            positional[0].to_string(),
            positional[1].to_string(),
            positional[2].to_string(),
            positional[3].to_string(),
        );

        if !self.require_write(ctx, &db_name) {
            return;
        }

        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_identifier(&table),
            quote_identifier(&column),
            col_type
        );
        if ctx.has_flag("notnull") {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = ctx.flag("default") {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }

        match self.run_query(ctx, &db_name, &sql) {
            Ok(_) => {
                if ctx.format() == OutputFormat::Json {
                    let _ = output::print_json(
                        ctx.out,
                        &serde_json::json!({"added": column, "table": table, "type": col_type}),
                    );
                } else {
                    let _ = writeln!(ctx.out, "Column '{column}' added to table '{table}'");
                }

                self.record_audit(
                    ctx,
                    actions::ADD_COLUMN,
                    &db_name,
                    Some(&table),
                    Some(serde_json::json!({"sql": sql})),
                );
            }
            Err(e) => ctx.fail(format!("Error adding column: {e}")),
        }
    }

    /// `drop-table <database> <table> --confirm`
    pub(super) fn cmd_drop_table(&self, ctx: &mut CommandContext<'_>) {
        let positional = ctx.positional();
        if positional.len() < 2 {
            ctx.fail("Usage: drop-table <database> <table> --confirm");
            return;
        }
        let (db_name, table) = (positional[0].to_string(), positional[1].to_string());

        if !self.require_write(ctx, &db_name) {
            return;
        }

        if !ctx.has_flag("confirm") {
            ctx.fail(
                "Error: --confirm is required to drop a table\n\
                 This will permanently delete the table and all its data.",
            );
            return;
        }

        let sql = format!("DROP TABLE {}", quote_identifier(&table));

        match self.run_query(ctx, &db_name, &sql) {
            Ok(_) => {
                if ctx.format() == OutputFormat::Json {
                    let _ = output::print_json(ctx.out, &serde_json::json!({"dropped": table}));
                } else {
                    let _ = writeln!(ctx.out, "Table '{table}' dropped");
                }

                self.record_audit(ctx, actions::DROP_TABLE, &db_name, Some(&table), None);
            }
            Err(e) => ctx.fail(format!("Error dropping table: {e}")),
        }
    }
}

/// Build a CREATE TABLE statement from the column-spec mini-grammar.
fn build_create_table_sql(table: &str, spec: &str) -> String {
    let mut definitions = Vec::new();

    for column in spec.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let parts: Vec<&str> = column.split(':').map(str::trim).collect();
        if parts.len() < 2 {
            continue;
        }

        let mut definition = format!("{} {}", quote_identifier(parts[0]), parts[1]);
        for modifier in &parts[2..] {
            let lower = modifier.to_lowercase();
            match lower.as_str() {
                "pk" => definition.push_str(" PRIMARY KEY"),
                "notnull" => definition.push_str(" NOT NULL"),
                "unique" => definition.push_str(" UNIQUE"),
                _ => {
                    if let Some(value) = lower.strip_prefix("default=") {
                        definition.push_str(" DEFAULT ");
                        definition.push_str(value);
                    }
                }
            }
        }

        definitions.push(definition);
    }

    format!("CREATE TABLE {} ({})", quote_identifier(table), definitions.join(", "))
}
