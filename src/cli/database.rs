//! Database listing and inspection commands: `ls`, `info`, `tables`,
//! `schema`.


use super::{CommandContext, Handler};
use crate::engine::Introspector;
use crate::output::{self, OutputFormat};

impl Handler {
    /// `ls [--format=json]`: list accessible databases.
    pub(super) fn cmd_list(&self, ctx: &mut CommandContext<'_>) {
        let databases = self.manager.list_databases(&ctx.user);

        if ctx.format() == OutputFormat::Json {
            let _ = output::print_json(ctx.out, &databases);
            return;
        }

        if databases.is_empty() {
            let _ = writeln!(ctx.out, "No accessible databases found.");
            return;
        }

        let _ = writeln!(ctx.out, "ALIAS\tPATH\tSIZE\tACCESS");
        for db in &databases {
            let _ = writeln!(
                ctx.out,
                "{}\t{}\t{}\t{}",
                db.alias,
                db.path.display(),
                output::human_size(db.size),
                db.access_level
            );
        }
    }

    /// `info <database> [--format=json]`: database details.
    pub(super) fn cmd_info(&self, ctx: &mut CommandContext<'_>) {
        let positional = ctx.positional();
        let Some(&db_name) = positional.first() else {
            ctx.fail("Usage: info <database>");
            return;
        };
        let db_name = db_name.to_string();

        if !self.require_read(ctx, &db_name) {
            return;
        }

        let Some(db) = self.manager.get(&db_name) else {
            ctx.fail(format!("Database not found: {db_name}"));
            return;
        };
        let level = self.manager.access_level(&ctx.user, &db_name);

        // Table count is best-effort; a broken file still gets its info line.
        let table_count = self
            .manager
            .open_connection(&db_name, &ctx.user)
            .ok()
            .and_then(|conn| Introspector::new(&conn).list_tables().ok())
            .map(|tables| tables.len());

        if ctx.format() == OutputFormat::Json {
            let mut info = serde_json::json!({
                "alias": db.alias,
                "path": db.path,
                "description": db.description,
                "size": db.size,
                "mod_time": db.mod_time,
                "access": level.to_string(),
            });
            if let Some(count) = table_count {
                info["tables"] = serde_json::json!(count);
            }
            let _ = output::print_json(ctx.out, &info);
            return;
        }

        let _ = writeln!(ctx.out, "Alias:\t{}", db.alias);
        let _ = writeln!(ctx.out, "Path:\t{}", db.path.display());
        if !db.description.is_empty() {
            let _ = writeln!(ctx.out, "Description:\t{}", db.description);
        }
        let _ = writeln!(ctx.out, "Size:\t{}", output::human_size(db.size));
        let _ = writeln!(ctx.out, "Access:\t{level}");
        if let Some(count) = table_count {
            let _ = writeln!(ctx.out, "Tables:\t{count}");
        }
    }

    /// `tables <database> [--format=json]`: list tables with row counts.
    pub(super) fn cmd_tables(&self, ctx: &mut CommandContext<'_>) {
        let positional = ctx.positional();
        let Some(&db_name) = positional.first() else {
            ctx.fail("Usage: tables <database>");
            return;
        };
        let db_name = db_name.to_string();

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

        let schema = Introspector::new(&conn);
        let tables = match schema.list_tables() {
            Ok(tables) => tables,
            Err(e) => {
                ctx.fail(format!("Failed to list tables: {e}"));
                return;
            }
        };

        if ctx.format() == OutputFormat::Json {
            let mut entries = Vec::with_capacity(tables.len());
            for table in &tables {
                if let Ok(info) = schema.get_table_info(table) {
                    entries.push(serde_json::json!({
                        "name": info.name,
                        "columns": info.columns.len(),
                        "rows": info.row_count,
                    }));
                }
            }
            let _ = output::print_json(ctx.out, &entries);
            return;
        }

        if tables.is_empty() {
            let _ = writeln!(ctx.out, "No tables found.");
            return;
        }

        let _ = writeln!(ctx.out, "TABLE\tCOLUMNS\tROWS");
        for table in &tables {
            match schema.get_table_info(table) {
                Ok(info) => {
                    let _ =
                        writeln!(ctx.out, "{}\t{}\t{}", info.name, info.columns.len(), info.row_count);
                }
                Err(_) => {
                    let _ = writeln!(ctx.out, "{table}\t?\t?");
                }
            }
        }
    }

    /// `schema <database> <table> [--format=json]`: table schema detail.
    pub(super) fn cmd_schema(&self, ctx: &mut CommandContext<'_>) {
        let positional = ctx.positional();
        if positional.len() < 2 {
            ctx.fail("Usage: schema <database> <table>");
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

        let schema = Introspector::new(&conn);
        let info = match schema.get_table_info(&table) {
            Ok(info) => info,
            Err(e) => {
                ctx.fail(format!("Failed to get table info: {e}"));
                return;
            }
        };
        let indexes = schema.get_indexes(&table).unwrap_or_default();
        let foreign_keys = schema.get_foreign_keys(&table).unwrap_or_default();

        if ctx.format() == OutputFormat::Json {
            let _ = output::print_json(
                ctx.out,
                &serde_json::json!({
                    "name": info.name,
                    "sql": info.ddl,
                    "columns": info.columns,
                    "primary_key": info.primary_key,
                    "row_count": info.row_count,
                    "indexes": indexes,
                    "foreign_keys": foreign_keys,
                }),
            );
            return;
        }

        let _ = writeln!(ctx.out, "Table: {}", info.name);
        let _ = writeln!(ctx.out, "Rows: {}\n", info.row_count);

        let _ = writeln!(ctx.out, "Columns:");
        let _ = writeln!(ctx.out, "NAME\tTYPE\tNULLABLE\tDEFAULT\tPK");
        for col in &info.columns {
            let nullable = if col.not_null { "NO" } else { "YES" };
            let default = col.default_value.as_deref().unwrap_or("");
            let pk = if col.primary_key > 0 { col.primary_key.to_string() } else { String::new() };
            let _ = writeln!(
                ctx.out,
                "{}\t{}\t{}\t{}\t{}",
                col.name, col.decl_type, nullable, default, pk
            );
        }

        if !indexes.is_empty() {
            let _ = writeln!(ctx.out, "\nIndexes:");
            let _ = writeln!(ctx.out, "NAME\tUNIQUE\tCOLUMNS");
            for idx in &indexes {
                let unique = if idx.unique { "YES" } else { "NO" };
                let _ = writeln!(ctx.out, "{}\t{}\t{}", idx.name, unique, idx.columns.join(", "));
            }
        }

        if !foreign_keys.is_empty() {
            let _ = writeln!(ctx.out, "\nForeign Keys:");
            let _ = writeln!(ctx.out, "FROM\tTO\tON_UPDATE\tON_DELETE");
            for fk in &foreign_keys {
                let _ = writeln!(
                    ctx.out,
                    "{}\t{}.{}\t{}\t{}",
                    fk.from, fk.table, fk.to, fk.on_update, fk.on_delete
                );
            }
        }

        if !info.ddl.is_empty() {
            let _ = writeln!(ctx.out, "\nDDL:\n{}", info.ddl);
        }
    }
}
