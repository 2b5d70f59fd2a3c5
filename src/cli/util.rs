//! Utility commands: `whoami`, `help`, `version`.


use super::{CommandContext, Handler};
use crate::output::{self, OutputFormat};

const HELP_TEXT: &str = r#"sqlite-tui - Database Studio for SQLite

USAGE:
  ssh host command [arguments] [options]

DATABASE COMMANDS:
  ls, list                         List accessible databases
  info <database>                  Show database information
  tables <database>                List tables in database
  schema <database> <table>        Show table schema

QUERY COMMANDS:
  query <database> "<sql>"         Execute SQL query
  select <database> <table>        Browse table data
  count <database> <table>         Count rows in table

DATA COMMANDS (requires write access):
  insert <database> <table> --json='{"col":"val"}'
  update <database> <table> --where="id=1" --set='{"col":"val"}'
  delete <database> <table> --where="id=1" --confirm

EXPORT COMMANDS:
  export <database> <table>        Export table data
  download <database>              Download raw database file

SCHEMA COMMANDS (requires write access):
  create-table <database> <table>  Create new table
  add-column <database> <table>    Add column to table
  drop-table <database> <table>    Drop table (requires --confirm)

ADMIN COMMANDS (requires admin access):
  sessions                         List active sessions
  history                          View query history
  audit                            View audit log
  reload-config                    Reload configuration

UTILITY COMMANDS:
  whoami                           Show current user info
  help [command]                   Show help
  version                          Show version

COMMON OPTIONS:
  --format=json                    Output in JSON format
  --format=csv                     Output in CSV format
  --limit=N                        Limit number of rows
  --offset=N                       Skip N rows

Run 'help <command>' for detailed help on a specific command."#;

impl Handler {
    /// `whoami [--format=json]`: current caller identity.
    pub(super) fn cmd_whoami(&self, ctx: &mut CommandContext<'_>) {
        if ctx.format() == OutputFormat::Json {
            let mut info = serde_json::json!({
                "name": ctx.user.display_name(),
                "admin": ctx.user.is_admin,
                "anonymous": ctx.user.is_anonymous,
                "session_id": ctx.session_id(),
            });
            if let Some(fp) = &ctx.user.public_key_fingerprint {
                info["public_key_fp"] = serde_json::json!(fp);
            }
            let _ = output::print_json(ctx.out, &info);
            return;
        }

        let _ = writeln!(ctx.out, "User:\t{}", ctx.user.display_name());
        let _ = writeln!(ctx.out, "Admin:\t{}", ctx.user.is_admin);
        let _ = writeln!(ctx.out, "Anonymous:\t{}", ctx.user.is_anonymous);
        if let Some(fp) = &ctx.user.public_key_fingerprint {
            let _ = writeln!(ctx.out, "Key:\t{fp}");
        }
        let session_id = ctx.session_id().to_string();
        let _ = writeln!(ctx.out, "Session:\t{}", session_id);
    }

    /// `help [command]`
    pub(super) fn cmd_help(&self, ctx: &mut CommandContext<'_>) {
        let page = ctx.positional().first().map(|command| command_help(command));
        match page {
            Some(page) => {
                let _ = writeln!(ctx.out, "{page}");
            }
            None => {
                let _ = writeln!(ctx.out, "{HELP_TEXT}");
            }
        }
    }

    /// `version [--format=json]`
    pub(super) fn cmd_version(&self, ctx: &mut CommandContext<'_>) {
        if ctx.format() == OutputFormat::Json {
            let _ = output::print_json(ctx.out, &serde_json::json!({"version": self.version}));
            return;
        }
        let _ = writeln!(ctx.out, "sqlite-tui {}", self.version);
    }
}

/// Per-command help pages.
fn command_help(command: &str) -> String {
    let page = match command {
        "ls" | "list" => {
            "ls, list - List accessible databases\n\nUSAGE:\n  ls [--format=json]\n\nOPTIONS:\n  --format=json    Output in JSON format"
        }
        "query" => {
            "query - Execute SQL query\n\nUSAGE:\n  query <database> \"<sql>\" [options]\n\nOPTIONS:\n  --format=json    Output results as JSON\n  --format=csv     Output results as CSV\n  --format=table   Output results as table (default)\n\nEXAMPLES:\n  query mydb \"SELECT * FROM users\"\n  query mydb \"SELECT * FROM users WHERE active=1\" --format=json"
        }
        "select" => {
            "select - Browse table data\n\nUSAGE:\n  select <database> <table> [options]\n\nOPTIONS:\n  --columns=\"col1,col2\"    Select specific columns\n  --where=\"condition\"      Filter rows\n  --limit=N                Limit rows (default: 100)\n  --offset=N               Skip N rows\n  --format=json            Output as JSON\n  --format=csv             Output as CSV\n\nEXAMPLES:\n  select mydb users\n  select mydb users --limit=10 --format=json\n  select mydb users --where=\"active=1\" --columns=\"id,name\""
        }
        "export" => {
            "export - Export table data\n\nUSAGE:\n  export <database> <table> [options]\n\nOPTIONS:\n  --format=csv     Export as CSV (default)\n  --format=json    Export as JSON\n\nOUTPUT:\n  Data is written to stdout. Redirect to a file:\n  ssh host export mydb users --format=csv > users.csv"
        }
        "download" => {
            "download - Download raw database file\n\nUSAGE:\n  download <database>\n\nStreams the raw SQLite database file to stdout.\nRequires at least read access to the database.\n\nEXAMPLE:\n  ssh host download mydb > mydb.db"
        }
        "insert" => {
            "insert - Insert a row\n\nUSAGE:\n  insert <database> <table> --json='{\"column\":\"value\"}'\n\nThe --json flag should contain a JSON object mapping column names to values.\n\nEXAMPLE:\n  insert mydb users --json='{\"name\":\"John\",\"email\":\"john@example.com\"}'"
        }
        "update" => {
            "update - Update rows\n\nUSAGE:\n  update <database> <table> --where=\"condition\" --set='{\"column\":\"value\"}'\n\nBoth --where and --set are required.\n\nEXAMPLE:\n  update mydb users --where=\"id=1\" --set='{\"name\":\"Jane\"}'"
        }
        "delete" => {
            "delete - Delete rows\n\nUSAGE:\n  delete <database> <table> --where=\"condition\" --confirm\n\nThe --confirm or --force flag is required to prevent accidental deletes.\n\nEXAMPLE:\n  delete mydb users --where=\"id=1\" --confirm"
        }
        "create-table" => {
            "create-table - Create a new table\n\nUSAGE:\n  create-table <database> <table> --columns=\"name:type[:modifier],...\"\n  create-table <database> <table> --sql=\"CREATE TABLE ...\"\n\nModifiers: pk, notnull, unique, default=value\n\nEXAMPLE:\n  create-table mydb tags --columns=\"id:INTEGER:pk,label:TEXT:notnull:unique\""
        }
        other => return format!("No detailed help available for '{other}'"),
    };
    page.to_string()
}
