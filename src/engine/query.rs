//! Query Classification and Execution
//!
//! The classifier is a coarse gate, not a guarantee: the first token decides
//! read-only versus writing, and the authoritative write ban is the
//! read-only connection mode itself. Execution materializes read results
//! and reports affected-row counts for writes.
//!
//! # Safety Rules
//! - Identifier quoting is centralized in [`quote_identifier`]; callers
//!   never concatenate table or column names into raw SQL
//! - Parameter binding is the only path for untrusted values; WHERE and
//!   ORDER BY fragments are accepted verbatim because users compose them

use std::time::{Duration, Instant};

use rusqlite::types::{Value, ValueRef};

use super::connection::Connection;
use crate::error::{Result, StudioError};

/// Coarse classification of a SQL statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// SELECT, PRAGMA, EXPLAIN, WITH
    ReadOnly,
    /// Everything else
    Write,
}

impl QueryKind {
    /// True for the read-only classification
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

/// Classify a SQL statement by its leading keyword.
#[must_use]
pub fn classify(sql: &str) -> QueryKind {
    let upper = sql.trim_start().to_uppercase();
    let read_only = upper.starts_with("SELECT")
        || upper.starts_with("PRAGMA")
        || upper.starts_with("EXPLAIN")
        || upper.starts_with("WITH");

    if read_only {
        QueryKind::ReadOnly
    } else {
        QueryKind::Write
    }
}

/// Structured result of a query execution
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Column names in result-set order (empty for writes)
    pub columns: Vec<String>,
    /// Materialized rows; raw byte buffers are normalized to text
    pub rows: Vec<Vec<Value>>,
    /// Rows changed by a write
    pub rows_affected: u64,
    /// rowid of the last inserted row (writes only)
    pub last_insert_id: i64,
    /// Wall-clock execution time
    pub duration: Duration,
    /// Whether the statement was classified read-only
    pub is_select: bool,
}

/// Execute a statement, dispatching on its classification.
pub fn execute(conn: &Connection, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let start = Instant::now();
    match classify(sql) {
        QueryKind::ReadOnly => execute_read(conn, sql, params, start),
        QueryKind::Write => execute_write(conn, sql, params, start),
    }
}

fn execute_read(
    conn: &Connection,
    sql: &str,
    params: &[Value],
    start: Instant,
) -> Result<QueryResult> {
    conn.with_handle(|c| {
        let mut stmt = c.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();

        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut materialized = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                values.push(normalize(row.get_ref(idx)?));
            }
            materialized.push(values);
        }

        Ok(QueryResult {
            columns,
            rows: materialized,
            duration: start.elapsed(),
            is_select: true,
            ..QueryResult::default()
        })
    })
}

fn execute_write(
    conn: &Connection,
    sql: &str,
    params: &[Value],
    start: Instant,
) -> Result<QueryResult> {
    conn.with_handle(|c| {
        let mut stmt = c.prepare(sql)?;
        let changed = stmt.execute(rusqlite::params_from_iter(params.iter()))?;

        Ok(QueryResult {
            rows_affected: changed as u64,
            last_insert_id: c.last_insert_rowid(),
            duration: start.elapsed(),
            is_select: false,
            ..QueryResult::default()
        })
    })
}

/// Materialize a single cell, converting raw byte buffers to text.
fn normalize(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Blob(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        other => other.into(),
    }
}

/// Options for the structured SELECT builder
#[derive(Debug, Clone)]
pub struct SelectOptions {
    /// Columns to select; empty means `*`
    pub columns: Vec<String>,
    /// WHERE clause, passed through verbatim
    pub where_clause: Option<String>,
    /// ORDER BY clause, passed through verbatim
    pub order_by: Option<String>,
    /// Row limit; 0 disables the limit
    pub limit: usize,
    /// Row offset
    pub offset: usize,
    /// Bound parameters for the WHERE clause
    pub args: Vec<Value>,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            where_clause: None,
            order_by: None,
            limit: 100,
            offset: 0,
            args: Vec::new(),
        }
    }
}

impl SelectOptions {
    /// Options for exports: every row, no paging
    #[must_use]
    pub fn unlimited() -> Self {
        Self { limit: 0, ..Self::default() }
    }
}

/// Retrieve rows from a table.
pub fn select(conn: &Connection, table: &str, opts: &SelectOptions) -> Result<QueryResult> {
    let cols = if opts.columns.is_empty() {
        "*".to_string()
    } else {
        opts.columns.iter().map(|c| quote_identifier(c)).collect::<Vec<_>>().join(", ")
    };

    let mut sql = format!("SELECT {cols} FROM {}", quote_identifier(table));
    if let Some(where_clause) = opts.where_clause.as_deref() {
        sql.push_str(" WHERE ");
        sql.push_str(where_clause);
    }
    if let Some(order_by) = opts.order_by.as_deref() {
        sql.push_str(" ORDER BY ");
        sql.push_str(order_by);
    }
    if opts.limit > 0 {
        sql.push_str(&format!(" LIMIT {}", opts.limit));
    }
    if opts.offset > 0 {
        sql.push_str(&format!(" OFFSET {}", opts.offset));
    }

    execute(conn, &sql, &opts.args)
}

/// Insert a row built from a column → value map.
pub fn insert(
    conn: &Connection,
    table: &str,
    data: &serde_json::Map<String, serde_json::Value>,
) -> Result<QueryResult> {
    if data.is_empty() {
        return Err(StudioError::bad_request("no data to insert"));
    }

    let mut columns = Vec::with_capacity(data.len());
    let mut placeholders = Vec::with_capacity(data.len());
    let mut values = Vec::with_capacity(data.len());
    for (column, value) in data {
        columns.push(quote_identifier(column));
        placeholders.push("?");
        values.push(json_to_value(value));
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        columns.join(", "),
        placeholders.join(", ")
    );

    execute(conn, &sql, &values)
}

/// Update rows matching a WHERE clause with a column → value map.
pub fn update(
    conn: &Connection,
    table: &str,
    data: &serde_json::Map<String, serde_json::Value>,
    where_clause: &str,
    where_args: &[Value],
) -> Result<QueryResult> {
    if data.is_empty() {
        return Err(StudioError::bad_request("no data to update"));
    }

    let mut assignments = Vec::with_capacity(data.len());
    let mut values = Vec::with_capacity(data.len() + where_args.len());
    for (column, value) in data {
        assignments.push(format!("{} = ?", quote_identifier(column)));
        values.push(json_to_value(value));
    }
    values.extend_from_slice(where_args);

    let mut sql = format!("UPDATE {} SET {}", quote_identifier(table), assignments.join(", "));
    if !where_clause.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(where_clause);
    }

    execute(conn, &sql, &values)
}

/// Delete rows matching a WHERE clause. An empty clause deletes every row;
/// the command surface guards against that before reaching here.
pub fn delete(
    conn: &Connection,
    table: &str,
    where_clause: &str,
    where_args: &[Value],
) -> Result<QueryResult> {
    let mut sql = format!("DELETE FROM {}", quote_identifier(table));
    if !where_clause.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(where_clause);
    }

    execute(conn, &sql, where_args)
}

/// Update a single cell identified by primary key.
pub fn update_cell(
    conn: &Connection,
    table: &str,
    pk_column: &str,
    pk_value: Value,
    column: &str,
    new_value: Value,
) -> Result<QueryResult> {
    let sql = format!(
        "UPDATE {} SET {} = ? WHERE {} = ?",
        quote_identifier(table),
        quote_identifier(column),
        quote_identifier(pk_column)
    );

    execute(conn, &sql, &[new_value, pk_value])
}

/// Quote a SQL identifier by doubling embedded double quotes.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Convert a JSON value to a SQLite value. Booleans become 0/1; arrays and
/// objects are stored as their JSON text.
#[must_use]
pub fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Real(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

/// Convert a SQLite value to JSON. Non-UTF-8 blobs are Base64-encoded for
/// JSON safety.
#[must_use]
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::Number((*i).into()),
        Value::Real(f) => serde_json::Number::from_f64(*f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Blob(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => serde_json::Value::String(text.to_string()),
            Err(_) => {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                serde_json::Value::String(encoded)
            }
        },
    }
}

/// Render a value for tabular display.
#[must_use]
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => format_float(*f),
        Value::Text(s) => s.clone(),
        Value::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Shortest-form float rendering, switching to exponent notation outside
/// the comfortable decimal range.
fn format_float(f: f64) -> String {
    if f == 0.0 {
        return "0".to_string();
    }
    let magnitude = f.abs();
    if magnitude >= 1e15 || magnitude < 1e-4 {
        format!("{f:e}")
    } else {
        format!("{f}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_scratch() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scratch.db");
        let conn = Connection::open_read_write(&path).expect("open");
        conn.with_handle(|c| {
            c.execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)",
                [],
            )?;
            Ok(())
        })
        .expect("schema");
        (dir, conn)
    }

    #[test]
    fn test_classify_read_only() {
        assert_eq!(classify("SELECT * FROM t"), QueryKind::ReadOnly);
        assert_eq!(classify("  select 1"), QueryKind::ReadOnly);
        assert_eq!(classify("PRAGMA table_info(t)"), QueryKind::ReadOnly);
        assert_eq!(classify("EXPLAIN SELECT 1"), QueryKind::ReadOnly);
        assert_eq!(classify("WITH x AS (SELECT 1) SELECT * FROM x"), QueryKind::ReadOnly);
    }

    #[test]
    fn test_classify_write() {
        assert_eq!(classify("INSERT INTO t VALUES (1)"), QueryKind::Write);
        assert_eq!(classify("UPDATE t SET x = 1"), QueryKind::Write);
        assert_eq!(classify("DELETE FROM t"), QueryKind::Write);
        assert_eq!(classify("DROP TABLE t"), QueryKind::Write);
        assert_eq!(classify("CREATE TABLE t (id INTEGER)"), QueryKind::Write);
    }

    #[test]
    fn test_quote_identifier_round_trip() {
        for name in ["users", "weird name", "has\"quote", "\"\"", "mixed\"up\"names"] {
            let quoted = quote_identifier(name);
            assert!(quoted.starts_with('"') && quoted.ends_with('"'));
            // Strip outer quotes, fold doubled quotes back: the original
            // must survive the round trip.
            let inner = &quoted[1..quoted.len() - 1];
            assert_eq!(inner.replace("\"\"", "\""), name);
        }
    }

    #[test]
    fn test_insert_then_select_by_pk() {
        let (_dir, conn) = open_scratch();

        let mut data = serde_json::Map::new();
        data.insert("name".to_string(), serde_json::json!("Ada"));
        data.insert("age".to_string(), serde_json::json!(36));
        let inserted = insert(&conn, "users", &data).expect("insert");
        assert_eq!(inserted.rows_affected, 1);

        let result = execute(
            &conn,
            "SELECT name, age FROM users WHERE id = ?",
            &[Value::Integer(inserted.last_insert_id)],
        )
        .expect("select");
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0][0], Value::Text("Ada".to_string()));
        assert_eq!(result.rows[0][1], Value::Integer(36));
    }

    #[test]
    fn test_insert_empty_map_is_bad_request() {
        let (_dir, conn) = open_scratch();
        let err = insert(&conn, "users", &serde_json::Map::new()).unwrap_err();
        assert_eq!(err.error_code(), "BAD_REQUEST");
    }

    #[test]
    fn test_injection_literal_is_preserved() {
        let (_dir, conn) = open_scratch();

        let hostile = "Robert'); DROP TABLE users; --";
        let mut data = serde_json::Map::new();
        data.insert("name".to_string(), serde_json::json!(hostile));
        let inserted = insert(&conn, "users", &data).expect("insert");

        // The table survived and the literal came back intact.
        let result = execute(
            &conn,
            "SELECT name FROM users WHERE id = ?",
            &[Value::Integer(inserted.last_insert_id)],
        )
        .expect("select");
        assert_eq!(result.rows[0][0], Value::Text(hostile.to_string()));
    }

    #[test]
    fn test_hostile_table_name_is_quoted() {
        let (_dir, conn) = open_scratch();
        // A table name full of SQL noise is just an identifier once quoted.
        let name = "users\"; DROP TABLE users; --";
        execute(&conn, &format!("CREATE TABLE {} (id INTEGER)", quote_identifier(name)), &[])
            .expect("create");

        let mut data = serde_json::Map::new();
        data.insert("id".to_string(), serde_json::json!(7));
        insert(&conn, name, &data).expect("insert");

        let count =
            execute(&conn, &format!("SELECT COUNT(*) FROM {}", quote_identifier(name)), &[])
                .expect("count");
        assert_eq!(count.rows[0][0], Value::Integer(1));
    }

    #[test]
    fn test_update_no_match_affects_zero() {
        let (_dir, conn) = open_scratch();

        let mut data = serde_json::Map::new();
        data.insert("name".to_string(), serde_json::json!("nobody"));
        let result =
            update(&conn, "users", &data, "id = ?", &[Value::Integer(9999)]).expect("update");
        assert_eq!(result.rows_affected, 0);
    }

    #[test]
    fn test_update_empty_map_is_bad_request() {
        let (_dir, conn) = open_scratch();
        let err = update(&conn, "users", &serde_json::Map::new(), "id = 1", &[]).unwrap_err();
        assert_eq!(err.error_code(), "BAD_REQUEST");
    }

    #[test]
    fn test_delete_with_where() {
        let (_dir, conn) = open_scratch();

        for name in ["a", "b", "c"] {
            let mut data = serde_json::Map::new();
            data.insert("name".to_string(), serde_json::json!(name));
            insert(&conn, "users", &data).expect("insert");
        }

        let result =
            delete(&conn, "users", "name = ?", &[Value::Text("b".to_string())]).expect("delete");
        assert_eq!(result.rows_affected, 1);

        let remaining = execute(&conn, "SELECT COUNT(*) FROM users", &[]).expect("count");
        assert_eq!(remaining.rows[0][0], Value::Integer(2));
    }

    #[test]
    fn test_select_pagination() {
        let (_dir, conn) = open_scratch();
        for i in 0..10 {
            let mut data = serde_json::Map::new();
            data.insert("name".to_string(), serde_json::json!(format!("user{i}")));
            insert(&conn, "users", &data).expect("insert");
        }

        let opts = SelectOptions {
            order_by: Some("id".to_string()),
            limit: 3,
            offset: 4,
            ..SelectOptions::default()
        };
        let result = select(&conn, "users", &opts).expect("select");
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[0][1], Value::Text("user4".to_string()));
    }

    #[test]
    fn test_select_specific_columns_and_where() {
        let (_dir, conn) = open_scratch();
        let mut data = serde_json::Map::new();
        data.insert("name".to_string(), serde_json::json!("Ada"));
        data.insert("age".to_string(), serde_json::json!(36));
        insert(&conn, "users", &data).expect("insert");

        let opts = SelectOptions {
            columns: vec!["name".to_string()],
            where_clause: Some("age > ?".to_string()),
            args: vec![Value::Integer(30)],
            ..SelectOptions::default()
        };
        let result = select(&conn, "users", &opts).expect("select");
        assert_eq!(result.columns, vec!["name".to_string()]);
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn test_update_cell() {
        let (_dir, conn) = open_scratch();
        let mut data = serde_json::Map::new();
        data.insert("name".to_string(), serde_json::json!("Ada"));
        let inserted = insert(&conn, "users", &data).expect("insert");

        let result = update_cell(
            &conn,
            "users",
            "id",
            Value::Integer(inserted.last_insert_id),
            "name",
            Value::Text("Grace".to_string()),
        )
        .expect("update cell");
        assert_eq!(result.rows_affected, 1);
    }

    #[test]
    fn test_write_on_read_only_connection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ro.db");
        {
            let conn = Connection::open_read_write(&path).expect("open rw");
            conn.with_handle(|c| {
                c.execute("CREATE TABLE t (id INTEGER)", [])?;
                Ok(())
            })
            .expect("schema");
        }

        let conn = Connection::open_read_only(&path).expect("open ro");
        let err = execute(&conn, "INSERT INTO t (id) VALUES (1)", &[]).unwrap_err();
        assert_eq!(err.error_code(), "READ_ONLY");
    }

    #[test]
    fn test_blob_rows_normalize_to_text() {
        let (_dir, conn) = open_scratch();
        conn.with_handle(|c| {
            c.execute("CREATE TABLE blobs (data BLOB)", [])?;
            c.execute("INSERT INTO blobs (data) VALUES (?)", [Value::Blob(b"hello".to_vec())])?;
            Ok(())
        })
        .expect("setup");

        let result = execute(&conn, "SELECT data FROM blobs", &[]).expect("select");
        assert_eq!(result.rows[0][0], Value::Text("hello".to_string()));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&Value::Null), "NULL");
        assert_eq!(format_value(&Value::Integer(42)), "42");
        assert_eq!(format_value(&Value::Real(3.14)), "3.14");
        assert_eq!(format_value(&Value::Real(0.0)), "0");
        assert_eq!(format_value(&Value::Real(1e20)), "1e20");
        assert_eq!(format_value(&Value::Text("hi".to_string())), "hi");
        assert_eq!(format_value(&Value::Blob(b"raw".to_vec())), "raw");
    }

    #[test]
    fn test_json_to_value() {
        assert_eq!(json_to_value(&serde_json::json!(null)), Value::Null);
        assert_eq!(json_to_value(&serde_json::json!(true)), Value::Integer(1));
        assert_eq!(json_to_value(&serde_json::json!(7)), Value::Integer(7));
        assert_eq!(json_to_value(&serde_json::json!(1.5)), Value::Real(1.5));
        assert_eq!(json_to_value(&serde_json::json!("x")), Value::Text("x".to_string()));
        assert_eq!(
            json_to_value(&serde_json::json!(["a"])),
            Value::Text("[\"a\"]".to_string())
        );
    }

    #[test]
    fn test_value_to_json_blob_base64() {
        let json = value_to_json(&Value::Blob(vec![0xff, 0xfe]));
        assert!(json.is_string());

        let json = value_to_json(&Value::Blob(b"plain".to_vec()));
        assert_eq!(json, serde_json::json!("plain"));
    }
}
