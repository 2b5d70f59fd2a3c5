//! Schema Introspection
//!
//! Table, view, column, index, foreign-key, and row-count views over a
//! connection. With the pool fixed at one underlying handle, no helper may
//! iterate an outer result set while issuing a nested query; every
//! intermediate result is buffered before drilling deeper.

use serde::Serialize;

use super::connection::Connection;
use super::query::quote_identifier;
use crate::error::{Result, StudioError};

/// A table column as reported by `PRAGMA table_info`
#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    /// Declared type, verbatim from the DDL
    pub decl_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    /// 0 when not part of the primary key, otherwise the 1-based position
    pub primary_key: i64,
}

/// An index on a table
#[derive(Debug, Clone, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
}

/// A foreign key constraint
#[derive(Debug, Clone, Serialize)]
pub struct ForeignKeyInfo {
    pub id: i64,
    /// Referenced table
    pub table: String,
    pub from: String,
    pub to: String,
    pub on_update: String,
    pub on_delete: String,
}

/// Composite table view: columns, DDL, primary key ordering, row count
#[derive(Debug, Clone, Serialize)]
pub struct TableDetails {
    pub name: String,
    pub ddl: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub row_count: i64,
}

/// Introspects the schema of one database connection.
pub struct Introspector<'a> {
    conn: &'a Connection,
}

impl<'a> Introspector<'a> {
    #[must_use]
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Names of user tables, excluding SQLite-internal ones.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        self.conn.with_handle(|c| {
            let mut stmt = c.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }

    /// View names.
    pub fn list_views(&self) -> Result<Vec<String>> {
        self.conn.with_handle(|c| {
            let mut stmt = c.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'view' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }

    /// Ordered column information for a table.
    pub fn get_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.conn.with_handle(|c| {
            let mut stmt =
                c.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
            let columns = stmt
                .query_map([], |row| {
                    Ok(ColumnInfo {
                        cid: row.get(0)?,
                        name: row.get(1)?,
                        decl_type: row.get(2)?,
                        not_null: row.get::<_, i64>(3)? != 0,
                        default_value: row.get(4)?,
                        primary_key: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(columns)
        })
    }

    /// Indexes on a table. Auto-created primary-key indexes are skipped.
    pub fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        // Buffer the index list before querying per-index columns.
        let metas: Vec<(String, bool)> = self.conn.with_handle(|c| {
            let mut stmt =
                c.prepare(&format!("PRAGMA index_list({})", quote_identifier(table)))?;
            let metas = stmt
                .query_map([], |row| {
                    let name: String = row.get(1)?;
                    let unique: i64 = row.get(2)?;
                    Ok((name, unique != 0))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(metas)
        })?;

        let mut indexes = Vec::with_capacity(metas.len());
        for (name, unique) in metas {
            if name.starts_with("sqlite_autoindex_") {
                continue;
            }
            let columns: Vec<String> = self.conn.with_handle(|c| {
                let mut stmt =
                    c.prepare(&format!("PRAGMA index_info({})", quote_identifier(&name)))?;
                let columns = stmt
                    .query_map([], |row| row.get::<_, String>(2))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(columns)
            })?;
            indexes.push(IndexInfo { name, unique, columns });
        }
        Ok(indexes)
    }

    /// Foreign keys declared on a table.
    pub fn get_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        self.conn.with_handle(|c| {
            let mut stmt =
                c.prepare(&format!("PRAGMA foreign_key_list({})", quote_identifier(table)))?;
            let fks = stmt
                .query_map([], |row| {
                    Ok(ForeignKeyInfo {
                        id: row.get(0)?,
                        table: row.get(2)?,
                        from: row.get(3)?,
                        to: row.get(4)?,
                        on_update: row.get(5)?,
                        on_delete: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(fks)
        })
    }

    /// Number of rows in a table.
    pub fn get_row_count(&self, table: &str) -> Result<i64> {
        self.conn.with_handle(|c| {
            let count = c.query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_identifier(table)),
                [],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Whether a table exists.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        self.conn.with_handle(|c| {
            let count: i64 = c.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                [table],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Composite view of a table: columns, original DDL, primary-key
    /// ordering, and row count.
    pub fn get_table_info(&self, table: &str) -> Result<TableDetails> {
        let ddl: Option<String> = self.conn.with_handle(|c| {
            let ddl = c
                .query_row(
                    "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
                    [table],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| {
                    if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                        Ok(None)
                    } else {
                        Err(e)
                    }
                })?;
            Ok(ddl)
        })?;

        let Some(ddl) = ddl else {
            return Err(StudioError::not_found(format!("table {table:?} not found")));
        };

        let columns = self.get_columns(table)?;
        let mut pk_columns: Vec<(i64, String)> = columns
            .iter()
            .filter(|col| col.primary_key > 0)
            .map(|col| (col.primary_key, col.name.clone()))
            .collect();
        pk_columns.sort_by_key(|(pos, _)| *pos);

        let row_count = self.get_row_count(table)?;

        Ok(TableDetails {
            name: table.to_string(),
            ddl,
            columns,
            primary_key: pk_columns.into_iter().map(|(_, name)| name).collect(),
            row_count,
        })
    }

    /// Primary key column names in key order. Tables without a declared
    /// primary key fall back to `rowid`.
    pub fn primary_key_columns(&self, table: &str) -> Result<Vec<String>> {
        let details = self.get_table_info(table)?;
        if details.primary_key.is_empty() {
            return Ok(vec!["rowid".to_string()]);
        }
        Ok(details.primary_key)
    }
}
