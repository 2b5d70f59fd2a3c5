//! Output Formatting
//!
//! Shared rendering for the command surface: JSON, CSV, and tab-separated
//! table output, plus human-readable sizes and durations. Commands choose a
//! format from their `--format` flag; the default is the table form.

use std::io::{self, Write};

use serde::Serialize;

use crate::engine::query::{format_value, value_to_json};
use crate::engine::QueryResult;

/// Output format selected by `--format`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    /// Parse a `--format` flag value; unknown values fall back to table.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "csv" => Self::Csv,
            _ => Self::Table,
        }
    }
}

/// Write a value as pretty-printed JSON with a trailing newline.
pub fn print_json(w: &mut dyn Write, value: &impl Serialize) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *w, value)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    writeln!(w)
}

/// Write rows as CSV with a header line.
pub fn print_csv(w: &mut dyn Write, headers: &[String], rows: &[Vec<String>]) -> io::Result<()> {
    let header_line: Vec<String> = headers.iter().map(|h| escape_csv(h)).collect();
    writeln!(w, "{}", header_line.join(","))?;

    for row in rows {
        let cells: Vec<String> = row.iter().map(|v| escape_csv(v)).collect();
        writeln!(w, "{}", cells.join(","))?;
    }
    Ok(())
}

/// Quote a CSV cell when it contains a delimiter, quote, or newline.
#[must_use]
pub fn escape_csv(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Convert a query result to one JSON object per row, keyed by column name.
#[must_use]
pub fn rows_to_json(result: &QueryResult) -> Vec<serde_json::Map<String, serde_json::Value>> {
    result
        .rows
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .zip(row.iter())
                .map(|(column, value)| (column.clone(), value_to_json(value)))
                .collect()
        })
        .collect()
}

/// Render rows as display strings for CSV/table output.
#[must_use]
pub fn rows_to_strings(result: &QueryResult) -> Vec<Vec<String>> {
    result
        .rows
        .iter()
        .map(|row| row.iter().map(format_value).collect())
        .collect()
}

/// Write a query result in the requested format. Writes with no result set
/// report the affected-row count instead.
pub fn print_query_result(
    w: &mut dyn Write,
    result: &QueryResult,
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Json => print_json(w, &rows_to_json(result)),
        OutputFormat::Csv => print_csv(w, &result.columns, &rows_to_strings(result)),
        OutputFormat::Table => {
            if result.columns.is_empty() {
                if result.rows_affected > 0 {
                    writeln!(w, "Rows affected: {}", result.rows_affected)?;
                }
                return Ok(());
            }

            writeln!(w, "{}", result.columns.join("\t"))?;
            for row in &result.rows {
                let cells: Vec<String> = row.iter().map(format_value).collect();
                writeln!(w, "{}", cells.join("\t"))?;
            }
            Ok(())
        }
    }
}

/// Human-readable byte size ("482 B", "1.2 KB", "3.4 MB").
#[must_use]
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}

/// Compact duration rendering ("42s", "3m12s", "2h05m").
#[must_use]
pub fn format_duration(d: chrono::Duration) -> String {
    let seconds = d.num_seconds().max(0);
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 3600 {
        return format!("{}m{:02}s", seconds / 60, seconds % 60);
    }
    format!("{}h{:02}m", seconds / 3600, (seconds % 3600) / 60)
}

/// Truncate a string for single-line table cells.
#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}
