//! Formatted terminal output.
//!
//! All formatting lives here so the pipelines stay free of presentation concerns and output
//! changes are localized.

use std::path::Path;

use chrono::NaiveDate;

use crate::app::pipeline::{Feed, FeedRun};
use crate::domain::{Cell, Table};
use crate::error::AppError;
use crate::report::StatusLine;

const MAX_CELL_WIDTH: usize = 24;

/// Per-sheet update lines plus where the result went.
pub fn format_run_summary(run: &FeedRun, as_of: NaiveDate, written: Option<&Path>) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== fxa {} (as of {as_of}) ===\n", run.feed.name()));

    for u in &run.updates {
        let o = &u.outcome;
        let last = o
            .series
            .last_date()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let requested = o
            .requested
            .map(|(start, end)| format!("{start}..{end}"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(
            format!(
                "{:<16} {:<12} +{:<5} rows={:<6} last={:<10} fetched={}",
                u.sheet,
                o.status.label(),
                o.added,
                o.series.len(),
                last,
                requested,
            )
            .trim_end(),
        );
        out.push('\n');
    }

    match written {
        Some(path) => out.push_str(&format!("Written: {}\n", path.display())),
        None => out.push_str("Dry run: nothing written.\n"),
    }
    out
}

/// Persisted coverage per sheet and how many business days each is behind.
pub fn format_status(lines: &[StatusLine], as_of: NaiveDate) -> String {
    let mut out = String::new();
    out.push_str(&format!("Data status as of {as_of}\n"));
    out.push_str(
        format!(
            "{:<14} {:<16} {:>7} {:<10} {:<10} {:>7}",
            "feed", "sheet", "rows", "last", "resume", "pending"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(&format!("{:-<14} {:-<16} {:->7} {:-<10} {:-<10} {:->7}\n", "", "", "", "", "", ""));

    for line in lines {
        let s = &line.status;
        let last = s.last_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());
        let marker = if s.needs_update() { " *" } else { "" };
        out.push_str(&format!(
            "{:<14} {:<16} {:>7} {:<10} {:<10} {:>7}{marker}\n",
            line.feed.name(),
            line.sheet,
            s.rows,
            last,
            s.resume,
            s.pending_business_days,
        ));
    }
    out
}

/// Failed feeds of an `fxa all` run.
pub fn format_failures(failures: &[(Feed, AppError)]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} feed(s) failed:\n", failures.len()));
    for (feed, err) in failures {
        out.push_str(&format!("- {} (exit {}): {}\n", feed.name(), err.exit_code(), err.message()));
    }
    out
}

/// Column-aligned rendering of the last `max_rows` rows of a sheet.
///
/// Numbers are right-aligned, text left-aligned; long cells are truncated.
pub fn format_table(table: &Table, max_rows: usize) -> String {
    let skip = table.rows.len().saturating_sub(max_rows);
    let rows = &table.rows[skip..];

    let rendered: Vec<Vec<String>> = rows
        .iter()
        .map(|r| r.iter().map(|c| truncate(&fmt_cell(c), MAX_CELL_WIDTH)).collect())
        .collect();
    let headers: Vec<String> = table.headers.iter().map(|h| truncate(h, MAX_CELL_WIDTH)).collect();

    let ncols = headers.len().max(rendered.iter().map(Vec::len).max().unwrap_or(0));
    let mut widths = vec![0usize; ncols];
    for (i, h) in headers.iter().enumerate() {
        widths[i] = widths[i].max(h.chars().count());
    }
    for row in &rendered {
        for (i, c) in row.iter().enumerate() {
            widths[i] = widths[i].max(c.chars().count());
        }
    }

    let mut out = String::new();
    let header_line: Vec<String> = (0..ncols)
        .map(|i| pad(headers.get(i).map(String::as_str).unwrap_or(""), widths[i], false))
        .collect();
    out.push_str(header_line.join(" ").trim_end());
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join(" "));
    out.push('\n');

    for (row, cells) in rendered.iter().zip(rows) {
        let line: Vec<String> = (0..ncols)
            .map(|i| {
                let numeric = matches!(cells.get(i), Some(Cell::Number(_)));
                pad(row.get(i).map(String::as_str).unwrap_or(""), widths[i], numeric)
            })
            .collect();
        out.push_str(line.join(" ").trim_end());
        out.push('\n');
    }
    if skip > 0 {
        out.push_str(&format!("({skip} earlier rows not shown)\n"));
    }
    out
}

fn fmt_cell(cell: &Cell) -> String {
    match cell {
        Cell::Empty => String::new(),
        Cell::Number(v) => fmt_number(*v),
        Cell::Text(s) => s.clone(),
    }
}

/// Up to four decimals, trailing zeros dropped.
fn fmt_number(v: f64) -> String {
    let s = format!("{v:.4}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

fn pad(s: &str, width: usize, right: bool) -> String {
    let fill = width.saturating_sub(s.chars().count());
    if right {
        format!("{}{s}", " ".repeat(fill))
    } else {
        format!("{s}{}", " ".repeat(fill))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
