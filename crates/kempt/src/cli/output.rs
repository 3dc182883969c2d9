//! Output formatting for CLI commands: tables, sizes, ages and run
//! summaries.

use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use kempt::{FileStatus, RunSummary};

/// Format a file size in human-readable form
///
/// Examples:
/// - 500 -> "500 B"
/// - 1536000 -> "1.5 MB"
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Relative age of a timestamp, e.g. "3 hours ago".
pub fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{} seconds ago", secs),
        60..=3599 => format!("{} minutes ago", secs / 60),
        3600..=86_399 => format!("{} hours ago", secs / 3600),
        _ => format!("{} days ago", secs / 86_400),
    }
}

/// Build a table with cyan headers.
pub fn build_table(headers: &[&str], rows: Vec<Vec<Cell>>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        table.add_row(row);
    }
    table
}

/// Print a table with headers and rows
pub fn print_table(headers: &[&str], rows: Vec<Vec<Cell>>) {
    println!("{}", build_table(headers, rows));
}

/// One line per file that changed or failed (every file when `verbose`),
/// then the headline.
pub fn print_summary(summary: &RunSummary, verbose: bool) {
    for outcome in &summary.outcomes {
        let quiet = matches!(outcome.status, FileStatus::Unchanged | FileStatus::Skipped);
        if quiet && !verbose {
            continue;
        }
        match (&outcome.error, &outcome.recovery_path) {
            (Some(err), Some(recovery)) => println!(
                "{:<12} {} ({}; original saved to {})",
                outcome.status.as_str(),
                outcome.path.display(),
                err.message,
                recovery.display()
            ),
            (Some(err), None) => println!("{:<12} {} ({})", outcome.status.as_str(), outcome.path.display(), err.message),
            _ => println!("{:<12} {}", outcome.status.as_str(), outcome.path.display()),
        }
    }
    if let Some(backup) = &summary.backup {
        println!("Backup: {}", backup);
    }
    println!("{}", summary.headline());
}
