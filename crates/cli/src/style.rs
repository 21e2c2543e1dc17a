//! Shared styling utilities for terminal output.

use comfy_table::{Cell, Color};
use console::Style;

use ldapsync_core::report::AccountOutcome;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Table cell for an account outcome, coloured by status.
pub fn status_cell(outcome: &AccountOutcome) -> Cell {
    match outcome {
        AccountOutcome::Created { .. } => Cell::new("✓ created").fg(Color::Green),
        AccountOutcome::Updated { .. } => Cell::new("✓ updated").fg(Color::Green),
        AccountOutcome::Unchanged => Cell::new("unchanged"),
        AccountOutcome::Skipped(_) => Cell::new("skipped").fg(Color::Yellow),
        AccountOutcome::Failed(_) => Cell::new("✗ failed").fg(Color::Red),
    }
}
