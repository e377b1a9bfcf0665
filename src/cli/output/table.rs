//! Table output formatting for CLI commands
//!
//! Formatted table output for tasks and audit rows using comfy-table.
//! Supports color-coded cells, automatic column sizing, and accessibility
//! fallbacks for terminals without color.

use crate::domain::models::{AuditLevel, Task, TaskAudit, TaskStatus};
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::truncate;

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<usize>,
}

impl TableFormatter {
    /// Create a new table formatter
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    /// Create a new table formatter with custom settings
    pub fn with_config(use_colors: bool, max_width: Option<usize>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// Format a list of tasks as a table
    pub fn format_tasks(&self, tasks: &[Task]) -> String {
        let mut table = self.create_base_table();

        table.set_header(vec![
            Cell::new("ID").add_attribute(Attribute::Bold),
            Cell::new("Title").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Mode").add_attribute(Attribute::Bold),
            Cell::new("Frozen").add_attribute(Attribute::Bold),
            Cell::new("Updated").add_attribute(Attribute::Bold),
        ]);

        for task in tasks {
            let id_short = &task.id.to_string()[..8];
            let title = truncate(&task.title, 40);

            let status_cell = if self.use_colors {
                Cell::new(task.status.to_string()).fg(status_color(task.status))
            } else {
                Cell::new(format!("{} {}", status_icon(task.status), task.status))
            };

            let mode = task.metadata.mode_id.as_deref().unwrap_or("-");
            let frozen = if task.spec_frozen { "yes" } else { "-" };

            table.add_row(vec![
                Cell::new(id_short),
                Cell::new(&title),
                status_cell,
                Cell::new(mode),
                Cell::new(frozen),
                Cell::new(task.updated_at.format("%Y-%m-%d %H:%M").to_string()),
            ]);
        }

        table.to_string()
    }

    /// Format a task's audit rows as a table, oldest first
    pub fn format_audit(&self, rows: &[TaskAudit]) -> String {
        let mut table = self.create_base_table();

        table.set_header(vec![
            Cell::new("Time").add_attribute(Attribute::Bold),
            Cell::new("Level").add_attribute(Attribute::Bold),
            Cell::new("Event").add_attribute(Attribute::Bold),
            Cell::new("Payload").add_attribute(Attribute::Bold),
        ]);

        for row in rows {
            let level_cell = if self.use_colors {
                Cell::new(row.level.as_str()).fg(level_color(row.level))
            } else {
                Cell::new(row.level.as_str())
            };

            // Compact single-line payload, elided for wide rows
            let payload = if row.payload.is_null() {
                "-".to_string()
            } else {
                truncate(&row.payload.to_string(), 60)
            };

            table.add_row(vec![
                Cell::new(row.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
                level_cell,
                Cell::new(&row.event_type),
                Cell::new(&payload),
            ]);
        }

        table.to_string()
    }

    /// Create a base table with common settings
    fn create_base_table(&self) -> Table {
        let mut table = Table::new();

        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(width as u16);
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if color output is supported
fn supports_color() -> bool {
    // Respect NO_COLOR environment variable
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    // Check for dumb terminal
    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    true
}

/// Map task status to color
fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Draft | TaskStatus::Approved => Color::White,
        TaskStatus::Queued => Color::Yellow,
        TaskStatus::Running | TaskStatus::Verifying => Color::Cyan,
        TaskStatus::Verified | TaskStatus::Done => Color::Green,
        TaskStatus::Failed => Color::Red,
        TaskStatus::Blocked => Color::Magenta,
        TaskStatus::Canceled => Color::DarkGrey,
    }
}

/// Map task status to icon for colorless terminals
fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Draft => "○",
        TaskStatus::Approved | TaskStatus::Queued => "●",
        TaskStatus::Running | TaskStatus::Verifying => "⟳",
        TaskStatus::Verified | TaskStatus::Done => "✓",
        TaskStatus::Failed => "✗",
        TaskStatus::Blocked => "⊗",
        TaskStatus::Canceled => "⊘",
    }
}

/// Map audit level to color
fn level_color(level: AuditLevel) -> Color {
    match level {
        AuditLevel::Debug => Color::DarkGrey,
        AuditLevel::Info => Color::White,
        AuditLevel::Decision => Color::Cyan,
        AuditLevel::Warning => Color::Yellow,
        AuditLevel::Error | AuditLevel::Critical => Color::Red,
    }
}
