//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use chrono::{DateTime, Utc};

use itemsync_core::{CollectionState, Item};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a list of items
    pub fn print_items(&self, items: &[Item]) {
        match self.format {
            OutputFormat::Human => {
                if items.is_empty() {
                    println!("No items found.");
                    return;
                }
                for item in items {
                    println!("{}", item_line(item));
                }
                println!("\n{} item(s)", items.len());
            }
            OutputFormat::Json => {
                println!("{}", to_json(&items));
            }
            OutputFormat::Quiet => {
                for item in items {
                    println!("{}", item.id);
                }
            }
        }
    }

    /// Print the collection after a successful operation
    pub fn print_result(&self, message: &str, state: &CollectionState) {
        match self.format {
            OutputFormat::Human => {
                println!("✓ {}", message);
                println!();
                self.print_items(&state.items);
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "success",
                        "message": message,
                        "items": state.items,
                    })
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a one-line summary of a published state (used by the shell)
    pub fn print_state_change(&self, state: &CollectionState) {
        match self.format {
            OutputFormat::Human => println!("{}", status_line(state)),
            OutputFormat::Json => println!("{}", to_json(state)),
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an error message (to stderr, in every mode)
    pub fn error(&self, msg: &str) {
        match self.format {
            OutputFormat::Json => {
                eprintln!("{}", serde_json::json!({"status": "error", "message": msg}));
            }
            _ => eprintln!("✗ {}", msg),
        }
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

/// One row of the item list
fn item_line(item: &Item) -> String {
    let marker = if item.is_pending() { " (pending)" } else { "" };
    format!(
        "{} | {} | {}{}",
        item.id,
        format_millis(item.updated_at),
        truncate(&item.value, 50),
        marker
    )
}

/// Summary of loading/saving flags, counts and the current error
fn status_line(state: &CollectionState) -> String {
    let mut parts = Vec::new();
    if state.loading {
        parts.push("loading".to_string());
    }
    if state.saving {
        parts.push("saving".to_string());
    }
    parts.push(format!("{} item(s)", state.items.len()));
    let pending = state.pending_count();
    if pending > 0 {
        parts.push(format!("{} pending", pending));
    }
    if let Some(ref error) = state.error {
        parts.push(format!("error: {}", error));
    }
    format!("[{}]", parts.join(", "))
}

/// Format epoch milliseconds as a UTC timestamp
fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// Truncate a string to max length (in characters), adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
