//! CLI output formatting module
//!
//! Human and JSON rendering for command results.

pub mod table;

pub use table::TableFormatter;

use serde::Serialize;

/// A command result that renders as either human text or JSON.
pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

/// Print a command result in the selected format.
pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&result.to_json()).unwrap_or_default()
        );
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to a maximum number of characters, appending "..."
/// if truncated. Counts characters rather than bytes so a cut never
/// lands inside a multi-byte sequence.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string_unchanged() {
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_truncate_long_string() {
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        // 40 two-byte characters fit a 40-character budget untouched.
        let wide = "é".repeat(40);
        assert_eq!(truncate(&wide, 40), wide);

        // Cutting a longer run keeps whole characters only.
        let wider = "é".repeat(45);
        assert_eq!(truncate(&wider, 40), format!("{}...", "é".repeat(37)));
    }
}
