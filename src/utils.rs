//! Shared utility functions and constants

/// Length of literal previews in listings
pub const PREVIEW_LEN: usize = 40;

/// Width of the label column in listings
pub const LABEL_WIDTH: usize = 14;

/// Truncate a string to `max` characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Single-line preview of a literal: newlines escaped, then truncated
pub fn preview(s: &str, max: usize) -> String {
    let flat = s.replace('\r', "\\r").replace('\n', "\\n");
    truncate(&flat, max)
}

/// Truncate or pad to exactly `len` characters, using an ellipsis for truncation
pub fn truncate_or_pad(s: &str, len: usize) -> String {
    let count = s.chars().count();
    if count > len {
        let kept: String = s.chars().take(len.saturating_sub(1)).collect();
        format!("{}…", kept)
    } else {
        format!("{:<width$}", s, width = len)
    }
}
