//! Table formatting utilities for CLI output.

use indicatif::HumanBytes;

/// Truncates a string to at most `max_len` characters, ending in "…" if cut.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_len.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Print a horizontal separator line.
pub fn print_separator(width: usize) {
    println!("{}", "-".repeat(width));
}

/// Render a completion fraction as a percentage, or `--` when unknown.
pub fn format_percent(percent: Option<f32>) -> String {
    percent.map_or_else(|| "--".to_string(), |p| format!("{:.1}%", p * 100.0))
}

/// Human-readable byte count; `--` when unknown.
pub fn format_bytes(bytes: Option<u64>) -> String {
    bytes.map_or_else(|| "--".to_string(), |b| HumanBytes(b).to_string())
}
