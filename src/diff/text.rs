//! Line diffs of rendered values.

use colored::Colorize;
use serde_json::Value;
use similar::{ChangeTag, TextDiff};

/// Render a value the way it is shown in diffs: strings bare, everything
/// else as pretty JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Unified diff between two texts with `context_lines` lines of context.
pub fn unified_diff(before: &str, after: &str, context_lines: usize, use_color: bool) -> String {
    let before = with_trailing_newline(before);
    let after = with_trailing_newline(after);
    let diff = TextDiff::from_lines(before.as_str(), after.as_str());

    let mut out = String::new();
    for hunk in diff.unified_diff().context_radius(context_lines).iter_hunks() {
        for change in hunk.iter_changes() {
            let (sign, line) = match change.tag() {
                ChangeTag::Delete => ("-", change.value()),
                ChangeTag::Insert => ("+", change.value()),
                ChangeTag::Equal => (" ", change.value()),
            };
            let line = format!("{}{}", sign, line.trim_end_matches('\n'));
            let line = match (use_color, change.tag()) {
                (true, ChangeTag::Delete) => line.red().to_string(),
                (true, ChangeTag::Insert) => line.green().to_string(),
                _ => line,
            };
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// Diff two values, rendered with [`render_value`].
pub fn value_diff(before: Option<&Value>, after: Option<&Value>, use_color: bool) -> String {
    let before = before.map(render_value).unwrap_or_default();
    let after = after.map(render_value).unwrap_or_default();
    unified_diff(&before, &after, 2, use_color)
}

fn with_trailing_newline(s: &str) -> String {
    if s.is_empty() || s.ends_with('\n') {
        s.to_string()
    } else {
        format!("{}\n", s)
    }
}
