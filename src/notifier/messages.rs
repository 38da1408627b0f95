//! Message formats for log lines and operator notifications.

use std::fmt::Write as _;

use crate::extractor::CommitEvent;
use crate::reconcile::Divergence;

/// Plain status line for an accepted commit.
pub fn status_line(event: &CommitEvent) -> String {
    format!(
        "{}, at height {}, has apphash {}",
        event.source_id, event.height, event.root
    )
}

/// Emphasized progress notice posted at the configured height interval.
pub fn progress_notice(event: &CommitEvent) -> String {
    format!(
        "**{}**, at height **{}**, has apphash _{}_",
        event.source_id, event.height, event.root
    )
}

/// Headline of a divergence alert, without the operator mention.
pub fn divergence_headline(height: u64) -> String {
    format!("ROOT MISMATCH DETECTED AT BLOCK {height}")
}

/// Full divergence alert: mention, headline, then one `source: root` line
/// per known report at the divergent height.
pub fn divergence_alert(mention: &str, divergence: &Divergence) -> String {
    let mut text = String::new();
    if !mention.trim().is_empty() {
        let _ = write!(text, "{} : ", mention.trim());
    }
    text.push_str(&divergence_headline(divergence.height));
    text.push('\n');
    for report in &divergence.reports {
        let _ = writeln!(text, "{}: {}", report.source_id, report.root);
    }
    text
}

/// Forwarded error log line.
pub fn error_forward(source_id: &str, payload: &str) -> String {
    format!("{source_id}: {payload}")
}

/// Truncate `text` to at most `max` bytes without splitting a character.
pub fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut = cut.saturating_sub(1);
    }
    &text[..cut]
}

/// Split `text` into parts of at most `max` bytes, cutting after a newline
/// where possible.
///
/// A single line longer than `max` is cut on a character boundary. No text
/// is dropped: concatenating the parts yields `text`.
pub fn split_on_lines(text: &str, max: usize) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if rest.len() <= max {
            parts.push(rest);
            break;
        }
        let window = truncate(rest, max);
        let cut = match window.rfind('\n') {
            Some(pos) => pos.saturating_add(1),
            None if window.is_empty() => rest.chars().next().map_or(rest.len(), char::len_utf8),
            None => window.len(),
        };
        let (head, tail) = rest.split_at(cut);
        parts.push(head);
        rest = tail;
    }
    parts
}
