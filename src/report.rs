//! Text rendering for `ccpane --status`.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::config::EmojiConfig;
use crate::store::PaneRecord;

/// Format a datetime as relative time (e.g., "5m ago", "2h ago", "12s ago").
pub fn format_relative_time(datetime: DateTime<Utc>) -> String {
    let now = Utc::now();
    let duration = now.signed_duration_since(datetime);

    if duration.num_seconds() < 0 {
        return "just now".to_string();
    }

    let seconds = duration.num_seconds();
    let minutes = duration.num_minutes();
    let hours = duration.num_hours();
    let days = duration.num_days();

    if days > 0 {
        format!("{}d ago", days)
    } else if hours > 0 {
        format!("{}h ago", hours)
    } else if minutes > 0 {
        format!("{}m ago", minutes)
    } else {
        format!("{}s ago", seconds)
    }
}

/// Truncate to `max_chars` characters, adding "..." if truncated.
pub fn truncate_title(title: &str, max_chars: usize) -> String {
    if title.chars().count() <= max_chars {
        title.to_string()
    } else if max_chars <= 3 {
        ".".repeat(max_chars)
    } else {
        let kept: String = title.chars().take(max_chars - 3).collect();
        format!("{}...", kept)
    }
}

/// One line per tracked pane.
///
/// `live` holds the ids tmux currently reports; `None` when tmux could not
/// be asked, in which case liveness is not shown.
pub fn render_status(
    records: &[(String, PaneRecord)],
    live: Option<&HashSet<String>>,
    emoji: &EmojiConfig,
) -> String {
    if records.is_empty() {
        return "No tracked panes\n".to_string();
    }

    let mut out = format!("{} tracked pane(s):\n\n", records.len());
    for (pane_id, record) in records {
        let marker = record.status.emoji(emoji).unwrap_or(" ");
        let liveness = match live {
            Some(live) if !live.contains(pane_id) => "  (gone)",
            _ => "",
        };
        out.push_str(&format!(
            "{} {:<6} [{}] \"{}\" - {}{}\n",
            marker,
            pane_id,
            record.status.as_str().to_uppercase(),
            truncate_title(&record.original_title, 40),
            format_relative_time(record.set_at),
            liveness
        ));
    }
    out
}
