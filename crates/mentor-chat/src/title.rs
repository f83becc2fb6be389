//! Session title heuristics.

use tracing::debug;

use crate::backend::MentorBackend;

/// A title is written only while a session has at most this many turns.
pub const TITLE_TURN_LIMIT: usize = 2;

const DEEP_DIVE_OVERVIEW_CHARS: usize = 30;
const FALLBACK_TITLE: &str = "New Chat";

pub fn should_title(turn_count: usize) -> bool {
    turn_count <= TITLE_TURN_LIMIT
}

/// First line of `text`, whitespace collapsed, cut at a word boundary so the
/// result fits in `max_chars` including the ellipsis.
pub fn truncate_title(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let words: Vec<&str> = first_line.split_whitespace().collect();
    if words.is_empty() {
        return FALLBACK_TITLE.to_string();
    }

    let collapsed = words.join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }

    let budget = max_chars.saturating_sub(3).max(1);
    let mut title = String::new();
    for word in &words {
        let extra = if title.is_empty() { 0 } else { 1 };
        if title.chars().count() + extra + word.chars().count() > budget {
            break;
        }
        if extra == 1 {
            title.push(' ');
        }
        title.push_str(word);
    }
    if title.is_empty() {
        // A single word longer than the budget.
        title = words[0].chars().take(budget).collect();
    }
    title.push_str("...");
    title
}

pub fn concept_title(topic: &str) -> String {
    format!("Concept: {}", topic.trim())
}

pub fn deep_dive_title(overview: &str) -> String {
    let head: String = overview.chars().take(DEEP_DIVE_OVERVIEW_CHARS).collect();
    format!("Deep Dive: {}...", head)
}

/// Title for a normal exchange: the backend's summary when it offers one,
/// else a truncation of the user's text.
pub async fn generate_title(backend: &dyn MentorBackend, text: &str, max_chars: usize) -> String {
    match backend.summarize_title(text).await {
        Ok(Some(summary)) if !summary.trim().is_empty() => summary.trim().to_string(),
        Ok(_) => truncate_title(text, max_chars),
        Err(e) => {
            debug!(error = %e, "Title summarization failed; truncating");
            truncate_title(text, max_chars)
        }
    }
}
