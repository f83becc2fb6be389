//! Response parser for finished free-text replies.
//!
//! Pulls a confidence label, one follow-up question and a list of
//! suggested actions out of the reply and returns the remaining text.
//! Unrecognized or partial sections stay in the content.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use mentor_core::types::{Confidence, PlainReply};

// =============================================================================
// Compiled patterns
// =============================================================================

struct SectionPatterns {
    /// `Confidence: High`, `**Confidence level:** medium`, `Confidence: ✅`
    confidence_label: Regex,
    /// `✅ High Confidence`
    confidence_badge: Regex,
    /// `Your Turn: ...`, `Follow-up question:`, `Ask-back: ...`
    follow_up_label: Regex,
    /// `🤔 What would happen if ...?`
    follow_up_emoji: Regex,
    /// `⏭️ Suggested Actions:`, `Next Actions`, `Quick Replies:`
    actions_header: Regex,
    /// `- item`, `* item`, `• item`, `1. item`, `2) item`
    bullet: Regex,
    excess_blank_lines: Regex,
}

static PATTERNS: LazyLock<SectionPatterns> = LazyLock::new(|| {
    let mk = |p: &str| Regex::new(p).expect("Invalid section regex");
    SectionPatterns {
        confidence_label: mk(
            r"(?i)^[^\p{L}\p{N}]*confidence(?:\s+level)?[\s*_]*[:\-][\s*_]*([^\s*_.!]+)",
        ),
        confidence_badge: mk(r"(?i)^[^\p{L}\p{N}]*(high|medium|low)\s+confidence[^\p{L}\p{N}]*$"),
        follow_up_label: mk(
            r"(?i)^[^\p{L}\p{N}]*(?:your\s+turn|follow[\s-]?up(?:\s+question)?|ask[\s-]?back(?:\s+question)?)[\s*_]*:[\s*_]*(.*)$",
        ),
        follow_up_emoji: mk(r"^\s*\x{1F914}\s*(.+)$"),
        actions_header: mk(
            r"(?i)^[^\p{L}\p{N}]*(?:suggested\s+actions?|next\s+actions?|quick\s+replies)[\s*_]*:?[\s*_]*$",
        ),
        bullet: mk(r"^\s*(?:[-*\x{2022}]|\d+[.)])\s+(.+?)\s*$"),
        excess_blank_lines: mk(r"\n{3,}"),
    }
});

// =============================================================================
// Parsed output
// =============================================================================

/// A reply with its recognized sections split out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReply {
    pub content: String,
    pub confidence: Option<Confidence>,
    pub follow_up: Option<String>,
    pub suggested_actions: Option<Vec<String>>,
}

impl ParsedReply {
    /// Split into display text and the structured payload fields.
    pub fn into_parts(self) -> (String, PlainReply) {
        (
            self.content,
            PlainReply {
                confidence: self.confidence,
                follow_up: self.follow_up,
                suggested_actions: self.suggested_actions,
            },
        )
    }
}

// =============================================================================
// ResponseParser
// =============================================================================

/// Line-oriented parser for the mentor reply convention. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str) -> ParsedReply {
        let p = &*PATTERNS;
        let lines: Vec<&str> = text.lines().collect();
        let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
        let mut parsed = ParsedReply::default();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];

            if parsed.confidence.is_none() {
                if let Some(level) = match_confidence(p, line) {
                    parsed.confidence = Some(level);
                    i += 1;
                    continue;
                }
            }

            if parsed.follow_up.is_none() {
                if let Some((question, consumed)) = match_follow_up(p, &lines, i) {
                    parsed.follow_up = Some(question);
                    i += consumed;
                    continue;
                }
            }

            if parsed.suggested_actions.is_none() && p.actions_header.is_match(line) {
                let (actions, consumed) = collect_bullets(p, &lines, i + 1);
                if !actions.is_empty() {
                    parsed.suggested_actions = Some(actions);
                    i += 1 + consumed;
                    continue;
                }
            }

            kept.push(line);
            i += 1;
        }

        debug!(
            confidence = parsed.confidence.is_some(),
            follow_up = parsed.follow_up.is_some(),
            actions = parsed.suggested_actions.as_ref().map_or(0, Vec::len),
            "Parsed reply sections"
        );

        let joined = kept.join("\n");
        parsed.content = p
            .excess_blank_lines
            .replace_all(&joined, "\n\n")
            .trim()
            .to_string();
        parsed
    }
}

fn match_confidence(p: &SectionPatterns, line: &str) -> Option<Confidence> {
    if let Some(caps) = p.confidence_label.captures(line) {
        let value = caps.get(1)?.as_str();
        return Confidence::from_keyword(value).or_else(|| Confidence::from_symbol(value));
    }
    let caps = p.confidence_badge.captures(line)?;
    Confidence::from_keyword(caps.get(1)?.as_str())
}

/// Returns the question and the number of lines it occupied.
fn match_follow_up(p: &SectionPatterns, lines: &[&str], at: usize) -> Option<(String, usize)> {
    let line = lines[at];

    if let Some(caps) = p.follow_up_label.captures(line) {
        let rest = clean_inline(caps.get(1).map_or("", |m| m.as_str()));
        if !rest.is_empty() {
            return Some((rest, 1));
        }
        // Label on its own line: the question is the next non-empty line.
        let offset = lines[at + 1..]
            .iter()
            .position(|l| !l.trim().is_empty())?;
        let question = clean_inline(lines[at + 1 + offset]);
        if question.is_empty() {
            return None;
        }
        return Some((question, offset + 2));
    }

    let caps = p.follow_up_emoji.captures(line)?;
    let question = clean_inline(caps.get(1)?.as_str());
    (!question.is_empty()).then_some((question, 1))
}

/// Bullets following a header. Blank lines before the first bullet are
/// skipped; the list ends at the first non-bullet line.
fn collect_bullets(p: &SectionPatterns, lines: &[&str], start: usize) -> (Vec<String>, usize) {
    let mut actions = Vec::new();
    let mut consumed = 0;

    for line in &lines[start.min(lines.len())..] {
        if line.trim().is_empty() {
            if actions.is_empty() {
                consumed += 1;
                continue;
            }
            break;
        }
        match p.bullet.captures(line).and_then(|c| c.get(1)) {
            Some(item) => {
                let item = clean_inline(item.as_str());
                if !item.is_empty() {
                    actions.push(item);
                }
                consumed += 1;
            }
            None => break,
        }
    }

    if actions.is_empty() {
        (actions, 0)
    } else {
        (actions, consumed)
    }
}

fn clean_inline(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| c == '*' || c == '_')
        .trim()
        .to_string()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParsedReply {
        ResponseParser::new().parse(text)
    }

    // ---- full convention ----

    #[test]
    fn test_all_sections_extracted() {
        let reply = "Photosynthesis is how plants make food from light.\n\
                     \n\
                     Example: a leaf in sunlight.\n\
                     \n\
                     Confidence: High\n\
                     \n\
                     Your Turn: What else do plants need besides sunlight?\n\
                     \n\
                     Suggested Actions:\n\
                     - 🔍 Go Deeper\n\
                     - ✂️ Simplify More\n";
        let parsed = parse(reply);

        assert_eq!(parsed.confidence, Some(Confidence::High));
        assert_eq!(
            parsed.follow_up.as_deref(),
            Some("What else do plants need besides sunlight?")
        );
        assert_eq!(
            parsed.suggested_actions,
            Some(vec!["🔍 Go Deeper".to_string(), "✂️ Simplify More".to_string()])
        );
        assert_eq!(
            parsed.content,
            "Photosynthesis is how plants make food from light.\n\nExample: a leaf in sunlight."
        );
    }

    #[test]
    fn test_plain_text_untouched() {
        let reply = "Just an answer.\nWith two lines.";
        let parsed = parse(reply);
        assert_eq!(parsed.content, reply);
        assert!(parsed.confidence.is_none());
        assert!(parsed.follow_up.is_none());
        assert!(parsed.suggested_actions.is_none());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse(""), ParsedReply::default());
    }

    // ---- confidence ----

    #[test]
    fn test_confidence_badge_line() {
        let parsed = parse("Answer.\n\u{26a0}\u{fe0f} Medium Confidence");
        assert_eq!(parsed.confidence, Some(Confidence::Medium));
        assert_eq!(parsed.content, "Answer.");
    }

    #[test]
    fn test_confidence_markdown_label() {
        let parsed = parse("**Confidence level:** low\nAnswer.");
        assert_eq!(parsed.confidence, Some(Confidence::Low));
        assert_eq!(parsed.content, "Answer.");
    }

    #[test]
    fn test_confidence_symbol_value() {
        let parsed = parse("Answer.\nConfidence: \u{2705}");
        assert_eq!(parsed.confidence, Some(Confidence::High));
    }

    #[test]
    fn test_unknown_confidence_value_kept() {
        let parsed = parse("Confidence: unsure\nAnswer.");
        assert!(parsed.confidence.is_none());
        assert_eq!(parsed.content, "Confidence: unsure\nAnswer.");
    }

    #[test]
    fn test_confidence_word_in_sentence_not_a_label() {
        let text = "Building confidence takes practice.";
        let parsed = parse(text);
        assert!(parsed.confidence.is_none());
        assert_eq!(parsed.content, text);
    }

    // ---- follow-up ----

    #[test]
    fn test_follow_up_on_next_line() {
        let parsed = parse("Answer.\n\nAsk-back question:\n\nCan you give one example?\nMore.");
        assert_eq!(parsed.follow_up.as_deref(), Some("Can you give one example?"));
        assert_eq!(parsed.content, "Answer.\n\nMore.");
    }

    #[test]
    fn test_follow_up_label_without_question_kept() {
        let parsed = parse("Answer.\nFollow-up:");
        assert!(parsed.follow_up.is_none());
        assert_eq!(parsed.content, "Answer.\nFollow-up:");
    }

    #[test]
    fn test_follow_up_thinking_emoji() {
        let parsed = parse("Answer.\n\u{1F914} Why does ice float?");
        assert_eq!(parsed.follow_up.as_deref(), Some("Why does ice float?"));
        assert_eq!(parsed.content, "Answer.");
    }

    #[test]
    fn test_follow_up_requires_colon() {
        let text = "Follow up with your teacher tomorrow.";
        let parsed = parse(text);
        assert!(parsed.follow_up.is_none());
        assert_eq!(parsed.content, text);
    }

    // ---- suggested actions ----

    #[test]
    fn test_actions_with_emoji_header_and_numbers() {
        let parsed = parse("Plan below.\n\u{23ed}\u{fe0f} Suggested Actions:\n1. Create Monthly Plan\n2) Analyze Weak Skills");
        assert_eq!(
            parsed.suggested_actions,
            Some(vec![
                "Create Monthly Plan".to_string(),
                "Analyze Weak Skills".to_string()
            ])
        );
        assert_eq!(parsed.content, "Plan below.");
    }

    #[test]
    fn test_actions_header_without_bullets_kept() {
        let parsed = parse("Answer.\nSuggested Actions:\nNothing here.");
        assert!(parsed.suggested_actions.is_none());
        assert_eq!(parsed.content, "Answer.\nSuggested Actions:\nNothing here.");
    }

    #[test]
    fn test_actions_stop_at_prose() {
        let parsed = parse("Quick Replies\n\u{2022} Yes\n\u{2022} No\nThanks for asking!");
        assert_eq!(
            parsed.suggested_actions,
            Some(vec!["Yes".to_string(), "No".to_string()])
        );
        assert_eq!(parsed.content, "Thanks for asking!");
    }

    #[test]
    fn test_bullets_outside_actions_section_kept() {
        let text = "Steps:\n- Mix\n- Heat";
        assert_eq!(parse(text).content, text);
    }

    // ---- content cleanup ----

    #[test]
    fn test_blank_lines_collapsed() {
        let parsed = parse("First.\n\n\n\nConfidence: high\n\n\n\nSecond.");
        assert_eq!(parsed.content, "First.\n\nSecond.");
    }

    #[test]
    fn test_crlf_input() {
        let parsed = parse("Answer.\r\nConfidence: medium\r\n");
        assert_eq!(parsed.confidence, Some(Confidence::Medium));
        assert_eq!(parsed.content, "Answer.");
    }

    #[test]
    fn test_into_parts() {
        let (content, reply) = parse("Answer.\nConfidence: low").into_parts();
        assert_eq!(content, "Answer.");
        assert_eq!(reply.confidence, Some(Confidence::Low));
        assert!(reply.follow_up.is_none());
    }
}
