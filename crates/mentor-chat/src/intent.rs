//! Keyword intent classifier for voice and text input.
//!
//! Only decides whether a transcribed utterance is sent automatically.
//!
//! Keywords match on word boundaries, not as raw substrings: "hi" matches
//! "hi there" but not "this", and "yo" does not match "you".

use std::sync::LazyLock;

use regex::Regex;

/// Coarse intent of an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Greeting,
    /// Explicit formatting or shortcut request.
    Command,
    /// Distress language.
    Stress,
    Study,
}

impl Intent {
    /// Whether a voice transcript with this intent is sent without a click.
    pub fn auto_sends(&self) -> bool {
        matches!(self, Intent::Greeting | Intent::Command)
    }
}

struct IntentPatterns {
    greeting: Regex,
    command: Regex,
    stress: Regex,
}

fn alternation(words: &[&str]) -> Regex {
    let alts: Vec<String> = words
        .iter()
        .map(|w| regex::escape(w).replace(' ', r"\s+"))
        .collect();
    Regex::new(&format!(r"\b(?:{})\b", alts.join("|"))).expect("Invalid intent regex")
}

static INTENT_PATTERNS: LazyLock<IntentPatterns> = LazyLock::new(|| IntentPatterns {
    greeting: alternation(&[
        "hi", "hello", "hey", "namaste", "kaise ho", "kya haal", "sup", "yo",
    ]),
    command: alternation(&[
        "explain in 2 minutes",
        "analyze",
        "bana de",
        "fix kar",
        "short me",
    ]),
    stress: alternation(&[
        "samajh nahi",
        "confused",
        "darr",
        "tension",
        "yaad nahi",
        "marks kam",
    ]),
});

/// Classify `text`. Checked in order: greeting, command, stress.
pub fn classify(text: &str) -> Intent {
    let lower = text.to_lowercase();
    let p = &*INTENT_PATTERNS;

    if p.greeting.is_match(&lower) {
        Intent::Greeting
    } else if p.command.is_match(&lower) {
        Intent::Command
    } else if p.stress.is_match(&lower) {
        Intent::Stress
    } else {
        Intent::Study
    }
}
