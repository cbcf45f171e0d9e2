// src/observer/matcher.rs
use serde::{Deserialize, Serialize};

/// Phrase that announces a rain on the watched page.
pub const DEFAULT_TARGET_PHRASE: &str = "join now to get free scrap based on your play amount";

/// Text excerpt limits for poll-path detections.
pub const BODY_EXCERPT_CHARS: usize = 1000;
pub const ELEMENT_EXCERPT_CHARS: usize = 500;

/// Lower-case and collapse whitespace (NBSP included) for phrase matching.
pub fn normalize_for_match(s: &str) -> String {
    s.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn excerpt(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Case/whitespace-insensitive substring matcher for the target phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseMatcher {
    phrase: String,
}

impl Default for PhraseMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_PHRASE)
    }
}

impl PhraseMatcher {
    pub fn new(phrase: &str) -> Self {
        Self {
            phrase: normalize_for_match(phrase),
        }
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn matches(&self, text: &str) -> bool {
        !self.phrase.is_empty() && normalize_for_match(text).contains(&self.phrase)
    }

    /// Poll path, first pass: the phrase anywhere in the body. Returns the body excerpt.
    pub fn scan_body(&self, body: &str) -> Option<String> {
        self.matches(body)
            .then(|| excerpt(body, BODY_EXCERPT_CHARS))
    }

    /// Poll path, fallback: first interactive element carrying the phrase.
    pub fn scan_elements<S: AsRef<str>>(&self, elements: &[S]) -> Option<String> {
        elements
            .iter()
            .map(AsRef::as_ref)
            .find(|t| self.matches(t))
            .map(|t| excerpt(t, ELEMENT_EXCERPT_CHARS))
    }
}
