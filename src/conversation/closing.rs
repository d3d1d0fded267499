//! End-of-conversation heuristic.
//!
//! Plain case-insensitive substring matching with no tokenization, so short
//! phrases also fire inside longer words ("bye" in "byelaw"). A match only
//! arms the end timer; the turn that matched always plays out.

use crate::config::ConversationConfig;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosingLexicon {
    phrases: Vec<String>,
}

impl ClosingLexicon {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &ConversationConfig) -> Self {
        Self::new(&config.closing_phrases)
    }

    /// The first lexicon phrase contained in `text`.
    pub fn find(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        self.phrases
            .iter()
            .find(|phrase| haystack.contains(phrase.as_str()))
            .map(String::as_str)
    }

    pub fn matches(&self, text: &str) -> bool {
        self.find(text).is_some()
    }
}

/// How long to wait after dispatching a closing line before ending.
///
/// Proportional to the response length, clamped to the configured bounds.
pub fn end_wait(response: &str, config: &ConversationConfig) -> Duration {
    let estimate = (response.chars().count() as u64).saturating_mul(config.end_wait_ms_per_char);
    Duration::from_millis(estimate.clamp(config.end_wait_min_ms, config.end_wait_max_ms))
}
