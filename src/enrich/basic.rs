//! Offline summarizer: first sentence plus the first action-looking sentence.

use async_trait::async_trait;

use crate::enrich::{Enricher, empty_body_summary, truncate};
use crate::pipeline::types::Item;

/// Keywords that mark a sentence as an action item.
const ACTION_KEYWORDS: &[&str] = &[
    "please",
    "request",
    "need",
    "required",
    "urgent",
    "important",
    "deadline",
    "by tomorrow",
    "by next",
    "attached",
];

/// Summarizer that needs no network access.
#[derive(Debug, Clone, Default)]
pub struct BasicSummarizer;

impl BasicSummarizer {
    pub fn new() -> Self {
        Self
    }

    /// Build the digest for a non-empty body.
    pub fn summarize(item: &Item) -> String {
        let body = item.body.trim();
        if body.is_empty() {
            return empty_body_summary(item);
        }

        let flat = body.replace(['\r', '\n'], " ");
        let first_sentence = match flat.split_once('.') {
            Some((first, _)) => first.trim().to_string(),
            None => truncate(flat.trim(), 50),
        };

        let lower = flat.to_lowercase();
        let action = ACTION_KEYWORDS
            .iter()
            .filter(|k| lower.contains(*k))
            .find_map(|k| {
                flat.split('.')
                    .find(|s| s.to_lowercase().contains(k))
                    .map(|s| s.trim().to_string())
            });

        match action {
            Some(action) => format!(
                "Email from {} regarding {}. {} Action item: {}.",
                item.sender,
                item.subject,
                truncate(&first_sentence, 100),
                action
            ),
            None => format!(
                "Email from {} regarding {}. {}",
                item.sender,
                item.subject,
                truncate(&first_sentence, 150)
            ),
        }
    }
}

#[async_trait]
impl Enricher for BasicSummarizer {
    async fn enrich(&self, item: Item) -> Item {
        let summary = Self::summarize(&item);
        item.with_summary(summary)
    }
}
