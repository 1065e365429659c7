//! Enrichment: attaches a short digest to each item.

pub mod basic;
pub mod summarizer;

pub use basic::BasicSummarizer;
pub use summarizer::LlmSummarizer;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::SummaryMode;
use crate::llm::{LlmConfig, create_provider};
use crate::pipeline::types::Item;

/// Turns a fetched item into an enriched one.
///
/// Never fails: when the underlying service errors, the returned item still
/// carries a degraded placeholder summary.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, item: Item) -> Item;
}

/// Build the enricher selected by configuration.
///
/// LLM mode falls back to [`BasicSummarizer`] when no provider can be built.
pub fn create_enricher(mode: SummaryMode, llm: Option<&LlmConfig>) -> Arc<dyn Enricher> {
    match (mode, llm) {
        (SummaryMode::Llm, Some(config)) => match create_provider(config) {
            Ok(provider) => Arc::new(LlmSummarizer::new(provider)),
            Err(e) => {
                warn!(error = %e, "LLM provider unavailable; using basic summaries");
                Arc::new(BasicSummarizer::new())
            }
        },
        (SummaryMode::Llm, None) => {
            warn!("No LLM configured; using basic summaries");
            Arc::new(BasicSummarizer::new())
        }
        (SummaryMode::Basic, _) => Arc::new(BasicSummarizer::new()),
    }
}

/// Summary used for items with an empty body.
pub fn empty_body_summary(item: &Item) -> String {
    format!(
        "Email from {} with subject '{}' (no content).",
        item.sender, item.subject
    )
}

/// Keep the first `max` characters, appending `...` when anything was cut.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &s[..end]),
        None => s.to_string(),
    }
}
