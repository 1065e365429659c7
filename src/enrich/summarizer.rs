//! LLM-backed email summarizer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::enrich::{Enricher, empty_body_summary, truncate};
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::Item;
use crate::source::parse::strip_quoted_text;

/// Body characters sent to the model.
const MAX_BODY_CHARS: usize = 4000;

/// Max tokens for the summary call.
const SUMMARY_MAX_TOKENS: u32 = 550;

/// Temperature for summaries.
const SUMMARY_TEMPERATURE: f32 = 0.3;

/// Phrases that suggest the model restated the subject instead of reading the body.
const GENERIC_PHRASES: &[&str] = &["email contains", "the email is about", "this email discusses"];

const SYSTEM_PROMPT: &str = "\
You are an expert email analyst who creates precise, actionable summaries.

1. Analyze the BODY content; extract meaning, not keywords.
2. Identify the primary purpose of the email (information, request, update, ...).
3. Extract concrete action items with their deadlines or urgency.
4. Highlight key facts, figures and details that need attention.
5. Mention attachments or links and why they matter.
6. Put the most important information first.
7. Be concise: 3-5 sentences.

Do not restate the subject line as the summary.";

/// Summarizes items through an [`LlmProvider`].
pub struct LlmSummarizer {
    llm: Arc<dyn LlmProvider>,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    fn build_request(item: &Item) -> CompletionRequest {
        let body = strip_quoted_text(&item.body);
        let body = if body.trim().is_empty() { item.body.as_str() } else { body.as_str() };
        let chars = body.chars().count();
        if chars > MAX_BODY_CHARS {
            debug!(
                id = %item.id,
                from = chars,
                to = MAX_BODY_CHARS,
                "Truncating body for summary"
            );
        }
        let user = format!(
            "Summarize this email, focusing on the content of the BODY.\n\n\
             FROM: {}\nSUBJECT: {}\n\nBODY:\n{}\n\n\
             Cover the main purpose, action items and deadlines, key facts, and any context.",
            item.sender,
            item.subject,
            truncate(body, MAX_BODY_CHARS)
        );

        CompletionRequest::new(vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)])
            .with_max_tokens(SUMMARY_MAX_TOKENS)
            .with_temperature(SUMMARY_TEMPERATURE)
    }
}

#[async_trait]
impl Enricher for LlmSummarizer {
    async fn enrich(&self, item: Item) -> Item {
        if item.body.trim().is_empty() {
            warn!(id = %item.id, subject = %item.subject, "Email has empty body; using simple summary");
            let summary = empty_body_summary(&item);
            return item.with_summary(summary);
        }

        info!(
            id = %item.id,
            from = %item.sender,
            subject = %item.subject,
            body_len = item.body.len(),
            "Summarizing email"
        );

        let request = Self::build_request(&item);
        match self.llm.complete(request).await {
            Ok(response) => {
                let summary = response.content.trim().to_string();
                if summary.is_empty() {
                    warn!(id = %item.id, model = self.llm.model_name(), "Model returned an empty summary");
                    let fallback = format!(
                        "Email from {} about '{}' (summary unavailable).",
                        item.sender, item.subject
                    );
                    return item.with_summary(fallback);
                }

                let lower = summary.to_lowercase();
                if GENERIC_PHRASES.iter().any(|p| lower.contains(p)) {
                    warn!(id = %item.id, "Summary may be too generic");
                }
                debug!(
                    id = %item.id,
                    words = summary.split_whitespace().count(),
                    chars = summary.len(),
                    "Summary generated"
                );
                item.with_summary(summary)
            }
            Err(e) => {
                warn!(id = %item.id, error = %e, "Summary request failed; using degraded summary");
                let fallback = format!(
                    "Email from {} about '{}' (summary unavailable due to API error).",
                    item.sender, item.subject
                );
                item.with_summary(fallback)
            }
        }
    }
}
