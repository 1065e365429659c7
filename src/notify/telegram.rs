//! Telegram notifier: sends a text message per item through the Bot API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::error::ChannelError;
use crate::notify::{Notifier, PREVIEW_CHARS, clip};
use crate::pipeline::types::Item;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Posts item notifications to a Telegram chat.
pub struct TelegramNotifier {
    bot_token: SecretString,
    chat_id: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: SecretString, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            api_base: "https://api.telegram.org".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    /// Send a text message, splitting at Telegram's length limit.
    async fn send_message(&self, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(&chunk).await?;
        }
        Ok(())
    }

    /// Send one chunk, Markdown first with plain-text fallback.
    async fn send_message_chunk(&self, text: &str) -> Result<(), ChannelError> {
        let markdown_body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !plain_resp.status().is_success() {
            let status = plain_resp.status().as_u16();
            let body = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::Rejected {
                name: "telegram".into(),
                status,
                body: clip(&body, 200),
            });
        }

        Ok(())
    }
}

/// Render an item as a Telegram message.
fn render(item: &Item) -> String {
    let mut text = format!(
        "*{}*\nFrom: {}\nDate: {}",
        item.subject,
        item.sender,
        if item.received_at.is_empty() {
            "Unknown"
        } else {
            item.received_at.as_str()
        }
    );
    if let Some(summary) = item.summary.as_deref().filter(|s| !s.is_empty()) {
        text.push_str(&format!("\n\nSummary:\n{summary}"));
    }
    if !item.body.trim().is_empty() {
        text.push_str(&format!(
            "\n\nPreview:\n{}",
            clip(item.body.trim(), PREVIEW_CHARS)
        ));
    }
    text
}

/// Split text into chunks of at most `max_len` bytes, preferring newline or
/// space boundaries and never cutting inside a UTF-8 sequence.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, item: &Item) -> bool {
        match self.send_message(&render(item)).await {
            Ok(()) => {
                info!(id = %item.id, chat = %self.chat_id, "Sent Telegram notification");
                true
            }
            Err(e) => {
                warn!(id = %item.id, error = %e, "Telegram notification failed");
                false
            }
        }
    }
}
