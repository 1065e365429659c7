//! Notification sinks.

pub mod discord;
pub mod telegram;

pub use discord::DiscordNotifier;
pub use telegram::TelegramNotifier;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::NotifyConfig;
use crate::pipeline::types::Item;

/// Characters of body shown in a notification preview.
pub const PREVIEW_CHARS: usize = 1000;

/// Delivers one enriched item to an external channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name used in logs.
    fn name(&self) -> &str;

    /// `true` when the channel accepted the notification. Never panics on
    /// channel errors; they are logged and reported as `false`.
    async fn deliver(&self, item: &Item) -> bool;
}

/// Build the notifier selected by configuration.
pub fn create_notifier(config: &NotifyConfig) -> Arc<dyn Notifier> {
    match config {
        NotifyConfig::DiscordBot { token, channel_id } => {
            Arc::new(DiscordNotifier::bot(token.clone(), channel_id.clone()))
        }
        NotifyConfig::DiscordWebhook { url } => Arc::new(DiscordNotifier::webhook(url.clone())),
        NotifyConfig::Telegram { bot_token, chat_id } => {
            Arc::new(TelegramNotifier::new(bot_token.clone(), chat_id.clone()))
        }
    }
}

/// Truncate to at most `max` characters, appending `...` when cut.
pub fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}
