//! Discord notifier: posts one embed per item via the REST API or a webhook.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ChannelError;
use crate::notify::{Notifier, PREVIEW_CHARS, clip};
use crate::pipeline::types::Item;

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Embed limits enforced by Discord.
const MAX_TITLE: usize = 256;
const MAX_FIELD_VALUE: usize = 1024;

/// Embed colour (blue).
const EMBED_COLOR: u32 = 0x3498db;

/// Where messages are posted.
#[derive(Debug, Clone)]
enum Target {
    Bot {
        token: SecretString,
        channel_id: String,
    },
    Webhook {
        url: SecretString,
    },
}

#[derive(Debug, Serialize, PartialEq)]
struct EmbedField {
    name: &'static str,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct Embed {
    title: String,
    color: u32,
    timestamp: String,
    fields: Vec<EmbedField>,
}

#[derive(Debug, Serialize)]
struct MessagePayload {
    embeds: Vec<Embed>,
}

/// Posts item notifications to a Discord channel.
pub struct DiscordNotifier {
    target: Target,
    api_base: String,
    client: reqwest::Client,
}

impl DiscordNotifier {
    /// Post as a bot user to `channel_id`.
    pub fn bot(token: SecretString, channel_id: String) -> Self {
        Self {
            target: Target::Bot { token, channel_id },
            api_base: DISCORD_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Post through an incoming webhook URL.
    pub fn webhook(url: SecretString) -> Self {
        Self {
            target: Target::Webhook { url },
            api_base: DISCORD_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the REST base URL (bot target only).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn endpoint(&self) -> String {
        match &self.target {
            Target::Bot { channel_id, .. } => {
                format!("{}/channels/{channel_id}/messages", self.api_base)
            }
            Target::Webhook { url } => url.expose_secret().to_string(),
        }
    }

    async fn send(&self, item: &Item) -> Result<(), ChannelError> {
        let payload = MessagePayload {
            embeds: vec![build_embed(item)],
        };

        let mut request = self.client.post(self.endpoint()).json(&payload);
        if let Target::Bot { token, .. } = &self.target {
            request = request.header("Authorization", format!("Bot {}", token.expose_secret()));
        }

        let resp = request.send().await.map_err(|e| ChannelError::SendFailed {
            name: "discord".into(),
            reason: e.to_string(),
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status.as_u16() == 429 {
            return Err(ChannelError::RateLimited {
                name: "discord".into(),
            });
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ChannelError::Rejected {
            name: "discord".into(),
            status: status.as_u16(),
            body: clip(&body, 200),
        })
    }
}

/// Render an item as a Discord embed.
fn build_embed(item: &Item) -> Embed {
    let mut fields = vec![
        EmbedField {
            name: "From",
            value: clip(&item.sender, MAX_FIELD_VALUE),
            inline: false,
        },
        EmbedField {
            name: "Date",
            value: clip(
                if item.received_at.is_empty() {
                    "Unknown"
                } else {
                    item.received_at.as_str()
                },
                MAX_FIELD_VALUE,
            ),
            inline: false,
        },
    ];

    if let Some(summary) = item.summary.as_deref().filter(|s| !s.is_empty()) {
        fields.push(EmbedField {
            name: "Summary",
            value: clip(summary, MAX_FIELD_VALUE),
            inline: false,
        });
    }

    if !item.body.trim().is_empty() {
        fields.push(EmbedField {
            name: "Content Preview",
            value: clip(item.body.trim(), PREVIEW_CHARS),
            inline: false,
        });
    }

    Embed {
        title: clip(&item.subject, MAX_TITLE),
        color: EMBED_COLOR,
        timestamp: chrono::Utc::now().to_rfc3339(),
        fields,
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        "discord"
    }

    async fn deliver(&self, item: &Item) -> bool {
        match self.send(item).await {
            Ok(()) => {
                info!(id = %item.id, subject = %item.subject, "Sent Discord notification");
                true
            }
            Err(e) => {
                warn!(id = %item.id, error = %e, "Discord notification failed");
                false
            }
        }
    }
}
