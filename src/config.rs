//! Configuration types.
//!
//! Everything is read once at startup into an immutable [`AppConfig`] and
//! handed to the monitor and each adapter at construction time.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::source::whitelist::WhitelistPolicy;

/// Default poll interval in seconds.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// Default gap between deliveries of one batch.
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_secs(1);

/// Default summarizer model.
pub const DEFAULT_SUMMARY_MODEL: &str = "gpt-4o-mini";

/// Orchestrator policy values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Sleep between poll cycles.
    pub poll_interval: Duration,
    /// Sleep between two items of the same batch.
    pub pacing_delay: Duration,
    /// Disconnect + reconnect once after a failed fetch.
    pub reconnect_on_fetch_failure: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            pacing_delay: DEFAULT_PACING_DELAY,
            reconnect_on_fetch_failure: true,
        }
    }
}

/// IMAP mailbox settings.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub mailbox: String,
    /// Socket read timeout for the session.
    pub read_timeout: Duration,
}

/// Which enricher to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryMode {
    /// LLM-backed summaries.
    Llm,
    /// Offline first-sentence summaries.
    Basic,
}

/// Where notifications go.
#[derive(Debug, Clone)]
pub enum NotifyConfig {
    DiscordBot {
        token: SecretString,
        channel_id: String,
    },
    DiscordWebhook {
        url: SecretString,
    },
    Telegram {
        bot_token: SecretString,
        chat_id: String,
    },
}

impl NotifyConfig {
    pub fn channel_name(&self) -> &'static str {
        match self {
            Self::DiscordBot { .. } | Self::DiscordWebhook { .. } => "discord",
            Self::Telegram { .. } => "telegram",
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    /// Level + message only.
    pub concise: bool,
    /// Log file (directory, file name), when file logging is enabled.
    pub file: Option<(PathBuf, String)>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            concise: false,
            file: None,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub imap: ImapConfig,
    pub whitelist: WhitelistPolicy,
    pub summary_mode: SummaryMode,
    pub llm: Option<LlmConfig>,
    pub notify: NotifyConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let interval_secs: u64 = env.parse_or("CHECK_INTERVAL", DEFAULT_CHECK_INTERVAL_SECS)?;
        if interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CHECK_INTERVAL".into(),
                message: "must be a positive number of seconds".into(),
            });
        }
        let pacing_ms: u64 =
            env.parse_or("PACING_DELAY_MS", DEFAULT_PACING_DELAY.as_millis() as u64)?;
        let monitor = MonitorConfig {
            poll_interval: Duration::from_secs(interval_secs),
            pacing_delay: Duration::from_millis(pacing_ms),
            reconnect_on_fetch_failure: env.bool_or("RECONNECT_ON_FETCH_FAILURE", true)?,
        };

        let imap = ImapConfig {
            host: env.required("IMAP_HOST", "Set it to your mail server, e.g. imap.gmail.com")?,
            port: env.parse_or("IMAP_PORT", 993)?,
            username: env.required("IMAP_USERNAME", "The mailbox login name")?,
            password: SecretString::from(
                env.required("IMAP_PASSWORD", "The mailbox password or app password")?,
            ),
            mailbox: env.get("IMAP_MAILBOX").unwrap_or_else(|| "INBOX".to_string()),
            read_timeout: Duration::from_secs(env.parse_or("IMAP_TIMEOUT_SECS", 30)?),
        };

        let whitelist = WhitelistPolicy::parse(
            &env.get("WHITELISTED_EMAIL_ADDRESSES").unwrap_or_default(),
        );

        let summary_mode = match env.get("SUMMARY_MODE").as_deref() {
            None | Some("llm") => SummaryMode::Llm,
            Some("basic") => SummaryMode::Basic,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "SUMMARY_MODE".into(),
                    message: format!("expected 'llm' or 'basic', got '{other}'"),
                });
            }
        };

        let llm = match summary_mode {
            SummaryMode::Basic => None,
            SummaryMode::Llm => {
                let (backend, key_var) = match env.get("LLM_BACKEND").as_deref() {
                    None | Some("openai") => (LlmBackend::OpenAi, "OPENAI_API_KEY"),
                    Some("anthropic") => (LlmBackend::Anthropic, "ANTHROPIC_API_KEY"),
                    Some(other) => {
                        return Err(ConfigError::InvalidValue {
                            key: "LLM_BACKEND".into(),
                            message: format!("expected 'openai' or 'anthropic', got '{other}'"),
                        });
                    }
                };
                Some(LlmConfig {
                    backend,
                    api_key: SecretString::from(env.required(
                        key_var,
                        "Needed for summaries; set SUMMARY_MODE=basic to run without it",
                    )?),
                    model: env
                        .get("SUMMARY_MODEL")
                        .unwrap_or_else(|| DEFAULT_SUMMARY_MODEL.to_string()),
                })
            }
        };

        let notify = match env.get("NOTIFY_CHANNEL").as_deref() {
            None | Some("discord") => {
                if let Some(url) = env.get("DISCORD_WEBHOOK_URL") {
                    NotifyConfig::DiscordWebhook {
                        url: SecretString::from(url),
                    }
                } else {
                    let token = env.required(
                        "DISCORD_TOKEN",
                        "Or set DISCORD_WEBHOOK_URL to post through a webhook",
                    )?;
                    let channel_id = env.required("DISCORD_CHANNEL_ID", "Numeric channel id")?;
                    if !channel_id.chars().all(|c| c.is_ascii_digit()) {
                        return Err(ConfigError::InvalidValue {
                            key: "DISCORD_CHANNEL_ID".into(),
                            message: format!("'{channel_id}' is not a numeric id"),
                        });
                    }
                    NotifyConfig::DiscordBot {
                        token: SecretString::from(token),
                        channel_id,
                    }
                }
            }
            Some("telegram") => NotifyConfig::Telegram {
                bot_token: SecretString::from(
                    env.required("TELEGRAM_BOT_TOKEN", "Token from @BotFather")?,
                ),
                chat_id: env.required("TELEGRAM_CHAT_ID", "Chat that receives notifications")?,
            },
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "NOTIFY_CHANNEL".into(),
                    message: format!("expected 'discord' or 'telegram', got '{other}'"),
                });
            }
        };

        let file = if env.bool_or("LOG_TO_FILE", false)? {
            Some((
                PathBuf::from(env.get("LOG_DIR").unwrap_or_else(|| "logs".to_string())),
                env.get("LOG_FILE")
                    .unwrap_or_else(|| "email_monitor.log".to_string()),
            ))
        } else {
            None
        };
        let log = LogConfig {
            level: env
                .get("LOG_LEVEL")
                .map(|l| l.to_lowercase())
                .unwrap_or_else(|| "info".to_string()),
            concise: env.bool_or("LOG_CONCISE", false)?,
            file,
        };

        Ok(Self {
            monitor,
            imap,
            whitelist,
            summary_mode,
            llm,
            notify,
            log,
        })
    }
}

/// Typed accessors over a key lookup. Empty values count as unset.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str, hint: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingRequired {
            key: key.to_string(),
            hint: hint.to_string(),
        })
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
        }
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key).map(|v| v.to_lowercase()).as_deref() {
            None => Ok(default),
            Some("true" | "1" | "yes" | "on") => Ok(true),
            Some("false" | "0" | "no" | "off") => Ok(false),
            Some(other) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{other}' is not a boolean"),
            }),
        }
    }
}
