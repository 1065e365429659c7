//! Error types for the mail monitor.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a mail source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Could not open or authenticate the mailbox session.
    #[error("Connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    /// The session broke while fetching or marking messages.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Fetch was attempted without an open session.
    #[error("Not connected")]
    NotConnected,

    /// The source call panicked; caught at the monitor boundary.
    #[error("Source call panicked: {0}")]
    Panicked(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Notification channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Channel {name} rejected payload with status {status}: {body}")]
    Rejected {
        name: String,
        status: u16,
        body: String,
    },

    #[error("Rate limited on channel {name}")]
    RateLimited { name: String },
}

/// Per-item failures recovered inside a poll cycle.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("Enrichment of item {id} panicked: {reason}")]
    EnrichPanicked { id: String, reason: String },

    #[error("Channel {channel} did not accept item {id}")]
    DeliveryRejected { id: String, channel: String },

    #[error("Delivery of item {id} panicked: {reason}")]
    DeliveryPanicked { id: String, reason: String },
}

/// Fatal monitor errors surfaced to the caller of `Monitor::start`.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Initial mailbox connection failed: {0}")]
    StartupConnection(#[source] SourceError),
}
