//! Core types flowing through the monitoring pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subject used when a message carries none.
pub const DEFAULT_SUBJECT: &str = "No Subject";

/// One fetched mailbox message plus its derived summary.
///
/// Created by a [`MailSource`](crate::source::MailSource), moved through an
/// [`Enricher`](crate::enrich::Enricher) which fills `summary`, then read by a
/// [`Notifier`](crate::notify::Notifier) and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Source-assigned identifier (IMAP UID). Unique within one batch.
    pub id: String,
    /// Message-ID header, or a generated `gen-<uuid>` when missing.
    pub message_id: String,
    /// Sender address.
    pub sender: String,
    /// Subject line; [`DEFAULT_SUBJECT`] when absent.
    pub subject: String,
    /// Date header as supplied by the source.
    pub received_at: String,
    /// Parsed form of `received_at`, when it could be parsed.
    pub received_ts: Option<DateTime<Utc>>,
    /// Readable body text, possibly empty.
    pub body: String,
    /// Digest written by the enricher. `None` until enrichment runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Item {
    pub fn new(id: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message_id: format!("gen-{}", uuid::Uuid::new_v4()),
            sender: sender.into(),
            subject: DEFAULT_SUBJECT.to_string(),
            received_at: String::new(),
            received_ts: None,
            body: String::new(),
            summary: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        let subject = subject.into();
        if !subject.trim().is_empty() {
            self.subject = subject;
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn with_received(mut self, raw: impl Into<String>, ts: Option<DateTime<Utc>>) -> Self {
        self.received_at = raw.into();
        self.received_ts = ts;
        self
    }

    /// Attach the enrichment result. Only enrichers call this.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Whether enrichment has run on this item.
    pub fn is_enriched(&self) -> bool {
        self.summary.is_some()
    }
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// 1-based cycle number.
    pub cycle: u64,
    /// Items returned by the source.
    pub fetched: usize,
    /// Items accepted by the notifier.
    pub delivered: usize,
    /// Items that failed enrichment or delivery.
    pub failed: usize,
    /// Items left unprocessed because a stop was requested mid-batch.
    pub abandoned: usize,
    /// Whether `fetch_new` failed this cycle.
    pub fetch_failed: bool,
    /// Whether a reconnect was attempted, and whether it succeeded.
    pub reconnected: Option<bool>,
}

impl CycleReport {
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            ..Default::default()
        }
    }
}

/// Totals over a whole run of the monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub cycles: u64,
    pub fetched: usize,
    pub delivered: usize,
    pub failed: usize,
    pub abandoned: usize,
    pub fetch_failures: u64,
    pub reconnects: u64,
}

impl RunReport {
    pub fn absorb(&mut self, cycle: &CycleReport) {
        self.cycles += 1;
        self.fetched += cycle.fetched;
        self.delivered += cycle.delivered;
        self.failed += cycle.failed;
        self.abandoned += cycle.abandoned;
        if cycle.fetch_failed {
            self.fetch_failures += 1;
        }
        if cycle.reconnected.is_some() {
            self.reconnects += 1;
        }
    }
}
