//! Mail monitor: polls a mailbox, summarizes new mail, and posts notifications.

pub mod config;
pub mod enrich;
pub mod error;
pub mod llm;
pub mod logging;
pub mod monitor;
pub mod notify;
pub mod pipeline;
pub mod source;
