//! Mail sources: where new items come from.

pub mod imap;
pub mod parse;
pub mod whitelist;

pub use imap::ImapSource;
pub use whitelist::WhitelistPolicy;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::pipeline::types::Item;

/// A mailbox the monitor polls.
///
/// Implementations own whitelist filtering and "already seen" tracking:
/// `fetch_new` never returns an item that was returned by an earlier
/// successful call, nor one whose sender the policy rejects.
#[async_trait]
pub trait MailSource: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Open the session.
    async fn connect(&mut self) -> Result<(), SourceError>;

    /// Close the session. Must be idempotent and safe when never connected.
    async fn disconnect(&mut self) -> Result<(), SourceError>;

    /// Fetch newly arrived items, in mailbox order.
    async fn fetch_new(&mut self) -> Result<Vec<Item>, SourceError>;
}
