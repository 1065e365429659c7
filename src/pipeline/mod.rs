//! Pipeline data types shared by the monitor and its adapters.
//!
//! Items flow: source `fetch_new()` → `Enricher::enrich()` → `Notifier::deliver()`.

pub mod types;

pub use types::{CycleReport, DEFAULT_SUBJECT, Item, RunReport};
