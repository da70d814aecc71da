//! Message and entry types flowing between the reader tasks, the enrichment
//! pool and the multiplexer.

use crate::error::TransportError;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

/// The two sides of the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedSource {
    /// Gateway-style broadcast feed.
    Reference,
    /// Standard node subscription.
    Comparator,
}

impl FeedSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedSource::Reference => "reference",
            FeedSource::Comparator => "comparator",
        }
    }
}

/// One raw wire notification from a feed reader task. A transport error is
/// delivered in-band so the multiplexer can log it; the reader terminates
/// after sending one.
#[derive(Debug)]
pub struct FeedMessage {
    pub payload: Result<Vec<u8>, TransportError>,
}

/// Result of a detail-fetch RPC issued by an enrichment worker.
#[derive(Debug)]
pub struct ContentResult {
    pub key: String,
    pub payload: Result<Vec<u8>, TransportError>,
}

/// Per-key first-seen timestamps. Each field is written at most once per
/// interval (first-write-wins, enforced by `CorrelationTable::set_if_unset`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashEntry {
    pub reference_seen: Option<DateTime<Utc>>,
    pub comparator_seen: Option<DateTime<Utc>>,
}

impl HashEntry {
    pub fn get(&self, source: FeedSource) -> Option<DateTime<Utc>> {
        match source {
            FeedSource::Reference => self.reference_seen,
            FeedSource::Comparator => self.comparator_seen,
        }
    }

    pub fn set(&mut self, source: FeedSource, at: DateTime<Utc>) {
        match source {
            FeedSource::Reference => self.reference_seen = Some(at),
            FeedSource::Comparator => self.comparator_seen = Some(at),
        }
    }
}

/// Content fields used by the transaction filter. Blocks carry no content of
/// interest, so both fields stay `None` for the block variant.
#[derive(Debug, Clone, Default)]
pub struct EventContent {
    /// Raw gas price string as received ("0x..." hex or decimal).
    pub gas_price: Option<String>,
    /// Recipient address, if any.
    pub to: Option<String>,
}

/// A parsed feed notification: the key plus whatever content came inline.
#[derive(Debug)]
pub struct KeyedNotification {
    pub key: String,
    pub content: Option<EventContent>,
}

/// Control commands executed inside the multiplexer's serialized loop. Each
/// carries a oneshot ack so the interval controller can block until the
/// operation is atomic with respect to feed arrivals.
#[derive(Debug)]
pub enum EngineCommand {
    /// Clear the trail set between the active and trail sub-phases.
    ClearTrail { done: oneshot::Sender<()> },
    /// Compute stats from the current table, drain pending queues, reset the
    /// interval state, and hand back the rendered report.
    Report { done: oneshot::Sender<String> },
}
