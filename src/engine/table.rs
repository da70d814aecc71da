//! Correlation table: hash -> per-source first-seen timestamps.
//!
//! Owned and mutated exclusively by the multiplexer task; first-write-wins
//! per source resolves the race between the enriched-content path and the
//! bare-hash path reporting the same arrival.

use super::types::{FeedSource, HashEntry};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: HashMap<String, HashEntry>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&HashEntry> {
        self.entries.get(key)
    }

    pub fn get_or_create(&mut self, key: &str) -> &mut HashEntry {
        self.entries.entry(key.to_string()).or_default()
    }

    /// Record a first-sighting; keeps any previously set timestamp.
    pub fn set_if_unset(&mut self, key: &str, source: FeedSource, at: DateTime<Utc>) {
        let entry = self.get_or_create(key);
        if entry.get(source).is_none() {
            entry.set(source, at);
        }
    }

    /// Immutable copy handed to the statistics aggregator.
    pub fn snapshot(&self) -> HashMap<String, HashEntry> {
        self.entries.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_set_if_unset_is_idempotent() {
        let mut table = CorrelationTable::new();
        table.set_if_unset("h1", FeedSource::Reference, ts(10));
        table.set_if_unset("h1", FeedSource::Reference, ts(99));

        let entry = table.get("h1").unwrap();
        assert_eq!(entry.reference_seen, Some(ts(10)));
        assert_eq!(entry.comparator_seen, None);
    }

    #[test]
    fn test_sources_do_not_clobber_each_other() {
        let mut table = CorrelationTable::new();
        table.set_if_unset("h1", FeedSource::Reference, ts(10));
        table.set_if_unset("h1", FeedSource::Comparator, ts(12));

        let entry = table.get("h1").unwrap();
        assert_eq!(entry.reference_seen, Some(ts(10)));
        assert_eq!(entry.comparator_seen, Some(ts(12)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_clear_discards_whole_table() {
        let mut table = CorrelationTable::new();
        table.set_if_unset("h1", FeedSource::Reference, ts(10));
        table.set_if_unset("h2", FeedSource::Comparator, ts(11));
        table.clear();
        assert!(table.is_empty());
        assert!(!table.contains("h1"));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut table = CorrelationTable::new();
        table.set_if_unset("h1", FeedSource::Reference, ts(10));
        let snap = table.snapshot();
        table.clear();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap["h1"].reference_seen, Some(ts(10)));
    }
}
