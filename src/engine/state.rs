//! Interval-scoped engine state: the correlation table, the window
//! membership sets and the content filter. Exclusively owned by the
//! multiplexer task for the engine's entire lifetime.

use super::classifier::{classify, Classification, IntervalWindow};
use super::table::CorrelationTable;
use super::types::{EventContent, FeedSource};
use crate::error::ParseError;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Outcome of applying the content filter to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Accept,
    /// Gas price below the configured minimum; counted for reporting.
    LowFee,
    /// Recipient not on the allow-list; silently skipped.
    AddressMismatch,
}

/// Content-based exclusion filter (transaction variant only). Inactive when
/// neither a minimum price nor an address allow-list is configured.
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    /// Threshold in wei (configured in gigawei, scaled at construction).
    min_price_wei: Option<f64>,
    addresses: HashSet<String>,
}

impl ContentFilter {
    pub fn new(min_price_gwei: Option<f64>, addresses: HashSet<String>) -> Self {
        Self {
            min_price_wei: min_price_gwei.map(|gwei| gwei * 1e9),
            addresses,
        }
    }

    pub fn verdict(&self, key: &str, content: &EventContent) -> Result<FilterVerdict, ParseError> {
        if !self.addresses.is_empty() {
            match &content.to {
                Some(to) if self.addresses.contains(&to.to_lowercase()) => {}
                Some(_) => return Ok(FilterVerdict::AddressMismatch),
                // No recipient (e.g. contract creation): allow-list cannot match.
                None => {}
            }
        }

        if let (Some(min), Some(raw)) = (self.min_price_wei, &content.gas_price) {
            let price = parse_gas_price(raw).map_err(|_| {
                ParseError::Schema(format!("cannot parse gas price {:?} for {:?}", raw, key))
            })?;
            if (price as f64) < min {
                return Ok(FilterVerdict::LowFee);
            }
        }

        Ok(FilterVerdict::Accept)
    }
}

/// Parse a gas price string with auto radix ("0x..." hex or decimal).
pub fn parse_gas_price(raw: &str) -> Result<i64, std::num::ParseIntError> {
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else {
        raw.parse()
    }
}

#[derive(Debug)]
pub struct EngineState {
    pub table: CorrelationTable,
    pub lead_seen: HashSet<String>,
    pub trail_seen: HashSet<String>,
    /// Keys excluded by the minimum-price filter; accumulates across
    /// intervals, kept only for reporting counts.
    pub low_fee: HashSet<String>,
    /// Keys whose delta exceeded the ignore threshold; accumulates likewise.
    pub high_delta: HashSet<String>,
    pub window: IntervalWindow,
}

impl EngineState {
    pub fn new(window: IntervalWindow) -> Self {
        Self {
            table: CorrelationTable::new(),
            lead_seen: HashSet::new(),
            trail_seen: HashSet::new(),
            low_fee: HashSet::new(),
            high_delta: HashSet::new(),
            window,
        }
    }

    /// Whether `at` precedes the active window. Checked before content
    /// filtering so lead arrivals are excluded regardless of content.
    pub fn is_lead(&self, at: DateTime<Utc>) -> bool {
        at < self.window.open
    }

    pub fn mark_lead(&mut self, key: String) {
        self.lead_seen.insert(key);
    }

    /// Classify an arrival and mutate the table/sets accordingly.
    pub fn record_arrival(
        &mut self,
        source: FeedSource,
        key: &str,
        at: DateTime<Utc>,
    ) -> Classification {
        let decision = classify(
            at,
            &self.window,
            &self.lead_seen,
            &self.trail_seen,
            &self.table,
            key,
        );

        match decision {
            Classification::Lead => {
                self.lead_seen.insert(key.to_string());
            }
            Classification::Correlate => {
                self.table.set_if_unset(key, source, at);
            }
            Classification::Trail => {
                self.trail_seen.insert(key.to_string());
            }
        }

        decision
    }

    /// Boundary between the active and trail sub-phases.
    pub fn clear_trail(&mut self) {
        self.trail_seen = HashSet::new();
    }

    /// Interval boundary: discard the table and lead set, roll the window.
    /// The low-fee and high-delta sets deliberately survive the reset.
    pub fn reset_interval(&mut self, now: DateTime<Utc>, active_secs: u64) {
        self.table.clear();
        self.lead_seen = HashSet::new();
        self.window.roll(now, active_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn state() -> EngineState {
        EngineState::new(IntervalWindow {
            open: ts(5),
            close: ts(65),
        })
    }

    #[test]
    fn test_lead_key_excluded_even_if_reobserved_inside_window() {
        let mut s = state();
        assert_eq!(
            s.record_arrival(FeedSource::Reference, "h1", ts(2)),
            Classification::Lead
        );
        // Re-observed inside the active window by the other source only.
        assert_eq!(
            s.record_arrival(FeedSource::Comparator, "h1", ts(10)),
            Classification::Trail
        );
        assert!(!s.table.contains("h1"));
    }

    #[test]
    fn test_first_write_wins_per_source() {
        let mut s = state();
        s.record_arrival(FeedSource::Reference, "h1", ts(10));
        s.record_arrival(FeedSource::Reference, "h1", ts(20));
        assert_eq!(s.table.get("h1").unwrap().reference_seen, Some(ts(10)));
    }

    #[test]
    fn test_trail_arrival_excluded() {
        let mut s = state();
        assert_eq!(
            s.record_arrival(FeedSource::Comparator, "h2", ts(70)),
            Classification::Trail
        );
        assert!(!s.table.contains("h2"));
        assert!(s.trail_seen.contains("h2"));
    }

    #[test]
    fn test_reset_clears_table_and_lead_but_not_trail() {
        let mut s = state();
        s.record_arrival(FeedSource::Reference, "lead", ts(1));
        s.record_arrival(FeedSource::Reference, "h1", ts(10));
        s.record_arrival(FeedSource::Reference, "late", ts(99));
        s.low_fee.insert("cheap".to_string());

        s.reset_interval(ts(100), 60);

        assert!(s.table.is_empty());
        assert!(s.lead_seen.is_empty());
        assert!(s.trail_seen.contains("late"));
        assert!(s.low_fee.contains("cheap"));
        assert_eq!(s.window.close, ts(160));
    }

    #[test]
    fn test_parse_gas_price_radix() {
        assert_eq!(parse_gas_price("0x3b9aca00").unwrap(), 1_000_000_000);
        assert_eq!(parse_gas_price("2000000000").unwrap(), 2_000_000_000);
        assert!(parse_gas_price("wat").is_err());
    }

    #[test]
    fn test_filter_low_fee_and_addresses() {
        let mut addresses = HashSet::new();
        addresses.insert("0xaaa".to_string());
        let filter = ContentFilter::new(Some(2.0), addresses);

        let low = EventContent {
            gas_price: Some("0x3b9aca00".to_string()), // 1 gwei
            to: Some("0xAAA".to_string()),
        };
        assert_eq!(filter.verdict("h", &low).unwrap(), FilterVerdict::LowFee);

        let wrong_to = EventContent {
            gas_price: Some("0xga".to_string()), // never parsed: address rejects first
            to: Some("0xbbb".to_string()),
        };
        assert_eq!(
            filter.verdict("h", &wrong_to).unwrap(),
            FilterVerdict::AddressMismatch
        );

        let ok = EventContent {
            gas_price: Some("5000000000".to_string()),
            to: Some("0xaaa".to_string()),
        };
        assert_eq!(filter.verdict("h", &ok).unwrap(), FilterVerdict::Accept);
    }

    #[test]
    fn test_inactive_filter_accepts_everything() {
        let filter = ContentFilter::new(None, HashSet::new());
        let content = EventContent {
            gas_price: Some("1".to_string()),
            to: None,
        };
        assert_eq!(
            filter.verdict("h", &content).unwrap(),
            FilterVerdict::Accept
        );
    }
}
