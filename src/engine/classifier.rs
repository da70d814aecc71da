//! Window classification: decide whether an arrival falls in the lead,
//! active or trail period of the current interval.

use super::table::CorrelationTable;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Boundaries of the current sampling interval. `open` is fixed at startup
/// (now + lead time); `close` rolls forward at every interval reset.
#[derive(Debug, Clone, Copy)]
pub struct IntervalWindow {
    pub open: DateTime<Utc>,
    pub close: DateTime<Utc>,
}

impl IntervalWindow {
    pub fn starting_at(now: DateTime<Utc>, lead_secs: u64, active_secs: u64) -> Self {
        let open = now + Duration::seconds(lead_secs as i64);
        Self {
            open,
            close: open + Duration::seconds(active_secs as i64),
        }
    }

    /// Begin the next interval's active period at `now`.
    pub fn roll(&mut self, now: DateTime<Utc>, active_secs: u64) {
        self.close = now + Duration::seconds(active_secs as i64);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Observed before the active window opened; excluded for the interval.
    Lead,
    /// Eligible for first-seen recording in the correlation table.
    Correlate,
    /// Observed too late, or for a key already excluded.
    Trail,
}

/// Pure classification decision, in precedence order:
/// 1. before `open` -> Lead
/// 2. key already tracked -> Correlate (second source may land past `close`)
/// 3. before `close` and not lead/trail-excluded -> Correlate
/// 4. otherwise -> Trail
pub fn classify(
    at: DateTime<Utc>,
    window: &IntervalWindow,
    lead_seen: &HashSet<String>,
    trail_seen: &HashSet<String>,
    table: &CorrelationTable,
    key: &str,
) -> Classification {
    if at < window.open {
        return Classification::Lead;
    }

    if table.contains(key) {
        return Classification::Correlate;
    }

    if at < window.close && !trail_seen.contains(key) && !lead_seen.contains(key) {
        return Classification::Correlate;
    }

    Classification::Trail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::FeedSource;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn window() -> IntervalWindow {
        IntervalWindow {
            open: ts(5),
            close: ts(65),
        }
    }

    #[test]
    fn test_before_open_is_lead() {
        let table = CorrelationTable::new();
        let got = classify(
            ts(3),
            &window(),
            &HashSet::new(),
            &HashSet::new(),
            &table,
            "h1",
        );
        assert_eq!(got, Classification::Lead);
    }

    #[test]
    fn test_inside_window_is_correlate() {
        let table = CorrelationTable::new();
        let got = classify(
            ts(10),
            &window(),
            &HashSet::new(),
            &HashSet::new(),
            &table,
            "h1",
        );
        assert_eq!(got, Classification::Correlate);
    }

    #[test]
    fn test_after_close_is_trail() {
        let table = CorrelationTable::new();
        let got = classify(
            ts(70),
            &window(),
            &HashSet::new(),
            &HashSet::new(),
            &table,
            "h2",
        );
        assert_eq!(got, Classification::Trail);
    }

    #[test]
    fn test_tracked_key_correlates_past_close() {
        // A key first seen near close must still accept the other source's
        // timestamp slightly after close.
        let mut table = CorrelationTable::new();
        table.set_if_unset("h1", FeedSource::Reference, ts(64));

        let got = classify(
            ts(66),
            &window(),
            &HashSet::new(),
            &HashSet::new(),
            &table,
            "h1",
        );
        assert_eq!(got, Classification::Correlate);
    }

    #[test]
    fn test_lead_seen_key_never_correlates() {
        let table = CorrelationTable::new();
        let mut lead_seen = HashSet::new();
        lead_seen.insert("h1".to_string());

        let got = classify(ts(10), &window(), &lead_seen, &HashSet::new(), &table, "h1");
        assert_eq!(got, Classification::Trail);
    }

    #[test]
    fn test_trail_seen_key_stays_trail() {
        let table = CorrelationTable::new();
        let mut trail_seen = HashSet::new();
        trail_seen.insert("h1".to_string());

        let got = classify(ts(10), &window(), &HashSet::new(), &trail_seen, &table, "h1");
        assert_eq!(got, Classification::Trail);
    }

    #[test]
    fn test_window_roll_moves_close_only() {
        let mut w = window();
        w.roll(ts(100), 60);
        assert_eq!(w.open, ts(5));
        assert_eq!(w.close, ts(160));
    }
}
