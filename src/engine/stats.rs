//! End-of-interval statistics, computed from a correlation table snapshot.
//!
//! Pairs whose absolute delta exceeds the ignore threshold are excluded from
//! the head-to-head tally but still count toward each source's raw total
//! (one policy for both variants; the key is remembered for reporting).

use super::types::HashEntry;
use crate::report::ReportSink;
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy)]
pub struct StatsOptions {
    pub ignore_delta_secs: i64,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalStats {
    pub event_name: &'static str,
    /// Keys with both timestamps inside the ignore threshold.
    pub seen_by_both: usize,
    pub reference_first: usize,
    pub comparator_first: usize,
    pub reference_first_pct: i64,
    /// Average winning margin in milliseconds, per side.
    pub reference_avg_delta_ms: i64,
    pub comparator_avg_delta_ms: i64,
    pub total_reference: usize,
    pub total_comparator: usize,
    /// Keys each side delivered first, including one-sided sightings.
    pub new_reference_first: usize,
    pub new_comparator_first: usize,
    pub low_fee_ignored: usize,
    pub high_delta_ignored: usize,
    verbose: bool,
}

/// Walk a snapshot, classify each entry and emit per-key records through the
/// sink. Sink failures are logged and never abort the report.
pub async fn compute(
    event_name: &'static str,
    snapshot: &HashMap<String, HashEntry>,
    options: StatsOptions,
    high_delta: &mut HashSet<String>,
    low_fee_count: usize,
    sink: &mut Option<Box<dyn ReportSink>>,
) -> IntervalStats {
    let mut reference_first = 0usize;
    let mut comparator_first = 0usize;
    let mut reference_total_delta = 0.0f64;
    let mut comparator_total_delta = 0.0f64;
    let mut new_reference_first = 0usize;
    let mut new_comparator_first = 0usize;
    let mut total_reference = 0usize;
    let mut total_comparator = 0usize;

    for (key, entry) in snapshot {
        let (reference_seen, comparator_seen) = match (entry.reference_seen, entry.comparator_seen)
        {
            (None, Some(comparator_seen)) => {
                if let Some(sink) = sink.as_mut() {
                    if let Err(e) = sink.write_missing_key(key).await {
                        log::error!("cannot add {:?} to missing hashes output: {}", key, e);
                    }
                    if let Err(e) = sink.write_record(key, None, Some(comparator_seen), None).await
                    {
                        log::error!("cannot add {:?} to record output: {}", key, e);
                    }
                }
                new_comparator_first += 1;
                total_comparator += 1;
                continue;
            }
            (Some(reference_seen), None) => {
                if let Some(sink) = sink.as_mut() {
                    if let Err(e) = sink.write_record(key, Some(reference_seen), None, None).await {
                        log::error!("cannot add {:?} to record output: {}", key, e);
                    }
                }
                new_reference_first += 1;
                total_reference += 1;
                continue;
            }
            (Some(r), Some(c)) => (r, c),
            // Entries are only created with one side set; an empty entry
            // cannot be produced by the multiplexer.
            (None, None) => continue,
        };

        let delta = reference_seen - comparator_seen;
        let delta_secs = delta.num_milliseconds() as f64 / 1000.0;

        total_reference += 1;
        total_comparator += 1;

        if delta_secs.abs() > options.ignore_delta_secs as f64 {
            high_delta.insert(key.clone());
            continue;
        }

        if let Some(sink) = sink.as_mut() {
            if let Err(e) = sink
                .write_record(
                    key,
                    Some(reference_seen),
                    Some(comparator_seen),
                    Some(delta.num_milliseconds()),
                )
                .await
            {
                log::error!("cannot add {:?} to record output: {}", key, e);
            }
        }

        if reference_seen < comparator_seen {
            new_reference_first += 1;
            reference_first += 1;
            reference_total_delta += -delta_secs;
        } else if comparator_seen < reference_seen {
            new_comparator_first += 1;
            comparator_first += 1;
            comparator_total_delta += delta_secs;
        }
    }

    let seen_by_both = reference_first + comparator_first;

    let reference_avg_delta_ms = if reference_first != 0 {
        (reference_total_delta / reference_first as f64 * 1000.0).round() as i64
    } else {
        0
    };

    let comparator_avg_delta_ms = if comparator_first != 0 {
        (comparator_total_delta / comparator_first as f64 * 1000.0).round() as i64
    } else {
        0
    };

    let reference_first_pct = if seen_by_both != 0 {
        (reference_first as f64 / seen_by_both as f64 * 100.0) as i64
    } else {
        0
    };

    IntervalStats {
        event_name,
        seen_by_both,
        reference_first,
        comparator_first,
        reference_first_pct,
        reference_avg_delta_ms,
        comparator_avg_delta_ms,
        total_reference,
        total_comparator,
        new_reference_first,
        new_comparator_first,
        low_fee_ignored: low_fee_count,
        high_delta_ignored: high_delta.len(),
        verbose: options.verbose,
    }
}

impl fmt::Display for IntervalStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(
            f,
            "Analysis of {} received on both feeds:",
            self.event_name
        )?;
        writeln!(f, "Number of {}: {}", self.event_name, self.seen_by_both)?;
        writeln!(
            f,
            "Number received from reference feed first: {}",
            self.reference_first
        )?;
        writeln!(
            f,
            "Number received from comparator feed first: {}",
            self.comparator_first
        )?;
        writeln!(
            f,
            "Percentage seen first from reference feed: {}%",
            self.reference_first_pct
        )?;
        writeln!(
            f,
            "Average time difference when reference feed was first (ms): {}",
            self.reference_avg_delta_ms
        )?;
        writeln!(
            f,
            "Average time difference when comparator feed was first (ms): {}",
            self.comparator_avg_delta_ms
        )?;
        writeln!(f)?;
        writeln!(f, "Total {} summary:", self.event_name)?;
        writeln!(
            f,
            "Total {} from reference feed: {}",
            self.event_name, self.total_reference
        )?;
        writeln!(
            f,
            "Total {} from comparator feed: {}",
            self.event_name, self.total_comparator
        )?;
        writeln!(
            f,
            "Number of low fee {} ignored: {}",
            self.event_name, self.low_fee_ignored
        )?;

        if self.verbose {
            writeln!(
                f,
                "Number of high delta {} ignored: {}",
                self.event_name, self.high_delta_ignored
            )?;
            writeln!(
                f,
                "Number of new {} seen first from reference feed: {}",
                self.event_name, self.new_reference_first
            )?;
            writeln!(
                f,
                "Number of new {} seen first from comparator feed: {}",
                self.event_name, self.new_comparator_first
            )?;
            writeln!(
                f,
                "Total number of {} seen: {}",
                self.event_name,
                self.new_reference_first + self.new_comparator_first
            )?;
        }

        Ok(())
    }
}
