//! Per-key report outputs: a CSV of every correlated hash and a plain-text
//! list of hashes the reference feed never delivered. Both optional; the
//! engine has no dependency on concrete file I/O beyond this trait.

use crate::config::DumpSelection;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

#[async_trait]
pub trait ReportSink: Send {
    /// Invoked once per correlated key at report time. Timestamps are `None`
    /// for the side that never delivered; `delta_ms` only when both did.
    async fn write_record(
        &mut self,
        key: &str,
        reference: Option<DateTime<Utc>>,
        comparator: Option<DateTime<Utc>>,
        delta_ms: Option<i64>,
    ) -> std::io::Result<()>;

    /// Invoked for keys missing from the reference feed.
    async fn write_missing_key(&mut self, key: &str) -> std::io::Result<()>;

    async fn flush(&mut self) -> std::io::Result<()>;
}

/// File-backed sink driven by the `DUMP` selection. Either output may be
/// absent; a fully empty selection should use no sink at all.
pub struct DumpSink {
    records: Option<BufWriter<File>>,
    missing: Option<BufWriter<File>>,
}

impl DumpSink {
    /// Create the selected output files in `dir`. Returns `Ok(None)` when
    /// the selection is empty.
    pub fn create(selection: DumpSelection, dir: &Path, prefix: &str) -> std::io::Result<Option<Self>> {
        if selection.is_empty() {
            return Ok(None);
        }

        let records = if selection.records {
            let path = dir.join(format!("all_{}_hashes.csv", prefix));
            let mut writer = BufWriter::new(File::create(&path)?);
            writeln!(writer, "hash,reference_time,comparator_time,delta_ms")?;
            log::info!("writing per-hash records to {}", path.display());
            Some(writer)
        } else {
            None
        };

        let missing = if selection.missing {
            let path = dir.join(format!("missing_{}_hashes.txt", prefix));
            log::info!("writing missing hashes to {}", path.display());
            Some(BufWriter::new(File::create(&path)?))
        } else {
            None
        };

        Ok(Some(Self { records, missing }))
    }

    fn format_time(at: Option<DateTime<Utc>>) -> String {
        match at {
            Some(t) => t.format(TIMESTAMP_FORMAT).to_string(),
            None => "0".to_string(),
        }
    }
}

#[async_trait]
impl ReportSink for DumpSink {
    async fn write_record(
        &mut self,
        key: &str,
        reference: Option<DateTime<Utc>>,
        comparator: Option<DateTime<Utc>>,
        delta_ms: Option<i64>,
    ) -> std::io::Result<()> {
        if let Some(writer) = self.records.as_mut() {
            writeln!(
                writer,
                "{},{},{},{}",
                key,
                Self::format_time(reference),
                Self::format_time(comparator),
                delta_ms.unwrap_or(0),
            )?;
        }
        Ok(())
    }

    async fn write_missing_key(&mut self, key: &str) -> std::io::Result<()> {
        if let Some(writer) = self.missing.as_mut() {
            writeln!(writer, "{}", key)?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        if let Some(writer) = self.records.as_mut() {
            writer.flush()?;
        }
        if let Some(writer) = self.missing.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for DumpSink {
    fn drop(&mut self) {
        if let Some(writer) = self.records.as_mut() {
            let _ = writer.flush();
        }
        if let Some(writer) = self.missing.as_mut() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_empty_selection_yields_no_sink() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DumpSink::create(DumpSelection::default(), dir.path(), "tx").unwrap();
        assert!(sink.is_none());
    }

    #[tokio::test]
    async fn test_records_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let selection = DumpSelection {
            records: true,
            missing: true,
        };
        let mut sink = DumpSink::create(selection, dir.path(), "tx").unwrap().unwrap();

        let reference = Utc.timestamp_opt(10, 500_000_000).unwrap();
        let comparator = Utc.timestamp_opt(12, 0).unwrap();
        sink.write_record("0xf00", Some(reference), Some(comparator), Some(-1500))
            .await
            .unwrap();
        sink.write_record("0xbar", None, Some(comparator), None)
            .await
            .unwrap();
        sink.write_missing_key("0xbar").await.unwrap();
        sink.flush().await.unwrap();

        let csv = std::fs::read_to_string(dir.path().join("all_tx_hashes.csv")).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "hash,reference_time,comparator_time,delta_ms"
        );
        assert_eq!(
            lines.next().unwrap(),
            "0xf00,1970-01-01T00:00:10.500,1970-01-01T00:00:12.000,-1500"
        );
        assert_eq!(
            lines.next().unwrap(),
            "0xbar,0,1970-01-01T00:00:12.000,0"
        );

        let missing = std::fs::read_to_string(dir.path().join("missing_tx_hashes.txt")).unwrap();
        assert_eq!(missing, "0xbar\n");
    }
}
