//! The multiplexer task. Single owner of all interval state; every feed
//! message, content result and control command funnels through its loop, so
//! no lock guards the correlation table.
//!
//! The loop polls its channels in priority order without blocking: shutdown,
//! then commands, then content results, then the two feeds, and yields to
//! the scheduler when everything is empty. This spends scheduler wakeups to
//! keep arrival timestamps honest under load.

use super::enrichment::{drain_keys, EnrichmentQueue};
use super::protocol::FeedProtocol;
use super::state::{ContentFilter, EngineState, FilterVerdict};
use super::stats::{self, StatsOptions};
use super::types::{ContentResult, EngineCommand, FeedMessage, FeedSource};
use crate::report::ReportSink;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, Mutex};

pub struct Multiplexer<P: FeedProtocol> {
    protocol: Arc<P>,
    state: EngineState,
    filter: ContentFilter,
    stats_options: StatsOptions,
    /// Correlate on bare notifications; no enrichment pool is running.
    exclude_contents: bool,
    interval_secs: u64,
    reference_rx: mpsc::Receiver<FeedMessage>,
    comparator_rx: mpsc::Receiver<FeedMessage>,
    content_rx: mpsc::Receiver<ContentResult>,
    command_rx: mpsc::Receiver<EngineCommand>,
    shutdown: broadcast::Receiver<()>,
    enrichment: Option<EnrichmentQueue>,
    key_queue: Option<Arc<Mutex<mpsc::Receiver<String>>>>,
    sink: Option<Box<dyn ReportSink>>,
}

pub struct MultiplexerChannels {
    pub reference_rx: mpsc::Receiver<FeedMessage>,
    pub comparator_rx: mpsc::Receiver<FeedMessage>,
    pub content_rx: mpsc::Receiver<ContentResult>,
    pub command_rx: mpsc::Receiver<EngineCommand>,
    pub shutdown: broadcast::Receiver<()>,
}

pub struct MultiplexerOptions<P: FeedProtocol> {
    pub protocol: Arc<P>,
    pub state: EngineState,
    pub filter: ContentFilter,
    pub stats_options: StatsOptions,
    pub exclude_contents: bool,
    pub interval_secs: u64,
    pub enrichment: Option<EnrichmentQueue>,
    pub key_queue: Option<Arc<Mutex<mpsc::Receiver<String>>>>,
    pub sink: Option<Box<dyn ReportSink>>,
}

impl<P: FeedProtocol> Multiplexer<P> {
    pub fn new(options: MultiplexerOptions<P>, channels: MultiplexerChannels) -> Self {
        Self {
            protocol: options.protocol,
            state: options.state,
            filter: options.filter,
            stats_options: options.stats_options,
            exclude_contents: options.exclude_contents,
            interval_secs: options.interval_secs,
            reference_rx: channels.reference_rx,
            comparator_rx: channels.comparator_rx,
            content_rx: channels.content_rx,
            command_rx: channels.command_rx,
            shutdown: channels.shutdown,
            enrichment: options.enrichment,
            key_queue: options.key_queue,
            sink: options.sink,
        }
    }

    pub async fn run(mut self) {
        loop {
            match self.shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => break,
            }

            if let Ok(command) = self.command_rx.try_recv() {
                self.handle_command(command).await;
                continue;
            }

            if let Ok(result) = self.content_rx.try_recv() {
                self.process_content(result);
                continue;
            }

            if let Ok(msg) = self.reference_rx.try_recv() {
                self.process_reference(msg);
                continue;
            }

            if let Ok(msg) = self.comparator_rx.try_recv() {
                self.process_comparator(msg);
                continue;
            }

            tokio::task::yield_now().await;
        }

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.flush().await {
                log::error!("cannot flush report outputs: {}", e);
            }
        }
        log::debug!("multiplexer stopped");
    }

    fn process_reference(&mut self, msg: FeedMessage) {
        let raw = match msg.payload {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("failed to read message from reference feed: {}", e);
                return;
            }
        };

        let at = Utc::now();
        let note = match self.protocol.parse_reference(&raw) {
            Ok(note) => note,
            Err(e) => {
                log::error!("{}", e);
                return;
            }
        };
        log::debug!("got message at {} (reference feed), key: {}", at, note.key);

        // Lead arrivals are excluded before any content filtering so the
        // exclusion does not depend on what the notification carried.
        if self.state.is_lead(at) {
            self.state.mark_lead(note.key);
            return;
        }

        if !self.exclude_contents {
            if let Some(content) = &note.content {
                match self.filter.verdict(&note.key, content) {
                    Ok(FilterVerdict::Accept) => {}
                    Ok(FilterVerdict::LowFee) => {
                        self.state.low_fee.insert(note.key);
                        return;
                    }
                    Ok(FilterVerdict::AddressMismatch) => return,
                    Err(e) => {
                        log::error!("{}", e);
                        return;
                    }
                }
            }
        }

        self.state.record_arrival(FeedSource::Reference, &note.key, at);
    }

    fn process_comparator(&mut self, msg: FeedMessage) {
        let raw = match msg.payload {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("failed to read message from comparator feed: {}", e);
                return;
            }
        };

        let at = Utc::now();
        let key = match self.protocol.parse_comparator(&raw) {
            Ok(key) => key,
            Err(e) => {
                log::error!("{}", e);
                return;
            }
        };
        log::debug!("got message at {} (comparator feed), key: {}", at, key);

        if self.state.is_lead(at) {
            self.state.mark_lead(key);
            return;
        }

        // With contents enabled the arrival is timestamped when the fetched
        // record clears the filter, so both paths race through set_if_unset.
        match &self.enrichment {
            Some(queue) => queue.enqueue(&key),
            None => {
                self.state.record_arrival(FeedSource::Comparator, &key, at);
            }
        }
    }

    fn process_content(&mut self, result: ContentResult) {
        let raw = match result.payload {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("cannot get contents for {:?}: {}", result.key, e);
                return;
            }
        };

        let at = Utc::now();
        let content = match self.protocol.parse_content(&raw) {
            Ok(Some(content)) => content,
            // The node does not know this key yet.
            Ok(None) => return,
            Err(e) => {
                log::error!("{}", e);
                return;
            }
        };

        match self.filter.verdict(&result.key, &content) {
            Ok(FilterVerdict::Accept) => {}
            Ok(FilterVerdict::LowFee) => {
                self.state.low_fee.insert(result.key);
                return;
            }
            Ok(FilterVerdict::AddressMismatch) => return,
            Err(e) => {
                log::error!("{}", e);
                return;
            }
        }

        self.state
            .record_arrival(FeedSource::Comparator, &result.key, at);
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::ClearTrail { done } => {
                self.state.clear_trail();
                let _ = done.send(());
            }
            EngineCommand::Report { done } => {
                let report = self.report().await;
                let _ = done.send(report);
            }
        }
    }

    /// Interval boundary: render stats from the table, discard whatever is
    /// still queued for enrichment, then reset for the next interval.
    async fn report(&mut self) -> String {
        let snapshot = self.state.table.snapshot();
        let computed = stats::compute(
            self.protocol.event_name(),
            &snapshot,
            self.stats_options,
            &mut self.state.high_delta,
            self.state.low_fee.len(),
            &mut self.sink,
        )
        .await;

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.flush().await {
                log::error!("cannot flush report outputs: {}", e);
            }
        }

        if let Some(key_queue) = &self.key_queue {
            let dropped = drain_keys(key_queue);
            if dropped > 0 {
                log::debug!("discarded {} keys queued for enrichment", dropped);
            }
        }
        while self.content_rx.try_recv().is_ok() {}

        self.state.reset_interval(Utc::now(), self.interval_secs);

        computed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::classifier::IntervalWindow;
    use crate::engine::protocol::TxProtocol;
    use chrono::{Duration, Utc};
    use tokio::sync::oneshot;

    struct Harness {
        reference_tx: mpsc::Sender<FeedMessage>,
        comparator_tx: mpsc::Sender<FeedMessage>,
        command_tx: mpsc::Sender<EngineCommand>,
        shutdown_tx: broadcast::Sender<()>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn spawn_multiplexer(exclude_contents: bool) -> Harness {
        let (reference_tx, reference_rx) = mpsc::channel(64);
        let (comparator_tx, comparator_rx) = mpsc::channel(64);
        let (_content_tx, content_rx) = mpsc::channel::<ContentResult>(64);
        let (command_tx, command_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let now = Utc::now();
        let state = EngineState::new(IntervalWindow {
            open: now - Duration::seconds(1),
            close: now + Duration::seconds(60),
        });

        let multiplexer = Multiplexer::new(
            MultiplexerOptions {
                protocol: Arc::new(TxProtocol),
                state,
                filter: ContentFilter::default(),
                stats_options: StatsOptions {
                    ignore_delta_secs: 5,
                    verbose: true,
                },
                exclude_contents,
                interval_secs: 60,
                enrichment: None,
                key_queue: None,
                sink: None,
            },
            MultiplexerChannels {
                reference_rx,
                comparator_rx,
                content_rx,
                command_rx,
                shutdown: shutdown_rx,
            },
        );

        let handle = tokio::spawn(multiplexer.run());

        Harness {
            reference_tx,
            comparator_tx,
            command_tx,
            shutdown_tx,
            handle,
        }
    }

    fn gateway_msg(hash: &str) -> FeedMessage {
        let raw = format!(
            r#"{{"params":{{"result":{{"txHash":"{}","txContents":{{}}}}}}}}"#,
            hash
        );
        FeedMessage {
            payload: Ok(raw.into_bytes()),
        }
    }

    fn node_msg(hash: &str) -> FeedMessage {
        let raw = format!(r#"{{"params":{{"subscription":"0x1","result":"{}"}}}}"#, hash);
        FeedMessage {
            payload: Ok(raw.into_bytes()),
        }
    }

    async fn report(harness: &Harness) -> String {
        let (done_tx, done_rx) = oneshot::channel();
        harness
            .command_tx
            .send(EngineCommand::Report { done: done_tx })
            .await
            .unwrap();
        done_rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_correlates_hashes_seen_on_both_feeds() {
        let harness = spawn_multiplexer(true);

        harness.reference_tx.send(gateway_msg("0xaaa")).await.unwrap();
        harness.comparator_tx.send(node_msg("0xaaa")).await.unwrap();
        harness.comparator_tx.send(node_msg("0xccc")).await.unwrap();

        // Give the poll loop a chance to consume the feed messages before
        // the report command lands.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let stats = report(&harness).await;
        assert!(stats.contains("Number of transactions: 1"));
        assert!(stats.contains("Total transactions from reference feed: 1"));
        assert!(stats.contains("Total transactions from comparator feed: 2"));

        harness.shutdown_tx.send(()).unwrap();
        harness.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_report_resets_the_table() {
        let harness = spawn_multiplexer(true);

        harness.reference_tx.send(gateway_msg("0xaaa")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let _ = report(&harness).await;
        let second = report(&harness).await;
        assert!(second.contains("Total transactions from reference feed: 0"));

        harness.shutdown_tx.send(()).unwrap();
        harness.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_trail_ack() {
        let harness = spawn_multiplexer(true);

        let (done_tx, done_rx) = oneshot::channel();
        harness
            .command_tx
            .send(EngineCommand::ClearTrail { done: done_tx })
            .await
            .unwrap();
        done_rx.await.unwrap();

        harness.shutdown_tx.send(()).unwrap();
        harness.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let harness = spawn_multiplexer(true);

        harness
            .reference_tx
            .send(FeedMessage {
                payload: Ok(b"not json".to_vec()),
            })
            .await
            .unwrap();
        harness.reference_tx.send(gateway_msg("0xbbb")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let stats = report(&harness).await;
        assert!(stats.contains("Total transactions from reference feed: 1"));

        harness.shutdown_tx.send(()).unwrap();
        harness.handle.await.unwrap();
    }
}
