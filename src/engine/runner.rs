//! Engine assembly: opens both feed connections, wires the channels, spawns
//! the tasks and drives the interval schedule to completion.

use super::classifier::IntervalWindow;
use super::enrichment::{self, key_queue};
use super::interval::IntervalController;
use super::multiplexer::{Multiplexer, MultiplexerChannels, MultiplexerOptions};
use super::protocol::FeedProtocol;
use super::state::{ContentFilter, EngineState};
use super::stats::StatsOptions;
use super::types::{ContentResult, EngineCommand, FeedMessage};
use crate::config::CompareConfig;
use crate::feed::{run_feed_reader, FeedConnection};
use crate::report::{DumpSink, ReportSink};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

const FEED_CHANNEL_CAPACITY: usize = 1000;
const COMMAND_CHANNEL_CAPACITY: usize = 8;

/// Run the full comparison: connect, subscribe, sample for the configured
/// number of intervals, print one report per interval, then shut down.
///
/// Both subscriptions are established before any task starts, so a bad
/// endpoint fails the run immediately instead of producing a one-sided
/// report.
pub async fn run_compare<P: FeedProtocol>(
    protocol: P,
    config: CompareConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let protocol = Arc::new(protocol);

    let mut reference_conn =
        FeedConnection::open(&config.gateway_uri, config.auth_header.as_deref()).await?;
    let (method, params) =
        protocol.reference_subscription(&config.feed_name, !config.exclude_contents);
    let reference_sub = reference_conn.subscribe(method, params).await?;
    log::info!(
        "subscribed to {} feed {:?} ({})",
        protocol.event_name(),
        config.feed_name,
        reference_sub
    );

    let mut comparator_conn = FeedConnection::open(&config.node_uri, None).await?;
    let (method, params) = protocol.comparator_subscription();
    let comparator_sub = comparator_conn.subscribe(method, params).await?;
    log::info!("subscribed to node feed ({})", comparator_sub);

    let sink: Option<Box<dyn ReportSink>> =
        match DumpSink::create(config.dump, Path::new("."), protocol.event_name())? {
            Some(sink) => Some(Box::new(sink)),
            None => None,
        };

    let (reference_tx, reference_rx) = mpsc::channel::<FeedMessage>(FEED_CHANNEL_CAPACITY);
    let (comparator_tx, comparator_rx) = mpsc::channel::<FeedMessage>(FEED_CHANNEL_CAPACITY);
    let (content_tx, content_rx) = mpsc::channel::<ContentResult>(enrichment::QUEUE_CAPACITY);
    let (command_tx, command_rx) = mpsc::channel::<EngineCommand>(COMMAND_CHANNEL_CAPACITY);
    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let mut tasks = Vec::new();

    let (enrichment_queue, enrichment_keys) = if config.exclude_contents {
        (None, None)
    } else {
        let (queue, keys) = key_queue();
        for worker_id in 0..config.content_workers {
            tasks.push(tokio::spawn(enrichment::run_content_fetcher(
                worker_id,
                Arc::clone(&protocol),
                config.node_uri.clone(),
                Arc::clone(&keys),
                content_tx.clone(),
                shutdown_tx.subscribe(),
            )));
        }
        (Some(queue), Some(keys))
    };
    drop(content_tx);

    tasks.push(tokio::spawn(run_feed_reader(
        reference_conn,
        "reference",
        "unsubscribe",
        reference_sub,
        reference_tx,
        shutdown_tx.subscribe(),
    )));
    tasks.push(tokio::spawn(run_feed_reader(
        comparator_conn,
        "comparator",
        "eth_unsubscribe",
        comparator_sub,
        comparator_tx,
        shutdown_tx.subscribe(),
    )));

    let state = EngineState::new(IntervalWindow::starting_at(
        Utc::now(),
        config.lead_time_secs,
        config.interval_secs,
    ));
    let multiplexer = Multiplexer::new(
        MultiplexerOptions {
            protocol: Arc::clone(&protocol),
            state,
            filter: ContentFilter::new(config.min_price_gwei, config.addresses.clone()),
            stats_options: StatsOptions {
                ignore_delta_secs: config.ignore_delta_secs,
                verbose: config.verbose,
            },
            exclude_contents: config.exclude_contents,
            interval_secs: config.interval_secs,
            enrichment: enrichment_queue,
            key_queue: enrichment_keys,
            sink,
        },
        MultiplexerChannels {
            reference_rx,
            comparator_rx,
            content_rx,
            command_rx,
            shutdown: shutdown_tx.subscribe(),
        },
    );
    tasks.push(tokio::spawn(multiplexer.run()));

    let controller = IntervalController {
        commands: command_tx,
        lead_time_secs: config.lead_time_secs,
        interval_secs: config.interval_secs,
        trail_time_secs: config.trail_time_secs,
        num_intervals: config.num_intervals,
        min_price_gwei: config.min_price_gwei,
    };
    controller.run().await;

    let _ = shutdown_tx.send(());
    for task in tasks {
        if let Err(e) = task.await {
            log::error!("task ended abnormally: {}", e);
        }
    }

    Ok(())
}
