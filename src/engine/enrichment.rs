//! Content enrichment pool. Bare comparator notifications carry only a hash;
//! when content filtering is active the hash is queued here and a small pool
//! of workers fetches the full record over dedicated node connections.
//!
//! The queue is bounded and lossy: when it is full new keys are dropped and
//! logged, which keeps a slow node from backing up the multiplexer.

use super::protocol::FeedProtocol;
use super::types::ContentResult;
use crate::feed::FeedConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time;

pub const QUEUE_CAPACITY: usize = 8192;

/// Workers release the shared receiver lock at this cadence so the
/// multiplexer's best-effort drain can get a look in.
const RECV_SLICE: Duration = Duration::from_millis(100);

/// Sending half of the key queue, held by the multiplexer.
pub struct EnrichmentQueue {
    tx: mpsc::Sender<String>,
}

impl EnrichmentQueue {
    /// Queue a key for a detail fetch. Drops are tolerated.
    pub fn enqueue(&self, key: &str) {
        if let Err(e) = self.tx.try_send(key.to_string()) {
            log::warn!("enrichment queue full, dropping {:?}: {}", key, e);
        }
    }
}

/// Build the key queue: the multiplexer keeps the `EnrichmentQueue`, the
/// receiver is shared across workers behind a mutex.
pub fn key_queue() -> (EnrichmentQueue, Arc<Mutex<mpsc::Receiver<String>>>) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    (EnrichmentQueue { tx }, Arc::new(Mutex::new(rx)))
}

/// Discard keys still queued at an interval boundary. Best effort: when a
/// worker holds the receiver, the leftover keys simply get fetched and their
/// results skipped against the fresh table.
pub fn drain_keys(queue: &Arc<Mutex<mpsc::Receiver<String>>>) -> usize {
    let mut drained = 0;
    if let Ok(mut rx) = queue.try_lock() {
        while rx.try_recv().is_ok() {
            drained += 1;
        }
    }
    drained
}

/// One pool worker. Owns its node connection; terminates on shutdown, on
/// queue closure, or after reporting a transport failure.
pub async fn run_content_fetcher<P: FeedProtocol>(
    worker_id: usize,
    protocol: Arc<P>,
    node_uri: String,
    queue: Arc<Mutex<mpsc::Receiver<String>>>,
    results: mpsc::Sender<ContentResult>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut conn = match FeedConnection::open(&node_uri, None).await {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("content fetcher {} cannot connect to node: {}", worker_id, e);
            return;
        }
    };
    log::debug!("content fetcher {} connected to {}", worker_id, node_uri);

    loop {
        match shutdown.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => break,
        }

        let key = {
            let mut rx = queue.lock().await;
            match time::timeout(RECV_SLICE, rx.recv()).await {
                Ok(Some(key)) => key,
                Ok(None) => break,
                Err(_) => continue,
            }
        };

        let (method, params) = protocol.content_request(&key);
        let payload = conn.call(method, params).await;
        let failed = payload.is_err();

        if results.send(ContentResult { key, payload }).await.is_err() {
            break;
        }
        if failed {
            log::error!("content fetcher {} lost its node connection", worker_id);
            break;
        }
    }

    log::debug!("content fetcher {} stopped", worker_id);
}
