//! Subscription reader task: forwards raw frames to the multiplexer until
//! shutdown or a transport failure. There is no reconnection; a broken feed
//! invalidates the comparison, so the error is forwarded and the task ends.

use super::connection::FeedConnection;
use crate::engine::types::FeedMessage;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time;

/// Cap on the best-effort unsubscribe on the way out.
const UNSUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn run_feed_reader(
    mut conn: FeedConnection,
    feed_label: &'static str,
    unsubscribe_method: &'static str,
    subscription_id: String,
    out: mpsc::Sender<FeedMessage>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            msg = conn.next_message() => match msg {
                Ok(raw) => {
                    if out.send(FeedMessage { payload: Ok(raw) }).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = out.send(FeedMessage { payload: Err(e) }).await;
                    break;
                }
            },
        }
    }

    let unsubscribed = time::timeout(
        UNSUBSCRIBE_TIMEOUT,
        conn.unsubscribe(unsubscribe_method, &subscription_id),
    )
    .await;
    if !matches!(unsubscribed, Ok(Ok(()))) {
        log::debug!("could not unsubscribe from {} feed", feed_label);
    }

    log::debug!("{} feed reader stopped", feed_label);
}
