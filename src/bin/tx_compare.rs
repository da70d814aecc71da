//! Transaction Feed Comparison
//!
//! Races a gateway transaction broadcast feed against a node's pending
//! transaction subscription and reports which side delivers each hash first.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin tx_compare
//! ```
//!
//! ## Environment Variables
//!
//! - GATEWAY_URI - Gateway websocket endpoint (default: ws://127.0.0.1:28333/ws)
//! - NODE_WS_URI - Node websocket endpoint (default: ws://127.0.0.1:8546)
//! - AUTH_HEADER - Authorization header for the gateway connection (optional)
//! - FEED_NAME - Gateway feed to subscribe to (default: newTxs)
//! - LEAD_TIME_SECS - Warm-up before comparison starts (default: 60)
//! - INTERVAL_SECS - Length of each sampling interval (default: 60)
//! - TRAIL_TIME_SECS - Settling time after each interval (default: 60)
//! - NUM_INTERVALS - Number of intervals to run (default: 1)
//! - IGNORE_DELTA_SECS - Pairs further apart than this are not compared (default: 5)
//! - EXCLUDE_CONTENTS - Correlate on bare hashes, skip content fetches (default: false)
//! - MIN_GAS_PRICE - Minimum gas price filter in gigawei, 0 disables (optional)
//! - ADDRESSES - Comma-separated recipient allow-list (optional)
//! - CONTENT_WORKERS - Size of the content fetch pool (default: 4)
//! - DUMP - Per-hash outputs: "ALL", "MISSING" or "ALL,MISSING" (optional)
//! - VERBOSE - Extended per-interval statistics (default: false)
//! - RUST_LOG - Logging level (optional, default: info)

use feedcompare::config::VariantDefaults;
use feedcompare::engine::TxProtocol;
use feedcompare::{run_compare, CompareConfig};

const DEFAULTS: VariantDefaults = VariantDefaults {
    feed_name: "newTxs",
    trail_time_secs: 60,
    ignore_delta_secs: 5,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let config = CompareConfig::from_env(DEFAULTS)?;
    log::info!("comparing gateway feed {:?} against node feed", config.feed_name);
    log::info!("   GATEWAY_URI: {}", config.gateway_uri);
    log::info!("   NODE_WS_URI: {}", config.node_uri);

    run_compare(TxProtocol, config).await
}
