//! Configuration surface for the comparison binaries.
//!
//! Values come from environment variables (loaded via dotenv in the
//! binaries) with defaults matching typical local gateway/node setups.

use std::collections::HashSet;
use std::env;
use std::str::FromStr;

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
    /// Mutually exclusive options requested together.
    Conflict(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "invalid configuration value: {}", msg),
            ConfigError::Conflict(msg) => write!(f, "conflicting configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Which per-key outputs to produce at report time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DumpSelection {
    /// CSV record for every correlated key.
    pub records: bool,
    /// Plain-text list of keys the reference feed never delivered.
    pub missing: bool,
}

impl DumpSelection {
    pub fn is_empty(&self) -> bool {
        !self.records && !self.missing
    }
}

impl FromStr for DumpSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "" => Ok(DumpSelection::default()),
            "ALL" => Ok(DumpSelection {
                records: true,
                missing: false,
            }),
            "MISSING" => Ok(DumpSelection {
                records: false,
                missing: true,
            }),
            "ALL,MISSING" | "MISSING,ALL" => Ok(DumpSelection {
                records: true,
                missing: true,
            }),
            other => Err(ConfigError::InvalidValue(format!(
                "possible values for DUMP are \"ALL\", \"MISSING\", \"ALL,MISSING\", got {:?}",
                other
            ))),
        }
    }
}

/// Per-variant defaults, filled in by the transaction and block binaries.
#[derive(Debug, Clone, Copy)]
pub struct VariantDefaults {
    pub feed_name: &'static str,
    pub trail_time_secs: u64,
    pub ignore_delta_secs: i64,
}

#[derive(Debug, Clone)]
pub struct CompareConfig {
    /// Gateway websocket endpoint (reference feed).
    pub gateway_uri: String,
    /// Node websocket endpoint (comparator feed, also serves enrichment RPC).
    pub node_uri: String,
    /// Optional authorization header for the gateway connection.
    pub auth_header: Option<String>,
    /// Gateway feed name, e.g. "newTxs" or "bdnBlocks".
    pub feed_name: String,
    pub lead_time_secs: u64,
    pub interval_secs: u64,
    pub trail_time_secs: u64,
    pub num_intervals: usize,
    /// Pairs with an absolute delta above this are not comparable.
    pub ignore_delta_secs: i64,
    /// Skip content lookups entirely; correlate on bare hash notifications.
    pub exclude_contents: bool,
    /// Minimum gas price filter, in gigawei.
    pub min_price_gwei: Option<f64>,
    /// Recipient address allow-list, lowercased.
    pub addresses: HashSet<String>,
    pub content_workers: usize,
    pub dump: DumpSelection,
    pub verbose: bool,
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(format!("{}={:?}", name, raw))),
        Err(_) => Ok(default),
    }
}

impl CompareConfig {
    pub fn from_env(defaults: VariantDefaults) -> Result<Self, ConfigError> {
        let min_price_gwei = match env::var("MIN_GAS_PRICE") {
            Ok(raw) => {
                let v: f64 = raw
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(format!("MIN_GAS_PRICE={:?}", raw)))?;
                if v == 0.0 {
                    None
                } else {
                    Some(v)
                }
            }
            Err(_) => None,
        };

        let addresses: HashSet<String> = match env::var("ADDRESSES") {
            Ok(raw) => raw
                .to_lowercase()
                .split(',')
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => HashSet::new(),
        };

        let dump: DumpSelection = env::var("DUMP").unwrap_or_default().parse()?;

        Ok(Self {
            gateway_uri: env_or("GATEWAY_URI", "ws://127.0.0.1:28333/ws".to_string())?,
            node_uri: env_or("NODE_WS_URI", "ws://127.0.0.1:8546".to_string())?,
            auth_header: env::var("AUTH_HEADER").ok().filter(|h| !h.is_empty()),
            feed_name: env_or("FEED_NAME", defaults.feed_name.to_string())?,
            lead_time_secs: env_or("LEAD_TIME_SECS", 60)?,
            interval_secs: env_or("INTERVAL_SECS", 60)?,
            trail_time_secs: env_or("TRAIL_TIME_SECS", defaults.trail_time_secs)?,
            num_intervals: env_or("NUM_INTERVALS", 1)?,
            ignore_delta_secs: env_or("IGNORE_DELTA_SECS", defaults.ignore_delta_secs)?,
            exclude_contents: env_or("EXCLUDE_CONTENTS", false)?,
            min_price_gwei,
            addresses,
            content_workers: env_or("CONTENT_WORKERS", 4)?,
            dump,
            verbose: env_or("VERBOSE", false)?,
        })
    }

    /// Fail-fast checks that must pass before any task starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if (self.min_price_gwei.is_some() || !self.addresses.is_empty()) && self.exclude_contents {
            return Err(ConfigError::Conflict(
                "filtering by minimum gas price or addresses requires EXCLUDE_CONTENTS=false"
                    .to_string(),
            ));
        }

        // Phase durations become signed chrono deltas downstream; reject
        // values a u64 can hold but an i64 cannot.
        for (name, value) in [
            ("LEAD_TIME_SECS", self.lead_time_secs),
            ("INTERVAL_SECS", self.interval_secs),
            ("TRAIL_TIME_SECS", self.trail_time_secs),
        ] {
            if i64::try_from(value).is_err() {
                return Err(ConfigError::InvalidValue(format!(
                    "{} is too large for a time delta",
                    name
                )));
            }
        }

        if self.num_intervals == 0 {
            return Err(ConfigError::InvalidValue(
                "NUM_INTERVALS must be at least 1".to_string(),
            ));
        }

        if self.interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "INTERVAL_SECS must be at least 1".to_string(),
            ));
        }

        if self.content_workers == 0 && !self.exclude_contents {
            return Err(ConfigError::InvalidValue(
                "CONTENT_WORKERS must be at least 1 when contents are fetched".to_string(),
            ));
        }

        Ok(())
    }
}
