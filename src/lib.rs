//! feedcompare - measures which of two real-time feeds delivers each
//! hash-keyed event (transaction or block announcement) first, and by how
//! much.
//!
//! A gateway-style broadcast feed is treated as the "reference" source and a
//! standard node subscription as the "comparator". Both eventually announce
//! the same hashes; the engine correlates first-sightings per source inside a
//! sampling window and reports latency statistics per interval.

pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod report;

pub use config::{CompareConfig, ConfigError, DumpSelection};
pub use engine::run_compare;
pub use error::{ParseError, TransportError};
