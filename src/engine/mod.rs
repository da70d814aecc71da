//! The comparison engine.
//!
//! ```text
//!   gateway ws ----> reader task ----\
//!                                     +--> multiplexer --> correlation table
//!   node ws -------> reader task ----/        ^  |
//!                                             |  v
//!   node ws (xN) --> content fetchers --------+  interval controller
//!                        ^                            (clear trail / report)
//!                        +-- bounded key queue
//! ```
//!
//! All interval state lives inside the multiplexer task; readers and the
//! enrichment pool only push messages into channels. The interval controller
//! injects commands into the same loop, so phase boundaries and reports are
//! serialized with feed processing.

pub mod classifier;
pub mod enrichment;
pub mod interval;
pub mod multiplexer;
pub mod protocol;
pub mod runner;
pub mod state;
pub mod stats;
pub mod table;
pub mod types;

pub use protocol::{BlockProtocol, FeedProtocol, TxProtocol};
pub use runner::run_compare;
pub use types::{FeedSource, HashEntry};
