//! Websocket plumbing shared by the two subscription readers and the
//! enrichment pool.

pub mod connection;
pub mod reader;

pub use connection::FeedConnection;
pub use reader::run_feed_reader;
