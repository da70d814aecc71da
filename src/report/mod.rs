pub mod sink;

pub use sink::{DumpSink, ReportSink};
