//! Time-range extraction from large timestamp-prefixed log files.
//!
//! The start line is found by binary search over byte offsets, then lines
//! are streamed forward until the end bound, a line limit or end-of-file.
//! Everything runs as a chain of stages, see [`chain`].

pub mod chain;
pub mod config;
pub mod error;
pub mod extract;
pub mod timestamp;

pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use extract::{run_extraction, ExtractStats};
pub use timestamp::{Parsed, Timestamp, TimestampLayout};
