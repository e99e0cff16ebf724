use std::io::Write;
use std::time::{Duration, Instant};

use crate::chain::{Chain, Extractor, FileSource, Locator, Sink};
use crate::config::Config;
use crate::error::Result;

/// Counters collected during one extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub bytes_written: u64,
    /// Lines counted by the extractor; zero when it skipped itself.
    pub lines: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Seeks issued while locating the start line.
    pub probes: u64,
    pub locate_time: Option<Duration>,
    /// File offset of the first emitted line when a start bound was given.
    pub start_offset: Option<u64>,
    pub duration: Duration,
}

/// Write the lines of `config.path()` selected by `config` to `out`.
pub fn run_extraction(config: &Config, out: &mut dyn Write) -> Result<ExtractStats> {
    let started = Instant::now();
    let mut chain = Chain::new()
        .stage(FileSource::new(config))
        .stage(Locator::new(config))
        .stage(Extractor::new(config))
        .stage(Sink::new(out));
    chain.run()?;

    let mut stats = chain.stats().clone();
    stats.duration = started.elapsed();
    log::debug!(
        "extract: {} bytes, {} lines in {}us",
        stats.bytes_written,
        stats.lines,
        stats.duration.as_micros()
    );
    Ok(stats)
}
