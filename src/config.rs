use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::timestamp::{Timestamp, TimestampLayout};

/// Default chunk size for random access (binary search probes): 4KB
pub const DEFAULT_READ_CHUNK_SMALL: usize = 4 * 1024;
/// Default chunk size for sequential access: 8MB
pub const DEFAULT_READ_CHUNK_LARGE: usize = 8 * 1024 * 1024;
/// Default file offset alignment for reads: 4KB
pub const DEFAULT_READ_CHUNK_ALIGN: usize = 4 * 1024;

/// Validated extraction settings.
///
/// Built once through [`ConfigBuilder`] and only read afterwards; every
/// stage receives it by reference.
#[derive(Debug, Clone)]
pub struct Config {
    path: PathBuf,
    filter: Option<Vec<u8>>,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
    max_lines: Option<u64>,
    layout: Option<TimestampLayout>,
    read_chunk_small: usize,
    read_chunk_large: usize,
    read_chunk_align: usize,
    debug: bool,
}

impl Config {
    pub fn builder(path: impl Into<PathBuf>) -> ConfigBuilder {
        ConfigBuilder::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filter(&self) -> Option<&[u8]> {
        self.filter.as_deref()
    }

    pub fn start(&self) -> Option<Timestamp> {
        self.start
    }

    pub fn end(&self) -> Option<Timestamp> {
        self.end
    }

    pub fn max_lines(&self) -> Option<u64> {
        self.max_lines
    }

    /// Layout detected from the bounds; `None` when no bound was given.
    pub fn layout(&self) -> Option<&TimestampLayout> {
        self.layout.as_ref()
    }

    pub fn read_chunk_small(&self) -> usize {
        self.read_chunk_small
    }

    pub fn read_chunk_large(&self) -> usize {
        self.read_chunk_large
    }

    pub fn read_chunk_align(&self) -> usize {
        self.read_chunk_align
    }

    /// Collect timings for the debug report.
    pub fn debug(&self) -> bool {
        self.debug
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    path: PathBuf,
    filter: Option<Vec<u8>>,
    start: Option<String>,
    end: Option<String>,
    max_lines: Option<u64>,
    read_chunk_small: usize,
    read_chunk_large: usize,
    read_chunk_align: usize,
    debug: bool,
}

impl ConfigBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            filter: None,
            start: None,
            end: None,
            max_lines: None,
            read_chunk_small: DEFAULT_READ_CHUNK_SMALL,
            read_chunk_large: DEFAULT_READ_CHUNK_LARGE,
            read_chunk_align: DEFAULT_READ_CHUNK_ALIGN,
            debug: false,
        }
    }

    /// First timestamp to emit, e.g. `2022-01-02 00:00:00`.
    pub fn start(mut self, bound: impl Into<String>) -> Self {
        self.start = Some(bound.into());
        self
    }

    /// Last timestamp to emit (inclusive).
    pub fn end(mut self, bound: impl Into<String>) -> Self {
        self.end = Some(bound.into());
        self
    }

    /// Emit only lines containing `needle`.
    pub fn filter(mut self, needle: impl Into<Vec<u8>>) -> Self {
        self.filter = Some(needle.into());
        self
    }

    pub fn max_lines(mut self, lines: u64) -> Self {
        self.max_lines = Some(lines);
        self
    }

    pub fn read_chunk_small(mut self, bytes: usize) -> Self {
        self.read_chunk_small = bytes;
        self
    }

    pub fn read_chunk_large(mut self, bytes: usize) -> Self {
        self.read_chunk_large = bytes;
        self
    }

    pub fn read_chunk_align(mut self, bytes: usize) -> Self {
        self.read_chunk_align = bytes;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Detect the timestamp layout, parse the bounds and validate.
    pub fn build(self) -> Result<Config> {
        let layout = match self.start.as_deref().or(self.end.as_deref()) {
            Some(bound) => Some(TimestampLayout::detect(bound)?),
            None => None,
        };
        let parse = |bound: &Option<String>| -> Result<Option<Timestamp>> {
            match (bound, &layout) {
                (Some(bound), Some(layout)) => layout.parse_bound(bound).map(Some),
                _ => Ok(None),
            }
        };
        let start = parse(&self.start)?;
        let end = parse(&self.end)?;

        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(Error::InvalidConfig(
                    "end-date must be larger than start-date".to_string(),
                ));
            }
        }
        if self.read_chunk_large == 0 {
            return Err(Error::InvalidConfig("bad buffer size".to_string()));
        }
        let read_chunk_small = self.read_chunk_small.min(self.read_chunk_large);
        if read_chunk_small == 0 {
            return Err(Error::InvalidConfig("bad small buffer size".to_string()));
        }
        if !self.read_chunk_align.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "read alignment must be a power of two: {}",
                self.read_chunk_align
            )));
        }
        // An aligned read must still cover the requested offset.
        let read_chunk_align = if self.read_chunk_align > read_chunk_small {
            1 << (usize::BITS - 1 - read_chunk_small.leading_zeros())
        } else {
            self.read_chunk_align
        };
        if self.max_lines == Some(0) {
            return Err(Error::InvalidConfig("line limit must be positive".to_string()));
        }
        if matches!(&self.filter, Some(filter) if filter.is_empty()) {
            return Err(Error::InvalidConfig("filter must not be empty".to_string()));
        }

        Ok(Config {
            path: self.path,
            filter: self.filter,
            start,
            end,
            max_lines: self.max_lines,
            layout,
            read_chunk_small,
            read_chunk_large: self.read_chunk_large,
            read_chunk_align,
            debug: self.debug,
        })
    }
}
