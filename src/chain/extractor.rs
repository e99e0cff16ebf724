//! Forward line scan with end-bound, content and line-count gating.

use memchr::memmem;

use super::gather::GatherBuffer;
use super::{Context, Entry, Outcome, Stage, Step};
use crate::config::Config;
use crate::error::Result;
use crate::timestamp::{Parsed, Timestamp, TimestampLayout};

/// What to do with the current view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Pass the first `len` bytes on; `finish` ends the extraction.
    Emit { len: usize, finish: bool },
    /// Drop the first `len` bytes.
    Skip(usize),
    /// Wait for a view of at least this many bytes.
    NeedMore(usize),
}

pub struct Extractor<'a> {
    end: Option<(Timestamp, TimestampLayout)>,
    filter: Option<&'a [u8]>,
    max_lines: Option<u64>,
    gather: GatherBuffer,
    base_need: usize,
    need: usize,
    /// The last emitted byte was not a line terminator.
    in_line: bool,
    lines: u64,
    emitted: u64,
}

impl<'a> Extractor<'a> {
    pub fn new(config: &'a Config) -> Self {
        let end = match (config.end(), config.layout()) {
            (Some(end), Some(layout)) => Some((end, *layout)),
            _ => None,
        };
        let base_need = end.map_or(1, |(_, layout)| layout.width());
        Self {
            end,
            filter: config.filter(),
            max_lines: config.max_lines(),
            gather: GatherBuffer::new(),
            base_need,
            need: base_need,
            in_line: false,
            lines: 0,
            emitted: 0,
        }
    }

    fn cap_reached(&self) -> bool {
        self.max_lines.map_or(false, |max| self.lines >= max)
    }

    fn accepts(&self, line: &[u8]) -> bool {
        match self.filter {
            Some(needle) => memmem::find(line, needle).is_some(),
            None => true,
        }
    }

    fn scan(&mut self, view: &[u8], exhausted: bool) -> Scan {
        let mut cursor = 0;
        loop {
            let rest = &view[cursor..];
            if rest.is_empty() {
                if exhausted {
                    return Scan::Emit { len: cursor, finish: true };
                }
                if cursor > 0 {
                    return Scan::Emit { len: cursor, finish: false };
                }
                return Scan::NeedMore(self.base_need);
            }

            let line_start = cursor > 0 || !self.in_line;
            if line_start {
                if let Some((end, layout)) = self.end {
                    match layout.parse(rest) {
                        Parsed::NeedMoreData if !exhausted => {
                            if cursor > 0 {
                                return Scan::Emit { len: cursor, finish: false };
                            }
                            return Scan::NeedMore(layout.width());
                        }
                        Parsed::Matched { timestamp, .. } if timestamp > end => {
                            log::debug!("extract: {timestamp} is past the end bound");
                            return Scan::Emit { len: cursor, finish: true };
                        }
                        _ => {}
                    }
                }
            }

            match memchr::memchr(b'\n', rest) {
                Some(idx) => {
                    if line_start {
                        if !self.accepts(&rest[..=idx]) {
                            if cursor > 0 {
                                return Scan::Emit { len: cursor, finish: false };
                            }
                            return Scan::Skip(idx + 1);
                        }
                        self.lines += 1;
                    }
                    self.in_line = false;
                    cursor += idx + 1;
                    if self.cap_reached() {
                        log::debug!("extract: line limit reached");
                        return Scan::Emit { len: cursor, finish: true };
                    }
                }
                None if exhausted => {
                    // unterminated last line of the file
                    if line_start {
                        if !self.accepts(rest) {
                            return Scan::Emit { len: cursor, finish: true };
                        }
                        self.lines += 1;
                    }
                    return Scan::Emit { len: view.len(), finish: true };
                }
                None if self.filter.is_some() => {
                    if cursor > 0 {
                        return Scan::Emit { len: cursor, finish: false };
                    }
                    return Scan::NeedMore(rest.len() + 1);
                }
                None => {
                    if line_start {
                        self.lines += 1;
                    }
                    self.in_line = true;
                    return Scan::Emit { len: view.len(), finish: false };
                }
            }
        }
    }
}

impl Stage for Extractor<'_> {
    fn name(&self) -> &'static str {
        "extractor"
    }

    fn open(&mut self, ctx: &mut Context) -> Result<Outcome> {
        if self.end.is_none() && self.max_lines.is_none() && self.filter.is_none() {
            return Ok(Outcome::Done);
        }
        self.gather.reset(ctx.stats().start_offset.unwrap_or(0));
        Ok(Outcome::Ready)
    }

    fn close(&mut self, ctx: &mut Context) {
        ctx.stats_mut().lines = self.lines;
    }

    fn process(&mut self, ctx: &mut Context, entry: Entry) -> Result<Step> {
        let mut input = entry.into_bytes();
        loop {
            let gathered = self.gather.gather(std::mem::take(&mut input), self.need);
            let exhausted = ctx.source_exhausted() && self.gather.is_drained();
            if gathered.partial && !exhausted {
                return Ok(Step::prev());
            }

            match self.scan(&gathered.view, exhausted) {
                Scan::Emit { len, finish } => {
                    self.need = self.base_need;
                    let output = gathered.view.slice(..len);
                    self.gather.consume(len);
                    self.emitted += len as u64;
                    if finish {
                        log::debug!(
                            "extract: done @{}  lines:{}  bytes:{}",
                            self.gather.offset(),
                            self.lines,
                            self.emitted
                        );
                        return Ok(Step::split(output));
                    }
                    return Ok(Step::next(output));
                }
                Scan::Skip(len) => {
                    self.need = self.base_need;
                    self.gather.consume(len);
                }
                Scan::NeedMore(len) => self.need = len,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Chain, FileSource, Locator, Sink};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const LOG: &[u8] = concat!(
        "2022-01-01 00:00:00 a\n",
        "2022-01-01 12:00:00 b\n",
        "    continued b\n",
        "2022-01-01 23:59:59 c\n",
        "2022-01-02 00:00:00 d\n",
        "2022-01-03 00:00:00 e\n",
    )
    .as_bytes();

    fn temp_file(data: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    fn extract(config: &Config) -> (Vec<u8>, u64) {
        let mut out = Vec::new();
        let mut chain = Chain::new()
            .stage(FileSource::new(config))
            .stage(Locator::new(config))
            .stage(Extractor::new(config))
            .stage(Sink::new(&mut out));
        chain.run().unwrap();
        let lines = chain.stats().lines;
        drop(chain);
        (out, lines)
    }

    fn builder(file: &NamedTempFile, chunk: usize) -> crate::config::ConfigBuilder {
        Config::builder(file.path())
            .read_chunk_small(chunk)
            .read_chunk_large(chunk)
            .read_chunk_align(chunk)
    }

    #[test]
    fn stops_before_first_line_past_end() {
        let file = temp_file(LOG);
        for chunk in [8, 16, 64, 4096] {
            let config = builder(&file, chunk).end("2022-01-01 23:59:59").build().unwrap();
            let (out, lines) = extract(&config);
            assert_eq!(
                out,
                &b"2022-01-01 00:00:00 a\n2022-01-01 12:00:00 b\n    continued b\n2022-01-01 23:59:59 c\n"[..],
                "chunk {chunk}"
            );
            assert_eq!(lines, 4);
        }
    }

    #[test]
    fn fixture_keeps_continuation_indent() {
        assert!(LOG
            .split_inclusive(|b| *b == b'\n')
            .any(|line| line == b"    continued b\n"));
    }

    #[test]
    fn line_limit_counts_physical_lines() {
        let file = temp_file(LOG);
        let config = builder(&file, 16).max_lines(2).build().unwrap();
        let (out, lines) = extract(&config);
        assert_eq!(out, &b"2022-01-01 00:00:00 a\n2022-01-01 12:00:00 b\n"[..]);
        assert_eq!(lines, 2);
    }

    #[test]
    fn filter_keeps_matching_lines_only() {
        let file = temp_file(LOG);
        for chunk in [8, 4096] {
            let config = builder(&file, chunk).filter("b\n").build().unwrap();
            let (out, lines) = extract(&config);
            assert_eq!(out, &b"2022-01-01 12:00:00 b\n    continued b\n"[..], "chunk {chunk}");
            assert_eq!(lines, 2);
        }
    }

    #[test]
    fn filter_and_limit_combine() {
        let file = temp_file(LOG);
        let config = builder(&file, 8).filter("2022-01-0").max_lines(3).build().unwrap();
        let (out, _) = extract(&config);
        assert_eq!(
            out,
            &b"2022-01-01 00:00:00 a\n2022-01-01 12:00:00 b\n2022-01-01 23:59:59 c\n"[..]
        );
    }

    #[test]
    fn unterminated_last_line_is_a_line() {
        let file = temp_file(b"2022-01-01 00:00:00 a\n2022-01-01 00:00:01 tail");
        let config = builder(&file, 8).max_lines(5).build().unwrap();
        let (out, lines) = extract(&config);
        assert_eq!(out, &b"2022-01-01 00:00:00 a\n2022-01-01 00:00:01 tail"[..]);
        assert_eq!(lines, 2);
    }

    #[test]
    fn short_trailing_fragment_does_not_end_the_scan() {
        let file = temp_file(b"2022-01-01 00:00:00 a\nxx");
        let config = builder(&file, 4096).end("2022-01-01 00:00:00").build().unwrap();
        let (out, _) = extract(&config);
        assert_eq!(out, &b"2022-01-01 00:00:00 a\nxx"[..]);
    }

    #[test]
    fn start_and_end_together() {
        let file = temp_file(LOG);
        let config = builder(&file, 16)
            .start("2022-01-01 12:00:00")
            .end("2022-01-02 00:00:00")
            .build()
            .unwrap();
        let (out, _) = extract(&config);
        assert_eq!(
            out,
            &b"2022-01-01 12:00:00 b\n    continued b\n2022-01-01 23:59:59 c\n2022-01-02 00:00:00 d\n"[..]
        );
    }
}
