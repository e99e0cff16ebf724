//! Start-offset search.
//!
//! Binary search over byte offsets narrows the window `[start_off, end_off)`
//! whose left side holds lines before the start bound and whose right edge is
//! the earliest line known to be at or after it. Once the window is small, or
//! a probe fails to land inside it, a sequential scan from `start_off`
//! confirms the first qualifying line. The stage then hands everything from
//! that line onward to the next stage and retires.

use super::gather::GatherBuffer;
use super::{Behaviour, Context, Entry, Outcome, Stage, Step};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::timestamp::{Parsed, Timestamp, TimestampLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Pick the next offset and ask the file source for it.
    Probe,
    /// Skip to the start of the next line.
    SkipLine,
    /// Classify the line at the gather offset.
    Check,
    /// Gather the recorded boundary line, then finish.
    Boundary,
}

pub struct Locator<'a> {
    config: &'a Config,
    bound: Option<(Timestamp, TimestampLayout)>,
    gather: GatherBuffer,
    phase: Phase,
    start_off: u64,
    end_off: u64,
    prev_probe: Option<u64>,
    sequential: bool,
    jumps: u64,
    best_start: Option<(Timestamp, u64)>,
    best_end: Option<(Timestamp, u64)>,
    started: Option<quanta::Instant>,
}

impl<'a> Locator<'a> {
    pub fn new(config: &'a Config) -> Self {
        let bound = match (config.start(), config.layout()) {
            (Some(start), Some(layout)) => Some((start, *layout)),
            _ => None,
        };
        Self {
            config,
            bound,
            gather: GatherBuffer::new(),
            phase: Phase::Probe,
            start_off: 0,
            end_off: 0,
            prev_probe: None,
            sequential: false,
            jumps: 0,
            best_start: None,
            best_end: None,
            started: None,
        }
    }

    fn probe(&mut self, ctx: &mut Context) -> Result<()> {
        let small = self.config.read_chunk_small() as u64;
        let window = self.end_off.saturating_sub(self.start_off);
        let target = if self.sequential || window <= 2 * small {
            if !self.sequential {
                self.enter_sequential();
            }
            self.start_off
        } else {
            self.start_off + (window / 2).saturating_sub(small)
        };

        if self.prev_probe == Some(target) {
            return Err(self.not_found());
        }
        self.prev_probe = Some(target);
        self.gather.reset(target);
        if ctx.source_position() != target {
            ctx.seek(target);
            self.jumps += 1;
        }
        log::debug!(
            "locate: probe @{} window:[{}..{}) jumps:{}",
            target,
            self.start_off,
            self.end_off,
            self.jumps
        );

        self.phase = if target == 0 { Phase::Check } else { Phase::SkipLine };
        Ok(())
    }

    /// The scan only moves forward, so an earlier binary probe at
    /// `start_off` is not a repeat.
    fn enter_sequential(&mut self) {
        log::debug!("locate: sequential scan from @{}", self.start_off);
        self.sequential = true;
        self.prev_probe = None;
    }

    /// The window closed (or the file ended) before a scan confirmed a line.
    fn window_exhausted(&mut self, ctx: &mut Context) -> Result<Option<Step>> {
        if !self.sequential {
            self.enter_sequential();
            self.phase = Phase::Probe;
            return Ok(None);
        }
        let (timestamp, offset) = match self.best_end {
            Some(best) => best,
            None => return Err(self.not_found()),
        };
        if self.gather.offset() == offset {
            return Ok(Some(self.finish(ctx)));
        }
        log::debug!("locate: returning to boundary @{offset} ({timestamp})");
        self.gather.reset(offset);
        if ctx.source_position() != offset {
            ctx.seek(offset);
            self.jumps += 1;
        }
        self.phase = Phase::Boundary;
        Ok(Some(Step::prev()))
    }

    fn finish(&mut self, ctx: &mut Context) -> Step {
        ctx.set_behaviour(Behaviour::Sequential);
        let offset = self.gather.offset();
        let elapsed = self
            .started
            .map(|t| quanta::Instant::now().duration_since(t));
        let stats = ctx.stats_mut();
        stats.probes = self.jumps;
        stats.locate_time = elapsed;
        stats.start_offset = Some(offset);
        log::debug!(
            "locate: found start line @{} ({}) in {} jumps, {}us",
            offset,
            self.best_end.map(|(ts, _)| ts.to_string()).unwrap_or_default(),
            self.jumps,
            elapsed.unwrap_or_default().as_micros()
        );
        Step::done(self.gather.take_rest())
    }

    fn not_found(&self) -> Error {
        log::error!(
            "can't find start-time line: window:[{}..{}) last-before:{:?}",
            self.start_off,
            self.end_off,
            self.best_start.map(|(_, off)| off)
        );
        Error::StartNotFound
    }
}

impl Stage for Locator<'_> {
    fn name(&self) -> &'static str {
        "locator"
    }

    fn open(&mut self, ctx: &mut Context) -> Result<Outcome> {
        if self.bound.is_none() {
            return Ok(Outcome::Done);
        }
        self.start_off = 0;
        self.end_off = ctx.file_size();
        self.prev_probe = None;
        self.phase = Phase::Probe;
        self.started = self.config.debug().then(quanta::Instant::now);
        ctx.set_behaviour(Behaviour::Random);
        Ok(Outcome::Ready)
    }

    fn process(&mut self, ctx: &mut Context, entry: Entry) -> Result<Step> {
        let (start, layout) = self.bound.ok_or(Error::Chain("locator without a start bound"))?;
        let mut input = entry.into_bytes();

        loop {
            if self.phase == Phase::Probe {
                self.probe(ctx)?;
                return Ok(Step::prev());
            }

            let need = match self.phase {
                Phase::SkipLine => 1,
                _ => layout.width(),
            };
            let gathered = self.gather.gather(std::mem::take(&mut input), need);
            if gathered.partial {
                if !(ctx.source_exhausted() && self.gather.is_drained()) {
                    return Ok(Step::prev());
                }
                if self.phase == Phase::Boundary {
                    return Ok(self.finish(ctx));
                }
                match self.window_exhausted(ctx)? {
                    Some(step) => return Ok(step),
                    None => continue,
                }
            }

            match self.phase {
                Phase::SkipLine => match memchr::memchr(b'\n', &gathered.view) {
                    Some(idx) => {
                        self.gather.consume(idx + 1);
                        if self.gather.offset() >= self.end_off {
                            match self.window_exhausted(ctx)? {
                                Some(step) => return Ok(step),
                                None => continue,
                            }
                        }
                        self.phase = Phase::Check;
                    }
                    None => self.gather.discard(),
                },
                Phase::Check => {
                    let line_off = self.gather.offset();
                    match layout.parse(&gathered.view) {
                        Parsed::Matched { timestamp, .. } if timestamp < start => {
                            log::debug!("locate: @{line_off} {timestamp} before start");
                            self.start_off = line_off + 1;
                            self.best_start = Some((timestamp, line_off));
                            self.phase = if self.sequential {
                                Phase::SkipLine
                            } else {
                                Phase::Probe
                            };
                        }
                        Parsed::Matched { timestamp, .. } => {
                            log::debug!("locate: @{line_off} {timestamp} at or after start");
                            self.end_off = line_off;
                            self.best_end = Some((timestamp, line_off));
                            if self.sequential {
                                return Ok(self.finish(ctx));
                            }
                            self.phase = Phase::Probe;
                        }
                        // a line without a timestamp never decides the search
                        _ => self.phase = Phase::SkipLine,
                    }
                }
                Phase::Boundary => return Ok(self.finish(ctx)),
                Phase::Probe => {}
            }
        }
    }
}
