use std::io::Write;

use super::{Context, Entry, Stage, Step};
use crate::error::Result;

/// Terminal stage: writes every byte it receives to `out`.
pub struct Sink<'a> {
    out: &'a mut dyn Write,
    total: u64,
}

impl<'a> Sink<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self { out, total: 0 }
    }
}

impl Stage for Sink<'_> {
    fn name(&self) -> &'static str {
        "sink"
    }

    fn process(&mut self, ctx: &mut Context, entry: Entry) -> Result<Step> {
        let data = entry.into_bytes();
        if !data.is_empty() {
            self.out.write_all(&data)?;
            self.total += data.len() as u64;
        }
        if !ctx.is_head() {
            return Ok(Step::prev());
        }
        self.out.flush()?;
        ctx.stats_mut().bytes_written = self.total;
        log::debug!("sink: written {} bytes", self.total);
        Ok(Step::fin())
    }
}
