//! Bidirectional stage chain.
//!
//! The engine calls the stage at its cursor. A stage's [`Outcome`] moves the
//! cursor forward (its output becomes the next stage's input), backward (it
//! needs more bytes from the previous stage), retires stages, or stops the
//! chain. Bytes only ever flow forward; demand flows backward.
//!
//! ```text
//!   File ──Next──▶ Locator ──Done──▶ Extractor ──Next──▶ Sink
//!     ▲               │                  │                 │
//!     └──────Prev─────┘◀──────Prev───────┘◀──────Prev──────┘
//! ```
//!
//! A retired stage is closed and removed the next time traversal moves
//! backward through it. Every opened stage is closed exactly once, in chain
//! order, whether the chain finishes or fails.

use std::fmt;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::extract::ExtractStats;

pub mod cache;
pub mod extractor;
pub mod file;
pub mod gather;
pub mod locator;
pub mod sink;

pub use cache::{CacheSlot, CachedChunk, ChunkCache};
pub use extractor::Extractor;
pub use file::FileSource;
pub use gather::{GatherBuffer, Gathered};
pub use locator::Locator;
pub use sink::Sink;

/// What a stage asks the engine to do after `open` or `process`.
///
/// Failures are reported through `Result::Err` and stop the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `open` succeeded; process the stage.
    Ready,
    /// Output is ready for the next stage.
    Next,
    /// More input is needed from the previous stage.
    Prev,
    /// Finished; the output still flows forward once.
    Done,
    /// Finished, and no earlier stage will be asked again.
    Split,
    /// The chain completed successfully.
    Fin,
}

/// How a stage is being entered.
#[derive(Debug, Clone)]
pub enum Entry {
    /// Moving forward with the previous stage's output.
    Fresh(Bytes),
    /// Moving forward after this stage returned `Prev`; the bytes continue
    /// whatever the stage has buffered.
    Resumed(Bytes),
    /// A later stage returned `Prev`; no new input.
    Backward,
}

impl Entry {
    pub fn into_bytes(self) -> Bytes {
        match self {
            Entry::Fresh(data) | Entry::Resumed(data) => data,
            Entry::Backward => Bytes::new(),
        }
    }

    fn describe(&self) -> (&'static str, usize) {
        match self {
            Entry::Fresh(data) => (">>", data.len()),
            Entry::Resumed(data) => (">>+", data.len()),
            Entry::Backward => ("<<", 0),
        }
    }
}

/// Result of one `process` call.
#[derive(Debug, Clone)]
pub struct Step {
    pub outcome: Outcome,
    pub output: Bytes,
}

impl Step {
    pub fn next(output: Bytes) -> Self {
        Self { outcome: Outcome::Next, output }
    }

    pub fn prev() -> Self {
        Self { outcome: Outcome::Prev, output: Bytes::new() }
    }

    pub fn done(output: Bytes) -> Self {
        Self { outcome: Outcome::Done, output }
    }

    pub fn split(output: Bytes) -> Self {
        Self { outcome: Outcome::Split, output }
    }

    pub fn fin() -> Self {
        Self { outcome: Outcome::Fin, output: Bytes::new() }
    }
}

/// Read pattern hint for the file source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Large chunks plus a read-ahead advisory.
    Sequential,
    /// Small chunks, no advisory.
    Random,
}

/// One unit of the pipeline.
pub trait Stage {
    fn name(&self) -> &'static str;

    /// Prepare the stage. `Done` or `Next` skip it, forwarding the input
    /// unchanged.
    fn open(&mut self, _ctx: &mut Context) -> Result<Outcome> {
        Ok(Outcome::Ready)
    }

    fn close(&mut self, _ctx: &mut Context) {}

    fn process(&mut self, ctx: &mut Context, entry: Entry) -> Result<Step>;
}

/// Requests to and reports from the file source.
#[derive(Debug, Default)]
struct SourceState {
    size: u64,
    position: u64,
    seek: Option<u64>,
    behaviour: Option<Behaviour>,
    eof: bool,
}

/// State shared by all stages of one chain run.
#[derive(Debug, Default)]
pub struct Context {
    source: SourceState,
    head: bool,
    stats: ExtractStats,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stage being called is the logical first active stage.
    pub fn is_head(&self) -> bool {
        self.head
    }

    /// Size of the input file, known once the file source has opened.
    pub fn file_size(&self) -> u64 {
        self.source.size
    }

    /// Offset the file source will read from next.
    pub fn source_position(&self) -> u64 {
        self.source.seek.unwrap_or(self.source.position)
    }

    /// The most recent file view ends at end-of-file.
    pub fn source_exhausted(&self) -> bool {
        self.source.eof && self.source.seek.is_none()
    }

    /// Ask the file source to continue from `offset` on its next call.
    pub fn seek(&mut self, offset: u64) {
        self.source.seek = Some(offset);
    }

    /// Ask the file source to switch read pattern on its next call.
    pub fn set_behaviour(&mut self, behaviour: Behaviour) {
        self.source.behaviour = Some(behaviour);
    }

    pub fn stats(&self) -> &ExtractStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut ExtractStats {
        &mut self.stats
    }

    pub(crate) fn source_opened(&mut self, size: u64) {
        self.source.size = size;
    }

    pub(crate) fn take_seek(&mut self) -> Option<u64> {
        self.source.seek.take()
    }

    pub(crate) fn take_behaviour(&mut self) -> Option<Behaviour> {
        self.source.behaviour.take()
    }

    pub(crate) fn source_advanced(&mut self, position: u64, eof: bool) {
        self.source.position = position;
        self.source.eof = eof;
    }
}

struct Slot<'a> {
    stage: Box<dyn Stage + 'a>,
    opened: bool,
    closed: bool,
    retired: bool,
    /// Last `process` returned `Prev`.
    awaiting: bool,
}

impl fmt::Debug for Slot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("stage", &self.stage.name())
            .field("opened", &self.opened)
            .field("retired", &self.retired)
            .finish()
    }
}

/// Ordered stages plus the traversal cursor.
#[derive(Debug)]
pub struct Chain<'a> {
    slots: Vec<Slot<'a>>,
    cursor: usize,
    backward: bool,
    ctx: Context,
}

impl<'a> Default for Chain<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Chain<'a> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            cursor: 0,
            backward: false,
            ctx: Context::new(),
        }
    }

    /// Append a stage.
    pub fn stage<S: Stage + 'a>(mut self, stage: S) -> Self {
        self.slots.push(Slot {
            stage: Box::new(stage),
            opened: false,
            closed: false,
            retired: false,
            awaiting: false,
        });
        self
    }

    /// Drive the chain until a stage returns `Fin` or fails, then close
    /// every stage that is still open.
    pub fn run(&mut self) -> Result<()> {
        let result = self.drive();
        self.close_all();
        result
    }

    fn drive(&mut self) -> Result<()> {
        if self.slots.is_empty() {
            return Err(Error::Chain("empty chain"));
        }
        self.cursor = 0;
        self.backward = false;
        self.ctx.head = true;
        let mut input: Option<Bytes> = None;

        loop {
            let i = self.cursor;
            let slot = &mut self.slots[i];

            let mut skipped = None;
            if !slot.opened {
                slot.opened = true;
                log::debug!("stage '{}': opening", slot.stage.name());
                match slot.stage.open(&mut self.ctx)? {
                    Outcome::Ready => {}
                    outcome @ (Outcome::Done | Outcome::Next) => {
                        skipped = Some(Step {
                            outcome,
                            output: input.take().unwrap_or_default(),
                        });
                    }
                    _ => return Err(Error::Chain("open must return Ready, Next or Done")),
                }
            }

            let step = match skipped {
                Some(step) => step,
                None if slot.retired => {
                    if !self.backward {
                        return Err(Error::Chain("retired stage reached moving forward"));
                    }
                    self.remove(i);
                    if self.slots.is_empty() {
                        return Err(Error::Chain("chain drained without finishing"));
                    }
                    if i > 0 {
                        self.cursor -= 1;
                        if self.cursor == 0 {
                            self.ctx.head = true;
                        }
                    } else {
                        self.backward = false;
                        self.ctx.head = true;
                    }
                    continue;
                }
                None => {
                    let entry = match input.take() {
                        Some(data) if slot.awaiting => Entry::Resumed(data),
                        Some(data) => Entry::Fresh(data),
                        None => Entry::Backward,
                    };
                    let (dir, len) = entry.describe();
                    log::trace!(
                        "stage '{}': {} calling in:{} head:{}",
                        slot.stage.name(),
                        dir,
                        len,
                        self.ctx.head
                    );
                    let step = slot.stage.process(&mut self.ctx, entry)?;
                    log::trace!(
                        "stage '{}' returned {:?} out:{}",
                        slot.stage.name(),
                        step.outcome,
                        step.output.len()
                    );
                    slot.awaiting = step.outcome == Outcome::Prev;
                    step
                }
            };

            match step.outcome {
                Outcome::Prev => {
                    if i == 0 {
                        return Err(Error::Chain("Prev returned by the chain head"));
                    }
                    self.backward = true;
                    self.cursor -= 1;
                    if self.cursor == 0 {
                        self.ctx.head = true;
                    }
                }
                Outcome::Next | Outcome::Done | Outcome::Split => {
                    if step.outcome == Outcome::Split {
                        for earlier in &mut self.slots[..i] {
                            earlier.retired = true;
                        }
                        self.ctx.head = true;
                    }
                    let retired = step.outcome != Outcome::Next;
                    if retired {
                        self.slots[i].retired = true;
                    }
                    self.backward = false;
                    if !(retired && self.ctx.head) {
                        self.ctx.head = false;
                    }
                    input = Some(step.output);
                    self.cursor += 1;
                    if self.cursor >= self.slots.len() {
                        return Err(Error::Chain("output past the end of the chain"));
                    }
                }
                Outcome::Fin => return Ok(()),
                Outcome::Ready => return Err(Error::Chain("process returned Ready")),
            }
        }
    }

    fn remove(&mut self, i: usize) {
        self.close_slot(i);
        let slot = self.slots.remove(i);
        log::debug!("stage '{}': removing", slot.stage.name());
    }

    fn close_slot(&mut self, i: usize) {
        let slot = &mut self.slots[i];
        if slot.opened && !slot.closed {
            slot.closed = true;
            log::debug!("stage '{}': closing", slot.stage.name());
            slot.stage.close(&mut self.ctx);
        }
    }

    fn close_all(&mut self) {
        for i in 0..self.slots.len() {
            self.close_slot(i);
        }
    }

    /// Statistics gathered so far; complete once `run` has returned.
    pub fn stats(&self) -> &ExtractStats {
        self.ctx.stats()
    }
}

impl Drop for Chain<'_> {
    fn drop(&mut self) {
        self.close_all();
    }
}
