//! Minimum-lookahead accumulator shared by the parsing stages.
//!
//! Parsing a timestamp or scanning for a newline needs a contiguous span of
//! at least `min_len` bytes. When the input already has that much, the
//! caller gets a zero-copy view of it. Only when a span straddles two inputs
//! are the leftover bytes and the start of the new input copied together.
//!
//! ```text
//! pending: [unconsumed bytes, starting at offset()]
//! queued:  [input not yet joined into pending]
//! ```

use bytes::{Buf, Bytes, BytesMut};

/// Outcome of [`GatherBuffer::gather`].
#[derive(Debug, Clone)]
pub struct Gathered {
    /// Unconsumed bytes starting at [`GatherBuffer::offset`].
    pub view: Bytes,
    /// Fewer than `min_len` bytes are available; supply more input.
    pub partial: bool,
}

#[derive(Debug, Default)]
pub struct GatherBuffer {
    pending: Bytes,
    queued: Bytes,
    scratch: BytesMut,
    offset: u64,
}

impl GatherBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// File offset of the first unconsumed byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// All handed-in input has been joined into the view.
    pub fn is_drained(&self) -> bool {
        self.queued.is_empty()
    }

    /// Take `input` and return a view of at least `min_len` bytes if possible.
    pub fn gather(&mut self, input: Bytes, min_len: usize) -> Gathered {
        if !input.is_empty() {
            if self.queued.is_empty() {
                self.queued = input;
            } else {
                let mut joined = BytesMut::with_capacity(self.queued.len() + input.len());
                joined.extend_from_slice(&self.queued);
                joined.extend_from_slice(&input);
                self.queued = joined.freeze();
            }
        }

        if self.pending.is_empty() {
            self.pending = std::mem::take(&mut self.queued);
        } else if self.pending.len() < min_len && !self.queued.is_empty() {
            // Grow by at least `min_len` so callers waiting on a longer span
            // make progress.
            let take = self.queued.len().min(min_len.max(1));
            self.scratch.clear();
            self.scratch.reserve(self.pending.len() + take);
            self.scratch.extend_from_slice(&self.pending);
            self.scratch.extend_from_slice(&self.queued[..take]);
            self.queued.advance(take);
            self.pending = self.scratch.split().freeze();
        }

        Gathered {
            view: self.pending.clone(),
            partial: self.pending.len() < min_len,
        }
    }

    /// Advance past `n` processed bytes of the view.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.pending.len(), "consume past gathered view");
        let n = n.min(self.pending.len());
        self.pending.advance(n);
        self.offset += n as u64;
    }

    /// Drop the whole view, keeping any queued input.
    pub fn discard(&mut self) {
        self.offset += self.pending.len() as u64;
        self.pending = Bytes::new();
    }

    /// Discard all state; the next input starts at `offset`.
    pub fn reset(&mut self, offset: u64) {
        self.pending = Bytes::new();
        self.queued = Bytes::new();
        self.scratch.clear();
        self.offset = offset;
    }

    /// Hand out every unconsumed byte, leaving the buffer empty.
    pub fn take_rest(&mut self) -> Bytes {
        let pending = std::mem::take(&mut self.pending);
        let queued = std::mem::take(&mut self.queued);
        self.offset += (pending.len() + queued.len()) as u64;
        if queued.is_empty() {
            pending
        } else if pending.is_empty() {
            queued
        } else {
            let mut joined = BytesMut::with_capacity(pending.len() + queued.len());
            joined.extend_from_slice(&pending);
            joined.extend_from_slice(&queued);
            joined.freeze()
        }
    }
}
