//! Offset-indexed pool of read buffers.
//!
//! Each slot holds one chunk of the file. A slot's contents are handed out
//! as [`Bytes`] views; refilling a slot reuses its allocation only once
//! every view of the previous contents has been dropped, so a live view is
//! never overwritten.

use bytes::{Bytes, BytesMut};

/// A chunk found in the cache.
#[derive(Debug, Clone)]
pub struct CachedChunk {
    /// Bytes from the requested offset to the end of the chunk.
    pub data: Bytes,
    /// The chunk reaches the end of the file.
    pub eof: bool,
}

/// One cache entry.
#[derive(Debug)]
pub struct CacheSlot {
    data: Bytes,
    origin: Option<u64>,
    eof: bool,
    buf: BytesMut,
    capacity: usize,
}

impl CacheSlot {
    fn new(capacity: usize) -> Self {
        Self {
            data: Bytes::new(),
            origin: None,
            eof: false,
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    fn contains(&self, offset: u64) -> bool {
        match self.origin {
            Some(origin) => offset >= origin && offset < origin + self.data.len() as u64,
            None => false,
        }
    }

    /// Replace the slot contents with up to `len` bytes produced by `read`.
    ///
    /// `read` receives a zeroed buffer of `len` bytes and returns how many
    /// it filled. The slot is left empty on error.
    pub fn fill<F>(&mut self, origin: u64, len: usize, read: F) -> std::io::Result<usize>
    where
        F: FnOnce(&mut [u8]) -> std::io::Result<usize>,
    {
        self.data = Bytes::new();
        self.origin = None;
        self.eof = false;

        let len = len.min(self.capacity);
        self.buf.clear();
        self.buf.resize(len, 0);
        let filled = read(&mut self.buf[..len])?;
        self.buf.truncate(filled);
        self.data = self.buf.split().freeze();
        self.origin = Some(origin);
        Ok(filled)
    }

    pub fn set_eof(&mut self, eof: bool) {
        self.eof = eof;
    }

    /// View of the slot starting at `offset`.
    pub fn view_from(&self, offset: u64) -> CachedChunk {
        let start = match self.origin {
            Some(origin) if offset >= origin => ((offset - origin) as usize).min(self.data.len()),
            _ => 0,
        };
        CachedChunk {
            data: self.data.slice(start..),
            eof: self.eof,
        }
    }
}

/// Fixed pool of chunk buffers with round-robin eviction.
#[derive(Debug)]
pub struct ChunkCache {
    slots: Vec<CacheSlot>,
    next: usize,
    hits: u64,
    misses: u64,
}

impl ChunkCache {
    pub fn new(slots: usize, capacity: usize) -> Self {
        Self {
            slots: (0..slots.max(1)).map(|_| CacheSlot::new(capacity)).collect(),
            next: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Find a cached chunk containing `offset`.
    pub fn find(&mut self, offset: u64) -> Option<CachedChunk> {
        match self.slots.iter().find(|slot| slot.contains(offset)) {
            Some(slot) => {
                self.hits += 1;
                Some(slot.view_from(offset))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Pick the slot to evict for the next read.
    pub fn next_slot(&mut self) -> &mut CacheSlot {
        let idx = self.next;
        self.next = (self.next + 1) % self.slots.len();
        &mut self.slots[idx]
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
