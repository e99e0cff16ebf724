//! Chunked, cached, seekable byte source.
//!
//! Reads are positioned (`pread`), floor-aligned to the configured alignment
//! and go through a [`ChunkCache`]. Downstream stages steer the source only
//! through the [`Context`]: a pending seek or a behaviour switch takes effect
//! on the next `process` call.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use bytes::Bytes;

use super::cache::ChunkCache;
use super::{Behaviour, Context, Entry, Outcome, Stage, Step};
use crate::config::Config;
use crate::error::{Error, Result};

pub struct FileSource<'a> {
    config: &'a Config,
    file: Option<File>,
    size: u64,
    cursor: u64,
    chunk: usize,
    eof: bool,
    cache: ChunkCache,
}

impl<'a> FileSource<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            file: None,
            size: 0,
            cursor: 0,
            chunk: config.read_chunk_large(),
            eof: false,
            cache: ChunkCache::new(1, 0),
        }
    }

    fn apply_behaviour(&mut self, behaviour: Behaviour) {
        match behaviour {
            Behaviour::Sequential => {
                log::debug!("file: sequential access");
                self.chunk = self.config.read_chunk_large();
                if let Some(file) = &self.file {
                    if let Err(err) = read_ahead(file, self.size) {
                        log::debug!("file read ahead: {err}");
                    }
                }
            }
            Behaviour::Random => {
                log::debug!("file: random access");
                self.chunk = self.config.read_chunk_small();
            }
        }
    }
}

impl Stage for FileSource<'_> {
    fn name(&self) -> &'static str {
        "file"
    }

    /// Opens the file but reads nothing until a later stage asks for data.
    fn open(&mut self, ctx: &mut Context) -> Result<Outcome> {
        let path = self.config.path();
        let file = open_readonly(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.size = file.metadata()?.len();
        self.file = Some(file);
        self.cache = ChunkCache::new(1, self.config.read_chunk_large());
        ctx.source_opened(self.size);
        log::debug!("file open: {} ({})", path.display(), self.size);
        Ok(Outcome::Next)
    }

    fn close(&mut self, ctx: &mut Context) {
        self.file = None;
        let stats = ctx.stats_mut();
        stats.cache_hits = self.cache.hits();
        stats.cache_misses = self.cache.misses();
        log::debug!(
            "file: cache-hits:{}  cache-miss:{}",
            self.cache.hits(),
            self.cache.misses()
        );
    }

    fn process(&mut self, ctx: &mut Context, _entry: Entry) -> Result<Step> {
        if let Some(behaviour) = ctx.take_behaviour() {
            self.apply_behaviour(behaviour);
        }
        if let Some(offset) = ctx.take_seek() {
            log::debug!("file seek: {offset}");
            self.cursor = offset;
        } else if self.eof {
            // later stages didn't ask for new data
            return Ok(Step::done(Bytes::new()));
        }

        if self.cursor >= self.size {
            self.eof = true;
            ctx.source_advanced(self.cursor, true);
            return Ok(Step::done(Bytes::new()));
        }

        if let Some(chunk) = self.cache.find(self.cursor) {
            log::debug!("cache hit: {} @{}", chunk.data.len(), self.cursor);
            self.cursor += chunk.data.len() as u64;
            self.eof = chunk.eof;
            ctx.source_advanced(self.cursor, self.eof);
            return Ok(Step::next(chunk.data));
        }

        let file = self.file.as_ref().ok_or(Error::Chain("file source not opened"))?;
        let align = self.config.read_chunk_align() as u64;
        let origin = self.cursor & !(align - 1);
        let started = quanta::Instant::now();
        let slot = self.cache.next_slot();
        let read = slot.fill(origin, self.chunk, |buf| read_full_at(file, buf, origin))?;
        if read == 0 {
            return Err(Error::ShortRead { offset: origin });
        }
        let eof = read < self.chunk || origin + read as u64 >= self.size;
        slot.set_eof(eof);
        log::debug!(
            "file read: {} @{}({}%)  last:{}  {}us",
            read,
            origin,
            origin * 100 / self.size.max(1),
            eof,
            quanta::Instant::now().duration_since(started).as_micros()
        );

        let chunk = slot.view_from(self.cursor);
        self.cursor = origin + read as u64;
        self.eof = eof;
        ctx.source_advanced(self.cursor, eof);
        Ok(Step::next(chunk.data))
    }
}

#[cfg(target_os = "linux")]
fn open_readonly(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    match OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOATIME)
        .open(path)
    {
        // O_NOATIME is only allowed for the file owner.
        Err(err) if err.raw_os_error() == Some(libc::EPERM) => File::open(path),
        other => other,
    }
}

#[cfg(not(target_os = "linux"))]
fn open_readonly(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).open(path)
}

#[cfg(target_os = "linux")]
fn read_ahead(file: &File, size: u64) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let res = unsafe {
        libc::posix_fadvise(
            file.as_raw_fd(),
            0,
            size as libc::off_t,
            libc::POSIX_FADV_WILLNEED,
        )
    };
    if res != 0 {
        return Err(io::Error::from_raw_os_error(res));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn read_ahead(_file: &File, _size: u64) -> io::Result<()> {
    Ok(())
}

/// Fill `buf` from `offset`, stopping early only at end-of-file.
fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match read_at(file, &mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}
