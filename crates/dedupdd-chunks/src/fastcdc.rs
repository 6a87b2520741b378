//! FastCDC content-defined chunking
//!
//! Splits a byte stream into variable-size chunks whose boundaries are chosen
//! by a gear rolling hash over the most recent bytes. An edit only moves the
//! boundaries next to it; chunks further away keep their content and
//! therefore their ids, even when their offsets shift.
//!
//! Chunk size targets:
//!   - Default (block targets): min 16KB, avg 64KB, max 256KB
//!   - Small (tests, small files): min 2KB, avg 4KB, max 16KB
//!
//! Each chunk is content-addressed by its BLAKE3 id.

use dedupdd_core::{ChunkerConfig, DedupError, DedupResult};
use fastcdc::v2020::{
    FastCDC, StreamCDC, AVERAGE_MAX, AVERAGE_MIN, MAXIMUM_MAX, MAXIMUM_MIN, MINIMUM_MAX,
    MINIMUM_MIN,
};
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;

use crate::blake3::{identify, ChunkId};

/// Average chunk size assumed by callers that need an estimate without chunking.
pub const DEFAULT_AVG_CHUNK_SIZE: u32 = 64 * 1024;

/// A single content-defined chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset within the source stream
    pub offset: u64,
    /// Chunk length in bytes
    pub length: usize,
    /// BLAKE3 id of this chunk's data
    pub id: ChunkId,
}

impl Chunk {
    /// Byte range of this chunk within an in-memory source.
    pub fn range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.length
    }
}

/// A chunk produced from a `Read` source, carrying its bytes
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub offset: u64,
    pub id: ChunkId,
    pub data: Vec<u8>,
}

impl StreamChunk {
    pub fn chunk(&self) -> Chunk {
        Chunk {
            offset: self.offset,
            length: self.data.len(),
            id: self.id,
        }
    }
}

/// Chunk size configuration
///
/// Only obtainable through [`ChunkSizes::new`], `TryFrom<&ChunkerConfig>` or
/// the provided constants, so every value is one the chunker accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSizes {
    min_size: u32,
    avg_size: u32,
    max_size: u32,
}

impl ChunkSizes {
    /// Default for block targets
    pub const DEFAULT: ChunkSizes = ChunkSizes {
        min_size: 16 * 1024,             // 16KB
        avg_size: DEFAULT_AVG_CHUNK_SIZE, // 64KB
        max_size: 256 * 1024,            // 256KB
    };

    /// Small chunks, for short inputs
    pub const SMALL: ChunkSizes = ChunkSizes {
        min_size: 2 * 1024,  // 2KB
        avg_size: 4 * 1024,  // 4KB
        max_size: 16 * 1024, // 16KB
    };

    /// Build a size triple, rejecting values the chunker cannot run with.
    pub fn new(min_size: u32, avg_size: u32, max_size: u32) -> DedupResult<Self> {
        ChunkerConfig {
            min_size,
            avg_size,
            max_size,
        }
        .validate()?;

        check_bound("min_size", min_size, MINIMUM_MIN, MINIMUM_MAX)?;
        check_bound("avg_size", avg_size, AVERAGE_MIN, AVERAGE_MAX)?;
        check_bound("max_size", max_size, MAXIMUM_MIN, MAXIMUM_MAX)?;

        Ok(ChunkSizes {
            min_size,
            avg_size,
            max_size,
        })
    }

    pub fn min_size(&self) -> u32 {
        self.min_size
    }

    pub fn avg_size(&self) -> u32 {
        self.avg_size
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }
}

impl Default for ChunkSizes {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<&ChunkerConfig> for ChunkSizes {
    type Error = DedupError;

    fn try_from(cfg: &ChunkerConfig) -> DedupResult<Self> {
        ChunkSizes::new(cfg.min_size, cfg.avg_size, cfg.max_size)
    }
}

fn check_bound(name: &str, value: u32, lo: u32, hi: u32) -> DedupResult<()> {
    if value < lo || value > hi {
        return Err(DedupError::Config(format!(
            "chunker.{name} = {value} is outside the supported range {lo}..={hi}"
        )));
    }
    Ok(())
}

/// Lazily split `data` into content-defined chunks.
///
/// Empty data yields no chunks; data shorter than `min_size` yields one.
/// Calling again on the same slice restarts from the beginning.
pub fn chunk_slice(data: &[u8], sizes: ChunkSizes) -> impl Iterator<Item = Chunk> + '_ {
    FastCDC::new(data, sizes.min_size, sizes.avg_size, sizes.max_size).map(move |c| Chunk {
        offset: c.offset as u64,
        length: c.length,
        id: identify(&data[c.offset..c.offset + c.length]),
    })
}

/// Split `data` into content-defined chunks, collected.
pub fn chunk_data(data: &[u8], sizes: ChunkSizes) -> Vec<Chunk> {
    if data.is_empty() {
        return vec![];
    }
    chunk_slice(data, sizes).collect()
}

/// Streaming chunker over any `Read` source.
///
/// Holds at most `max_size` bytes of the source in memory. Read failures are
/// yielded once as `DedupError::Io`; the iterator is exhausted afterwards.
pub struct Chunker<R: Read> {
    inner: StreamCDC<R>,
    sizes: ChunkSizes,
    failed: bool,
}

impl<R: Read> Chunker<R> {
    pub fn new(source: R, sizes: ChunkSizes) -> Self {
        Chunker {
            inner: StreamCDC::new(source, sizes.min_size, sizes.avg_size, sizes.max_size),
            sizes,
            failed: false,
        }
    }

    pub fn sizes(&self) -> ChunkSizes {
        self.sizes
    }
}

impl<R: Read + Seek> Chunker<R> {
    /// Position `source` at offset 0 and chunk it from there.
    pub fn from_start(mut source: R, sizes: ChunkSizes) -> DedupResult<Self> {
        source.seek(SeekFrom::Start(0))?;
        Ok(Self::new(source, sizes))
    }
}

impl<R: Read> Iterator for Chunker<R> {
    type Item = DedupResult<StreamChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.inner.next()? {
            Ok(c) => Some(Ok(StreamChunk {
                offset: c.offset,
                id: identify(&c.data),
                data: c.data,
            })),
            Err(e) => {
                self.failed = true;
                let err = std::io::Error::from(e);
                tracing::debug!(error = %err, "chunker source failed");
                Some(Err(DedupError::Io(err)))
            }
        }
    }
}
