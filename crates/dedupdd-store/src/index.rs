//! In-memory chunk index: chunk id -> location on one backing medium.
//!
//! The index lives exactly as long as the target that owns it and is rebuilt
//! from a size estimate each time a target is opened. The estimate only
//! pre-sizes the table; it grows past it as needed.

use dedupdd_chunks::ChunkId;
use std::collections::hash_map::{HashMap, Values};
use std::collections::TryReserveError;

/// Reservation used when the caller's estimate cannot be honoured.
const FALLBACK_CAPACITY: usize = 1 << 16;

/// Where a chunk lives on the backing medium
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub start: u64,
    pub length: u32,
    pub id: ChunkId,
}

impl IndexEntry {
    /// One past the last byte of the chunk
    pub fn end(&self) -> u64 {
        self.start + u64::from(self.length)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index could not grow: {0}")]
    Exhausted(#[from] TryReserveError),

    #[error("chunk of {0} bytes does not fit a 32-bit index length")]
    ChunkTooLarge(usize),
}

#[derive(Debug, Default)]
pub struct Index {
    entries: HashMap<ChunkId, IndexEntry>,
}

/// Expected number of chunks on a medium of `size` bytes, with 20% headroom.
pub fn capacity_estimate(size: u64, avg_chunk_size: u32) -> usize {
    if avg_chunk_size == 0 {
        return 0;
    }
    let chunks = (u128::from(size) * 12).div_ceil(u128::from(avg_chunk_size) * 10);
    usize::try_from(chunks).unwrap_or(usize::MAX)
}

impl Index {
    /// Allocate a table for roughly `hint` entries.
    ///
    /// An unreasonable hint falls back to a modest reservation; only a failure
    /// of that fallback is reported.
    pub fn with_capacity(hint: usize) -> Result<Self, IndexError> {
        let mut entries = HashMap::new();
        if let Err(e) = entries.try_reserve(hint) {
            tracing::warn!(hint, error = %e, "index estimate rejected, using fallback size");
            entries.try_reserve(hint.min(FALLBACK_CAPACITY))?;
        }
        Ok(Index { entries })
    }

    pub fn query(&self, id: &ChunkId) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    /// Record `id` at `start..start + length`.
    ///
    /// If `id` is already known the existing entry is returned untouched, even
    /// when `start`/`length` differ.
    pub fn insert(
        &mut self,
        start: u64,
        length: usize,
        id: ChunkId,
    ) -> Result<&IndexEntry, IndexError> {
        if self.entries.contains_key(&id) {
            return Ok(&self.entries[&id]);
        }

        let length = u32::try_from(length).map_err(|_| IndexError::ChunkTooLarge(length))?;
        self.entries.try_reserve(1)?;

        Ok(self
            .entries
            .entry(id)
            .or_insert(IndexEntry { start, length, id }))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Entries in unspecified order
    pub fn iter(&self) -> Values<'_, ChunkId, IndexEntry> {
        self.entries.values()
    }
}
