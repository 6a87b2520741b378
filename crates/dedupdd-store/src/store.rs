//! The `Store` contract: fetch a chunk's bytes by id.
//!
//! Anything that can hand back chunk bytes implements `Store`. Callers work
//! with `&dyn Store` views, which never own the backend; the backend's owner
//! decides when it is dropped, and the borrow checker keeps it alive for as
//! long as any view exists.

use dedupdd_chunks::ChunkId;
use dedupdd_core::DedupResult;

pub trait Store {
    /// Human-readable name, e.g. `target:/dev/sdb`
    fn name(&self) -> &str;

    /// Copy the chunk named `id` into the front of `out`.
    ///
    /// Returns `Ok(None)` if this store does not know `id`, and
    /// `Ok(Some(len))` after writing exactly `len` bytes. If `out` is shorter
    /// than the chunk, fails with `DedupError::Capacity` without touching `out`.
    fn get_chunk(&self, id: &ChunkId, out: &mut [u8]) -> DedupResult<Option<usize>>;
}

/// Ordered set of borrowed stores, queried first to last.
#[derive(Default)]
pub struct StoreChain<'a> {
    stores: Vec<&'a dyn Store>,
}

impl<'a> StoreChain<'a> {
    pub fn new() -> Self {
        StoreChain { stores: Vec::new() }
    }

    pub fn push(&mut self, store: &'a dyn Store) -> &mut Self {
        self.stores.push(store);
        self
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Fetch `id` from the first store that has it, returning that store too.
    ///
    /// Errors from a store abort the lookup; later stores are not consulted.
    /// A non-seekable target that indexed `id` fails here, so keep those out
    /// of chains whose lookups must succeed.
    pub fn fetch(
        &self,
        id: &ChunkId,
        out: &mut [u8],
    ) -> DedupResult<Option<(usize, &'a dyn Store)>> {
        for store in &self.stores {
            if let Some(n) = store.get_chunk(id, out)? {
                tracing::trace!(store = store.name(), id = %id, bytes = n, "chunk found");
                return Ok(Some((n, *store)));
            }
        }
        Ok(None)
    }
}

impl Store for StoreChain<'_> {
    fn name(&self) -> &str {
        "chain"
    }

    fn get_chunk(&self, id: &ChunkId, out: &mut [u8]) -> DedupResult<Option<usize>> {
        Ok(self.fetch(id, out)?.map(|(n, _)| n))
    }
}
