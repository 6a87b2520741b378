//! dedupdd-chunks: content-defined chunking and BLAKE3 chunk identifiers
//!
//! # Overview
//! - `blake3`: `ChunkId`, the fixed-width content identifier of a chunk
//! - `fastcdc`: content-defined chunking with stable boundaries under inserts

pub mod blake3;
pub mod fastcdc;

// Convenience re-exports for the most common operations
pub use crate::blake3::{identify, identify_reader, ChunkId, HexError, ID_LEN};
pub use crate::fastcdc::{
    chunk_data, chunk_slice, Chunk, ChunkSizes, Chunker, StreamChunk, DEFAULT_AVG_CHUNK_SIZE,
};
