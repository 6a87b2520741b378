//! BLAKE3 chunk identifiers
//!
//! A chunk is named by the BLAKE3 digest of its bytes. Two chunks with the
//! same `ChunkId` are treated as identical; byte equality is never re-checked.

use dedupdd_core::DedupResult;
use std::fmt;
use std::io::Read;

/// Width of a chunk identifier in bytes
pub const ID_LEN: usize = blake3::OUT_LEN;

/// Content identifier of a chunk, displayed as 64 hex chars
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId([u8; ID_LEN]);

#[derive(Debug, thiserror::Error)]
#[error("invalid chunk id '{input}': {reason}")]
pub struct HexError {
    input: String,
    reason: String,
}

impl ChunkId {
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        ChunkId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Lowercase hex form (64 chars)
    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }

    /// Parse a 64-char hex string
    pub fn from_hex(hex: &str) -> Result<Self, HexError> {
        blake3::Hash::from_hex(hex)
            .map(|h| ChunkId(*h.as_bytes()))
            .map_err(|e| HexError {
                input: hex.to_string(),
                reason: e.to_string(),
            })
    }
}

impl From<blake3::Hash> for ChunkId {
    fn from(hash: blake3::Hash) -> Self {
        ChunkId(*hash.as_bytes())
    }
}

impl AsRef<[u8]> for ChunkId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self.to_hex())
    }
}

/// Identify a chunk held in memory. Accepts empty input.
pub fn identify(data: &[u8]) -> ChunkId {
    blake3::hash(data).into()
}

/// Identify everything `reader` yields, without buffering it whole.
pub fn identify_reader<R: Read>(mut reader: R) -> DedupResult<ChunkId> {
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize().into())
}
