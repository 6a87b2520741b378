//! File-backed write target with a chunk index.
//!
//! A `Target` is where a sync writes chunks. It remembers where each chunk id
//! was written so the same bytes can later be served back through [`Store`],
//! and it can skip writes whose bytes are already on the medium.
//!
//! Two kinds of media are supported:
//!   - seekable (regular files, block devices): positioned reads and writes
//!   - non-seekable (pipes, `-` for standard output): strictly sequential
//!     appends, and no reads
//!
//! A non-seekable target still indexes what it writes, but it cannot read
//! anything back: `get_chunk` on an indexed id and `calc_chunk_id` fail with
//! an I/O error (`ESPIPE`). Do not put such a target in a [`StoreChain`]
//! unless lookups that reach it are allowed to fail.
//!
//! [`StoreChain`]: crate::store::StoreChain

use dedupdd_chunks::{identify, ChunkId, DEFAULT_AVG_CHUNK_SIZE};
use dedupdd_core::{DedupError, DedupResult, TargetConfig};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::{FileExt, FileTypeExt};
use std::path::Path;
use tracing::{debug, warn};

use crate::index::{capacity_estimate, Index};
use crate::store::Store;

/// Path token that binds a target to the process's standard output
pub const STDOUT_PATH: &str = "-";

/// Per-target operating mode, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetOptions {
    /// Use the index for lookups. When false every write goes to the medium
    /// and `get_chunk` reports every id as absent.
    pub queryable: bool,
    /// Default for [`Target::write_chunk`]: compare before writing
    pub read_before_write: bool,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            queryable: true,
            read_before_write: false,
        }
    }
}

impl From<&TargetConfig> for TargetOptions {
    fn from(cfg: &TargetConfig) -> Self {
        Self {
            queryable: cfg.queryable,
            read_before_write: cfg.read_before_write,
        }
    }
}

/// Counters over a target's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Write calls issued to the medium
    pub physical_writes: u64,
    pub bytes_written: u64,
    /// Writes elided because the medium already held the bytes
    pub skipped_writes: u64,
    pub bytes_skipped: u64,
    /// Chunks written but not indexed
    pub index_insert_failures: u64,
}

#[derive(Debug)]
pub struct Target {
    name: String,
    file: File,
    index: Index,
    seekable: bool,
    queryable: bool,
    read_before_write: bool,
    /// Next write offset; only meaningful when not seekable
    offset: u64,
    stats: WriteStats,
}

impl Target {
    /// Open `path` read/write, or bind to standard output for `-`.
    ///
    /// The file must already exist; it is neither created nor truncated.
    /// Writes to standard output bypass Rust's `Stdout` buffer.
    pub fn open(path: impl AsRef<Path>, options: TargetOptions) -> DedupResult<Self> {
        let path = path.as_ref();

        let file = if path.as_os_str() == STDOUT_PATH {
            File::from(std::io::stdout().as_fd().try_clone_to_owned()?)
        } else {
            OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| {
                    std::io::Error::new(
                        e.kind(),
                        format!("opening target '{}': {e}", path.display()),
                    )
                })?
        };

        Self::from_file(format!("target:{}", path.display()), file, options)
    }

    /// Wrap an already-open file. The target takes ownership of it.
    pub fn from_file(name: String, mut file: File, options: TargetOptions) -> DedupResult<Self> {
        let seekable = match file.seek(SeekFrom::Start(0)) {
            Ok(_) => true,
            Err(e) => {
                debug!(medium = %name, error = %e, "target is not seekable");
                false
            }
        };

        // Unknown size is not fatal: the index just starts small and grows.
        let estimate = match medium_size(&mut file) {
            Ok(size) => {
                let chunks = capacity_estimate(size, DEFAULT_AVG_CHUNK_SIZE);
                debug!(medium = %name, size, chunks, "initializing index with estimated chunk count");
                chunks
            }
            Err(e) => {
                warn!(medium = %name, error = %e, "could not determine target size");
                0
            }
        };

        let index = Index::with_capacity(estimate)
            .map_err(|e| DedupError::Index(format!("initializing index for {name}: {e}")))?;

        Ok(Target {
            name,
            file,
            index,
            seekable,
            queryable: options.queryable,
            read_before_write: options.read_before_write,
            offset: 0,
            stats: WriteStats::default(),
        })
    }

    /// Write a chunk using this target's configured read-before-write mode.
    pub fn write_chunk(&mut self, data: &[u8], offset: u64, id: &ChunkId) -> DedupResult<usize> {
        self.write(data, offset, id, self.read_before_write)
    }

    /// Write `data` (whose id is `id`) at `offset`.
    ///
    /// Returns the number of bytes written: `data.len()`, or 0 when
    /// `read_before_write` found identical bytes already in place. A
    /// non-seekable target only accepts `offset == self.offset()`.
    pub fn write(
        &mut self,
        data: &[u8],
        offset: u64,
        id: &ChunkId,
        read_before_write: bool,
    ) -> DedupResult<usize> {
        let already_there =
            self.queryable && self.seekable && read_before_write && self.holds(data, offset);

        let written = if already_there {
            self.stats.skipped_writes += 1;
            self.stats.bytes_skipped += data.len() as u64;
            debug!(medium = %self.name, offset, len = data.len(), "chunk unchanged, write skipped");
            0
        } else {
            self.write_medium(data, offset)?;
            data.len()
        };

        if self.queryable && self.index.query(id).is_none() {
            if let Err(e) = self.index.insert(offset, data.len(), *id) {
                self.stats.index_insert_failures += 1;
                warn!(medium = %self.name, id = %id, error = %e, "inserting chunk into index failed");
            }
        }

        Ok(written)
    }

    /// Read `length` bytes at `offset` from the medium and identify them.
    pub fn calc_chunk_id(&self, offset: u64, length: usize) -> DedupResult<(Vec<u8>, ChunkId)> {
        let mut buf = vec![0u8; length];
        self.file.read_exact_at(&mut buf, offset)?;
        let id = identify(&buf);
        Ok((buf, id))
    }

    /// Push written data to stable storage.
    pub fn flush(&mut self) -> DedupResult<()> {
        self.file.flush()?;
        if self.seekable {
            self.file.sync_data()?;
        }
        Ok(())
    }

    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    pub fn is_queryable(&self) -> bool {
        self.queryable
    }

    /// Next accepted write offset of a non-seekable target
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    /// True if the medium already holds exactly `data` at `offset`.
    fn holds(&self, data: &[u8], offset: u64) -> bool {
        let mut current = vec![0u8; data.len()];
        match self.file.read_exact_at(&mut current, offset) {
            Ok(()) => current == data,
            // Past the end of the medium: nothing to compare against yet.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!(medium = %self.name, offset, len = data.len(), "write extends past end of target");
                false
            }
            Err(e) => {
                warn!(medium = %self.name, offset, len = data.len(), error = %e, "reading target before write failed");
                false
            }
        }
    }

    fn write_medium(&mut self, data: &[u8], offset: u64) -> DedupResult<()> {
        if self.seekable {
            self.file.write_all_at(data, offset)?;
        } else {
            if offset != self.offset {
                return Err(DedupError::Ordering {
                    expected: self.offset,
                    got: offset,
                });
            }
            self.file.write_all(data)?;
            self.offset += data.len() as u64;
        }

        self.stats.physical_writes += 1;
        self.stats.bytes_written += data.len() as u64;
        Ok(())
    }
}

impl Store for Target {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_chunk(&self, id: &ChunkId, out: &mut [u8]) -> DedupResult<Option<usize>> {
        if !self.queryable {
            return Ok(None);
        }
        let Some(entry) = self.index.query(id) else {
            return Ok(None);
        };

        let len = entry.length as usize;
        if out.len() < len {
            return Err(DedupError::Capacity {
                needed: len,
                available: out.len(),
            });
        }

        self.file.read_exact_at(&mut out[..len], entry.start)?;
        Ok(Some(len))
    }
}

/// Size of the medium behind `file`. Block devices report a zero length in
/// their metadata, so they are measured by seeking to the end.
fn medium_size(file: &mut File) -> std::io::Result<u64> {
    let meta = file.metadata()?;
    if meta.file_type().is_block_device() {
        let end = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        return Ok(end);
    }
    Ok(meta.len())
}
