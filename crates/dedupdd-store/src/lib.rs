//! dedupdd-store: chunk index, the `Store` contract, and file-backed targets

pub mod index;
pub mod store;
pub mod target;

pub use index::{capacity_estimate, Index, IndexEntry, IndexError};
pub use store::{Store, StoreChain};
pub use target::{Target, TargetOptions, WriteStats, STDOUT_PATH};
