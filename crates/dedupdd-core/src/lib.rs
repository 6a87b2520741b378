pub mod config;
pub mod error;

pub use config::{ChunkerConfig, DedupConfig, TargetConfig};
pub use error::{DedupError, DedupResult};
