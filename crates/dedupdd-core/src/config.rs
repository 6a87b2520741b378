use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{DedupError, DedupResult};

/// Top-level engine configuration (loaded from dedupdd.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub chunker: ChunkerConfig,
    pub target: TargetConfig,
}

/// Content-defined chunking parameters, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Smallest chunk the chunker may emit (except for a short final chunk)
    pub min_size: u32,
    /// Expected chunk length
    pub avg_size: u32,
    /// Hard upper bound on chunk length
    pub max_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Consult the target's own index on write and read (default: true).
    /// Disable while the target may be modified behind our back.
    pub queryable: bool,
    /// Compare the bytes already on the target before writing (default: false)
    pub read_before_write: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_size: 16 * 1024,  // 16KB
            avg_size: 64 * 1024,  // 64KB
            max_size: 256 * 1024, // 256KB
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            queryable: true,
            read_before_write: false,
        }
    }
}

impl ChunkerConfig {
    /// Reject size triples that cannot describe a chunker.
    ///
    /// Only the ordering is checked here; algorithm-specific bounds are
    /// enforced where the chunker is built.
    pub fn validate(&self) -> DedupResult<()> {
        if self.min_size == 0 {
            return Err(DedupError::Config("chunker.min_size must be non-zero".into()));
        }
        if self.min_size > self.avg_size || self.avg_size > self.max_size {
            return Err(DedupError::Config(format!(
                "chunker sizes must satisfy min <= avg <= max (got {}/{}/{})",
                self.min_size, self.avg_size, self.max_size
            )));
        }
        Ok(())
    }
}

impl DedupConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> DedupResult<Self> {
        let config: DedupConfig =
            toml::from_str(s).map_err(|e| DedupError::Config(e.to_string()))?;
        config.chunker.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = Self::from_toml_str(&raw)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            avg_size = config.chunker.avg_size,
            queryable = config.target.queryable,
            "loaded config"
        );
        Ok(config)
    }
}
