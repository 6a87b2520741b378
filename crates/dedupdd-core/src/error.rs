use thiserror::Error;

pub type DedupResult<T> = Result<T, DedupError>;

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("output buffer too small ({available} bytes) for chunk of {needed} bytes")]
    Capacity { needed: usize, available: usize },

    #[error("write at offset {got} in non-seekable target currently at offset {expected}")]
    Ordering { expected: u64, got: u64 },

    #[error("index error: {0}")]
    Index(String),

    #[error("config error: {0}")]
    Config(String),
}
