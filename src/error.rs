use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("file open: {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("file read returned no data @{offset}")]
    ShortRead { offset: u64 },
    #[error("can't find start-time line")]
    StartNotFound,
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("chain protocol violation: {0}")]
    Chain(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
