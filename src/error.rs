use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogWindowError {
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("a window request is already in flight for session {0}")]
    Busy(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} shrank from {indexed} to {current} bytes", path.display())]
    FileShrank {
        path: PathBuf,
        indexed: u64,
        current: u64,
    },
}

impl LogWindowError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LogWindowError>;
