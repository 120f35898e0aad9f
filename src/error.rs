use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while fetching the checkpoint.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server answered with HTTP {code}")]
    Status { code: u16 },

    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create temporary file: {0}")]
    TempFile(#[source] io::Error),

    #[error("failed to read response body: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write file: {0}")]
    Write(#[source] io::Error),

    #[error("download truncated: got {received} of {expected} bytes")]
    Truncated { expected: u64, received: u64 },

    #[error("failed to move download into place: {0}")]
    Persist(#[source] io::Error),

    #[error("file not found after download: {}", .path.display())]
    Missing { path: PathBuf },

    #[error("could not determine the home directory")]
    NoHomeDir,
}

impl FetchError {
    /// Transfer failures get the manual-download instructions; a missing file
    /// after a completed transfer is reported on its own.
    pub fn is_transfer_failure(&self) -> bool {
        !matches!(self, FetchError::Missing { .. })
    }
}
