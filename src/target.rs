use std::path::{Path, PathBuf};

use crate::error::FetchError;

/// HuggingFace mirror of the DSFD checkpoint; the original host is gone.
pub const MODEL_URL: &str =
    "https://huggingface.co/zixianma/mma/resolve/main/WIDERFace_DSFD_RES152.pth";

pub const MODEL_FILE_NAME: &str = "WIDERFace_DSFD_RES152.pth";

/// PyTorch hub checkpoint cache, relative to the home directory.
const CACHE_SUBDIR: [&str; 4] = [".cache", "torch", "hub", "checkpoints"];

const MIB: f64 = 1024.0 * 1024.0;

/// Where the checkpoint comes from and where it should end up.
#[derive(Debug, Clone)]
pub struct DownloadTarget {
    pub url: String,
    pub path: PathBuf,
}

impl DownloadTarget {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        DownloadTarget {
            url: url.into(),
            path: path.into(),
        }
    }

    /// The checkpoint location under the given home directory.
    pub fn under_home(home: &Path) -> Self {
        let dir = CACHE_SUBDIR.iter().fold(home.to_path_buf(), |p, c| p.join(c));
        DownloadTarget::new(MODEL_URL, dir.join(MODEL_FILE_NAME))
    }

    /// The checkpoint location under the current user's home directory.
    pub fn for_current_user() -> Result<Self, FetchError> {
        let home = home::home_dir().ok_or(FetchError::NoHomeDir)?;
        Ok(DownloadTarget::under_home(&home))
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    /// True when the destination already holds a regular file.
    pub fn present(&self) -> bool {
        self.path.is_file()
    }
}

/// Bytes to mebibytes, for display.
pub fn to_mib(bytes: u64) -> f64 {
    bytes as f64 / MIB
}
