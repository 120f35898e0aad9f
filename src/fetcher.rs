use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::FetchError;
use crate::source::{Response, Source};
use crate::target::DownloadTarget;

const CHUNK_SIZE: usize = 64 * 1024;

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    AlreadyPresent { size_bytes: u64 },
    Downloaded { size_bytes: u64 },
}

impl Outcome {
    pub fn size_bytes(&self) -> u64 {
        match *self {
            Outcome::AlreadyPresent { size_bytes } | Outcome::Downloaded { size_bytes } => size_bytes,
        }
    }
}

pub struct Fetcher<S> {
    source: S,
}

impl<S: Source> Fetcher<S> {
    pub fn new(source: S) -> Self {
        Fetcher { source }
    }

    /// Makes sure the target file is on disk, downloading it if needed.
    ///
    /// # Arguments
    ///
    /// * `target` - The URL to fetch and the path to store it at.
    /// * `on_progress` - Called after every chunk with the bytes written so far
    ///   and the total from `Content-Length`, if the server sent one.
    ///
    /// # Returns
    ///
    /// `Outcome::AlreadyPresent` without touching the network when the file
    /// exists, `Outcome::Downloaded` once a fresh copy is verified on disk.
    pub fn fetch<F>(&self, target: &DownloadTarget, on_progress: F) -> Result<Outcome, FetchError>
    where
        F: FnMut(u64, Option<u64>),
    {
        if let Ok(size_bytes) = verify(&target.path) {
            log::info!("{} already present ({} bytes)", target.path.display(), size_bytes);
            return Ok(Outcome::AlreadyPresent { size_bytes });
        }

        let written = self.transfer(target, on_progress)?;
        let size_bytes = verify(&target.path)?;
        if size_bytes != written {
            log::warn!(
                "{} is {} bytes but {} were written",
                target.path.display(),
                size_bytes,
                written
            );
        }

        Ok(Outcome::Downloaded { size_bytes })
    }

    /// Streams the URL into a temporary file next to the destination and
    /// renames it into place once the body has been fully read.
    fn transfer<F>(&self, target: &DownloadTarget, mut on_progress: F) -> Result<u64, FetchError>
    where
        F: FnMut(u64, Option<u64>),
    {
        let dir = target.cache_dir().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|source| FetchError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let Response {
            mut body,
            content_length,
        } = self.source.open(&target.url)?;

        let mut part = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(FetchError::TempFile)?;
        log::debug!("streaming into {}", part.path().display());

        let written = copy_chunks(&mut body, &mut part, content_length, &mut on_progress)?;
        if let Some(expected) = content_length {
            if written < expected {
                return Err(FetchError::Truncated {
                    expected,
                    received: written,
                });
            }
        }

        persist(part, &target.path)?;
        log::info!("wrote {} bytes to {}", written, target.path.display());
        Ok(written)
    }
}

fn copy_chunks<R, F>(
    body: &mut R,
    out: &mut NamedTempFile,
    total: Option<u64>,
    on_progress: &mut F,
) -> Result<u64, FetchError>
where
    R: Read,
    F: FnMut(u64, Option<u64>),
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;
    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FetchError::Read(e)),
        };
        out.write_all(&buf[..n]).map_err(FetchError::Write)?;
        written += n as u64;
        on_progress(written, total);
    }
    out.flush().map_err(FetchError::Write)?;
    Ok(written)
}

fn persist(part: NamedTempFile, path: &Path) -> Result<(), FetchError> {
    part.as_file().sync_all().map_err(FetchError::Write)?;
    part.persist(path).map_err(|e| FetchError::Persist(e.error))?;
    Ok(())
}

/// Size of the file at `path`, or `FetchError::Missing` if there is no
/// regular file there.
pub fn verify(path: &Path) -> Result<u64, FetchError> {
    fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .ok_or_else(|| FetchError::Missing {
            path: path.to_path_buf(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::{self, Cursor};

    use crate::target::MODEL_URL;

    struct MemorySource {
        data: Vec<u8>,
        content_length: Option<u64>,
        opened: Cell<usize>,
    }

    impl MemorySource {
        fn new(data: &[u8]) -> Self {
            MemorySource {
                data: data.to_vec(),
                content_length: Some(data.len() as u64),
                opened: Cell::new(0),
            }
        }
    }

    impl Source for &MemorySource {
        type Body = Cursor<Vec<u8>>;

        fn open(&self, _url: &str) -> Result<Response<Self::Body>, FetchError> {
            self.opened.set(self.opened.get() + 1);
            Ok(Response {
                body: Cursor::new(self.data.clone()),
                content_length: self.content_length,
            })
        }
    }

    struct Unreachable;

    impl Source for Unreachable {
        type Body = io::Empty;

        fn open(&self, _url: &str) -> Result<Response<Self::Body>, FetchError> {
            Err(FetchError::Status { code: 503 })
        }
    }

    /// Yields some bytes, then a read error.
    struct Broken(usize);

    impl Read for Broken {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0 == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"));
            }
            let n = self.0.min(buf.len());
            buf[..n].fill(7);
            self.0 -= n;
            Ok(n)
        }
    }

    struct BrokenSource;

    impl Source for BrokenSource {
        type Body = Broken;

        fn open(&self, _url: &str) -> Result<Response<Self::Body>, FetchError> {
            Ok(Response {
                body: Broken(100),
                content_length: Some(1000),
            })
        }
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn existing_file_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pth");
        fs::write(&path, b"0123456789").unwrap();

        let source = MemorySource::new(b"fresh bytes");
        let fetcher = Fetcher::new(&source);
        let outcome = fetcher
            .fetch(&DownloadTarget::new(MODEL_URL, &path), |_, _| panic!("no progress expected"))
            .unwrap();

        assert_eq!(outcome, Outcome::AlreadyPresent { size_bytes: 10 });
        assert_eq!(source.opened.get(), 0);
        assert_eq!(fs::read(&path).unwrap(), b"0123456789");
    }

    #[test]
    fn creates_missing_directories_and_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c/model.pth");
        let data: Vec<u8> = (0..200_000u32).map(|i| i as u8).collect();

        let source = MemorySource::new(&data);
        let mut calls = Vec::new();
        let outcome = Fetcher::new(&source)
            .fetch(&DownloadTarget::new(MODEL_URL, &path), |done, total| calls.push((done, total)))
            .unwrap();

        assert_eq!(outcome, Outcome::Downloaded { size_bytes: 200_000 });
        assert_eq!(fs::read(&path).unwrap(), data);
        assert_eq!(source.opened.get(), 1);

        // 200_000 bytes in 64 KiB chunks.
        assert_eq!(calls.len(), 4);
        assert!(calls.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(calls.last(), Some(&(200_000, Some(200_000))));
        assert_eq!(leftovers(path.parent().unwrap()), vec!["model.pth".to_string()]);
    }

    #[test]
    fn unknown_length_is_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pth");
        let mut source = MemorySource::new(b"abc");
        source.content_length = None;

        let mut last = None;
        Fetcher::new(&source)
            .fetch(&DownloadTarget::new(MODEL_URL, &path), |done, total| last = Some((done, total)))
            .unwrap();
        assert_eq!(last, Some((3, None)));
    }

    #[test]
    fn empty_body_still_produces_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pth");
        let source = MemorySource::new(b"");

        let outcome = Fetcher::new(&source)
            .fetch(&DownloadTarget::new(MODEL_URL, &path), |_, _| {})
            .unwrap();
        assert_eq!(outcome, Outcome::Downloaded { size_bytes: 0 });
        assert!(path.is_file());
    }

    #[test]
    fn network_failure_still_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        let path = cache.join("model.pth");

        let err = Fetcher::new(Unreachable)
            .fetch(&DownloadTarget::new(MODEL_URL, &path), |_, _| {})
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { code: 503 }));
        assert!(err.is_transfer_failure());
        assert!(cache.is_dir());
        assert!(!path.exists());
    }

    #[test]
    fn read_error_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pth");

        let err = Fetcher::new(BrokenSource)
            .fetch(&DownloadTarget::new(MODEL_URL, &path), |_, _| {})
            .unwrap_err();

        assert!(matches!(err, FetchError::Read(_)));
        assert!(!path.exists());
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn short_body_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pth");
        let mut source = MemorySource::new(b"abc");
        source.content_length = Some(10);

        let err = Fetcher::new(&source)
            .fetch(&DownloadTarget::new(MODEL_URL, &path), |_, _| {})
            .unwrap_err();

        assert!(matches!(err, FetchError::Truncated { expected: 10, received: 3 }));
        assert!(!path.exists());
    }

    #[test]
    fn destination_directory_is_not_treated_as_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pth");
        fs::create_dir(&path).unwrap();
        let source = MemorySource::new(b"abc");

        let err = Fetcher::new(&source)
            .fetch(&DownloadTarget::new(MODEL_URL, &path), |_, _| {})
            .unwrap_err();

        assert_eq!(source.opened.get(), 1);
        assert!(matches!(err, FetchError::Persist(_)));
    }

    #[test]
    fn verify_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pth");

        let err = verify(&path).unwrap_err();
        assert!(matches!(err, FetchError::Missing { .. }));
        assert!(!err.is_transfer_failure());

        fs::write(&path, b"12345").unwrap();
        assert_eq!(verify(&path).unwrap(), 5);
    }
}
