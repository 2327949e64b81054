//! Storage backends for the cached trust bundle.
//!
//! The cache uses file modification time as its staleness clock. Keeping
//! the filesystem behind [`BundleStore`] lets tests pin timestamps without
//! touching the real clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// Writer handed out by a store for streaming a download.
pub type BundleWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Metadata of a stored bundle file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Size in bytes.
    pub len: u64,
}

/// Minimal filesystem surface needed by the trust bundle cache.
#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Create a directory and all missing parents.
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Stat a file, returning `None` when it does not exist.
    async fn stat(&self, path: &Path) -> io::Result<Option<FileStat>>;

    /// Read a whole file.
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Open a file for writing, truncating previous content.
    async fn writer(&self, path: &Path) -> io::Result<BundleWriter>;

    /// Remove a file. Removing a missing file is not an error.
    async fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Real filesystem store backed by `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsBundleStore;

#[async_trait]
impl BundleStore for FsBundleStore {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn stat(&self, path: &Path) -> io::Result<Option<FileStat>> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(Some(FileStat {
                modified: DateTime::<Utc>::from(meta.modified()?),
                len: meta.len(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn writer(&self, path: &Path) -> io::Result<BundleWriter> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Box::new(file))
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    contents: Vec<u8>,
    modified: DateTime<Utc>,
}

/// In-memory store with caller-controlled timestamps.
///
/// Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryBundleStore {
    files: Arc<Mutex<HashMap<PathBuf, MemoryFile>>>,
    dirs: Arc<Mutex<Vec<PathBuf>>>,
}

impl MemoryBundleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a file with an explicit modification time.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>, modified: DateTime<Utc>) {
        self.files.lock().insert(
            path.into(),
            MemoryFile {
                contents: contents.into(),
                modified,
            },
        );
    }

    /// Current contents of a file, if present.
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().get(path).map(|f| f.contents.clone())
    }

    /// Whether a file exists.
    pub fn contains(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    /// Whether a directory was created.
    pub fn has_dir(&self, path: &Path) -> bool {
        self.dirs.lock().iter().any(|d| d == path)
    }
}

#[async_trait]
impl BundleStore for MemoryBundleStore {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut dirs = self.dirs.lock();
        if !dirs.iter().any(|d| d == path) {
            dirs.push(path.to_path_buf());
        }
        Ok(())
    }

    async fn stat(&self, path: &Path) -> io::Result<Option<FileStat>> {
        Ok(self.files.lock().get(path).map(|f| FileStat {
            modified: f.modified,
            len: f.contents.len() as u64,
        }))
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.contents(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    async fn writer(&self, path: &Path) -> io::Result<BundleWriter> {
        self.insert(path, Vec::new(), Utc::now());
        Ok(Box::new(MemoryWriter {
            files: Arc::clone(&self.files),
            path: path.to_path_buf(),
        }))
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        self.files.lock().remove(path);
        Ok(())
    }
}

/// Appends straight into the shared map so partial writes stay visible.
struct MemoryWriter {
    files: Arc<Mutex<HashMap<PathBuf, MemoryFile>>>,
    path: PathBuf,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut files = self.files.lock();
        let file = files.entry(self.path.clone()).or_insert_with(|| MemoryFile {
            contents: Vec::new(),
            modified: Utc::now(),
        });
        file.contents.extend_from_slice(buf);
        file.modified = Utc::now();
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
