//! Time-bounded cache of the RDS certificate bundle.

use super::source::{BundleSource, HttpBundleSource};
use super::store::{BundleStore, FsBundleStore};
use crate::constants::{
    BUNDLE_VALIDITY_DAYS, PEM_BEGIN_MARKER, PEM_END_MARKER, RDS_BUNDLE_FILE, RDS_BUNDLE_URL,
    RDS_CERT_DIR,
};
use crate::error::TrustBundleError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Check that a bundle holds at least one complete PEM certificate.
pub fn is_valid_pem(contents: &[u8]) -> bool {
    let text = String::from_utf8_lossy(contents);
    text.contains(PEM_BEGIN_MARKER) && text.contains(PEM_END_MARKER)
}

/// Diagnostic snapshot of the cached bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustBundleStatus {
    /// Cache file location.
    pub path: String,
    /// Whether the file exists.
    pub exists: bool,
    /// Whole days since the last download.
    pub age_days: Option<i64>,
    /// Whole days left in the validity window.
    pub days_until_expiry: Option<i64>,
    /// Whether the next resolution would re-download.
    pub expired: bool,
    /// File size in bytes.
    pub size_bytes: Option<u64>,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
}

enum CachedState {
    Fresh,
    Missing,
    Expired { age_days: i64 },
}

/// Trust bundle cache for a single process.
///
/// The resolved path is memoized on the instance. The async mutex around it
/// is held for the whole acquisition, so concurrent callers on one instance
/// serialize and at most one download runs.
pub struct TrustBundleCache {
    store: Arc<dyn BundleStore>,
    source: Arc<dyn BundleSource>,
    dir: PathBuf,
    path: PathBuf,
    url: String,
    validity: chrono::Duration,
    resolved: Mutex<Option<PathBuf>>,
}

impl TrustBundleCache {
    /// Create a cache rooted at `base_dir` with explicit backends.
    pub fn new(
        base_dir: impl AsRef<Path>,
        store: Arc<dyn BundleStore>,
        source: Arc<dyn BundleSource>,
    ) -> Self {
        let dir = base_dir.as_ref().join(RDS_CERT_DIR);
        let path = dir.join(RDS_BUNDLE_FILE);

        Self {
            store,
            source,
            dir,
            path,
            url: RDS_BUNDLE_URL.to_string(),
            validity: chrono::Duration::days(BUNDLE_VALIDITY_DAYS),
            resolved: Mutex::new(None),
        }
    }

    /// Production cache: real filesystem and HTTPS download.
    pub fn rds(base_dir: impl AsRef<Path>, download_timeout: Duration) -> Result<Self, TrustBundleError> {
        let source = HttpBundleSource::new(download_timeout)?;
        Ok(Self::new(base_dir, Arc::new(FsBundleStore), Arc::new(source)))
    }

    /// Override the download URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Location of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make sure a valid bundle is on disk and return its path.
    ///
    /// Failures are logged and reported as `None`.
    pub async fn ensure(&self) -> Option<PathBuf> {
        match self.try_ensure().await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "Could not acquire RDS trust bundle");
                None
            }
        }
    }

    /// Like [`ensure`](Self::ensure), but loads the PEM bytes as well.
    pub async fn bundle(&self) -> Option<Vec<u8>> {
        let path = self.ensure().await?;
        match self.store.read(&path).await {
            Ok(contents) => Some(contents),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read RDS trust bundle");
                None
            }
        }
    }

    /// Acquire the bundle, surfacing the failure reason.
    pub async fn try_ensure(&self) -> Result<PathBuf, TrustBundleError> {
        let mut resolved = self.resolved.lock().await;
        if let Some(path) = resolved.as_ref() {
            debug!(path = %path.display(), "RDS trust bundle already resolved");
            return Ok(path.clone());
        }

        self.store.create_dir_all(&self.dir).await?;

        match self.inspect_cached().await {
            Ok(CachedState::Fresh) => {
                info!(path = %self.path.display(), "Using cached RDS trust bundle");
                *resolved = Some(self.path.clone());
                return Ok(self.path.clone());
            }
            Ok(CachedState::Missing) => {
                info!("No cached RDS trust bundle");
            }
            Ok(CachedState::Expired { age_days }) => {
                info!(age_days, "Cached RDS trust bundle expired");
            }
            Err(TrustBundleError::Corrupted(path)) => {
                warn!(path = %path.display(), "Cached RDS trust bundle corrupted, re-downloading");
            }
            Err(e) => return Err(e),
        }

        self.download().await?;
        *resolved = Some(self.path.clone());
        Ok(self.path.clone())
    }

    async fn inspect_cached(&self) -> Result<CachedState, TrustBundleError> {
        let Some(stat) = self.store.stat(&self.path).await? else {
            return Ok(CachedState::Missing);
        };

        let age = Utc::now() - stat.modified;
        if age >= self.validity {
            return Ok(CachedState::Expired {
                age_days: age.num_days(),
            });
        }

        let contents = self.store.read(&self.path).await?;
        if is_valid_pem(&contents) {
            Ok(CachedState::Fresh)
        } else {
            Err(TrustBundleError::Corrupted(self.path.clone()))
        }
    }

    async fn download(&self) -> Result<(), TrustBundleError> {
        info!(url = %self.url, path = %self.path.display(), "Downloading RDS trust bundle");

        let outcome = self.stream_to_cache().await;
        match outcome {
            Ok(bytes) => {
                info!(bytes, "RDS trust bundle downloaded");
                Ok(())
            }
            Err(e) => {
                if let Err(cleanup) = self.store.remove(&self.path).await {
                    warn!(error = %cleanup, "Failed to remove partial trust bundle");
                }
                Err(e)
            }
        }
    }

    async fn stream_to_cache(&self) -> Result<u64, TrustBundleError> {
        let mut writer = self.store.writer(&self.path).await?;
        let bytes = self.source.download(&self.url, &mut *writer).await?;
        writer.shutdown().await?;
        drop(writer);

        let contents = self.store.read(&self.path).await?;
        if !is_valid_pem(&contents) {
            return Err(TrustBundleError::Corrupted(self.path.clone()));
        }
        Ok(bytes)
    }

    /// Report the cache state without downloading anything.
    pub async fn status(&self) -> TrustBundleStatus {
        let path = self.path.display().to_string();
        let validity_days = self.validity.num_days();

        match self.store.stat(&self.path).await {
            Ok(Some(stat)) => {
                let age = Utc::now() - stat.modified;
                let age_days = age.num_days();
                TrustBundleStatus {
                    path,
                    exists: true,
                    age_days: Some(age_days),
                    days_until_expiry: Some((validity_days - age_days).max(0)),
                    expired: age >= self.validity,
                    size_bytes: Some(stat.len),
                    last_modified: Some(stat.modified),
                }
            }
            Ok(None) => TrustBundleStatus {
                path,
                exists: false,
                age_days: None,
                days_until_expiry: None,
                expired: false,
                size_bytes: None,
                last_modified: None,
            },
            Err(e) => {
                warn!(error = %e, "Could not stat RDS trust bundle");
                TrustBundleStatus {
                    path,
                    exists: false,
                    age_days: None,
                    days_until_expiry: None,
                    expired: false,
                    size_bytes: None,
                    last_modified: None,
                }
            }
        }
    }
}

impl std::fmt::Debug for TrustBundleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustBundleCache")
            .field("path", &self.path)
            .field("url", &self.url)
            .field("validity_days", &self.validity.num_days())
            .finish_non_exhaustive()
    }
}
