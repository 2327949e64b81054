//! Network sources for the trust bundle.

use crate::error::TrustBundleError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Something that can stream a bundle from a URL into a writer.
#[async_trait]
pub trait BundleSource: Send + Sync {
    /// Stream the body at `url` into `dest`, returning the number of bytes written.
    ///
    /// Anything other than HTTP 200 is a failure.
    async fn download(
        &self,
        url: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TrustBundleError>;
}

/// HTTPS source backed by reqwest with rustls.
#[derive(Debug, Clone)]
pub struct HttpBundleSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpBundleSource {
    /// Create a source whose requests are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TrustBundleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, timeout })
    }

    fn classify(&self, e: reqwest::Error) -> TrustBundleError {
        if e.is_timeout() {
            TrustBundleError::Timeout(self.timeout.as_secs())
        } else {
            TrustBundleError::Http(e)
        }
    }
}

#[async_trait]
impl BundleSource for HttpBundleSource {
    async fn download(
        &self,
        url: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TrustBundleError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(TrustBundleError::Status(status.as_u16()));
        }

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(e))? {
            dest.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        dest.flush().await?;

        debug!(url, bytes = written, "Bundle body streamed");
        Ok(written)
    }
}
