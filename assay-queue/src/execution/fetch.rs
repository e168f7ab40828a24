use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use crate::{QueueError, QueueResult};

/// Brings a remote input into the job's working directory.
#[async_trait]
pub trait InputFetcher: Send + Sync {
    /// Write the content behind `url` to `dest`, returning the byte count.
    async fn fetch(&self, url: &Url, dest: &Path) -> QueueResult<u64>;
}

/// Fetches `http(s)` inputs with reqwest and copies `file` URLs.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// `timeout` bounds connecting and every wait for more of the body, so a
    /// stalled download fails instead of hanging.
    pub fn new(timeout: Duration) -> QueueResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| QueueError::Fetch(e.to_string()))?;
        Ok(Self { client })
    }

    async fn copy_local(&self, url: &Url, dest: &Path) -> QueueResult<u64> {
        let source = url
            .to_file_path()
            .map_err(|_| QueueError::Fetch(format!("not a local path: {}", url)))?;
        tokio::fs::copy(&source, dest)
            .await
            .map_err(|e| QueueError::io(format!("copy {}", source.display()), e))
    }
}

#[async_trait]
impl InputFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, dest: &Path) -> QueueResult<u64> {
        match url.scheme() {
            "http" | "https" => {}
            "file" => return self.copy_local(url, dest).await,
            other => return Err(QueueError::Fetch(format!("unsupported scheme: {}", other))),
        }

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| QueueError::io(format!("create {}", dest.display()), e))?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)
                .await
                .map_err(|e| QueueError::io(format!("write {}", dest.display()), e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| QueueError::io(format!("flush {}", dest.display()), e))?;

        debug!(url = %url, bytes = written, "input fetched");
        Ok(written)
    }
}
