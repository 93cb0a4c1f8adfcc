use reqwest::StatusCode;
use tokio::io::AsyncWrite;

use crate::error::ObjectStoreError;

/// Opaque fetch-by-key capability. The HTTP transport, auth, and container
/// addressing of the real remote store are collaborators outside the core;
/// this trait is the narrow seam the caching layer depends on.
#[async_trait::async_trait]
pub trait ObjectFetcher: Send + Sync + 'static {
    async fn fetch(
        &self,
        key: &str,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ObjectStoreError>;
}

/// Fetches blobs over HTTP(S) from a container-style object store (Azure
/// Blob, S3-compatible, or any service that serves `GET {base}/{container}/{key}`).
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    container: String,
}

impl HttpObjectStore {
    pub fn new(connection: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: connection.into(),
            container: container.into(),
        }
    }
}

#[async_trait::async_trait]
impl ObjectFetcher for HttpObjectStore {
    async fn fetch(
        &self,
        key: &str,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ObjectStoreError> {
        use tokio::io::AsyncWriteExt;

        let url = format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.container,
            key
        );
        let mut response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(ObjectStoreError::NotFound),
            _ => {
                let response = response.error_for_status().err();
                return Err(response
                    .map(ObjectStoreError::Transport)
                    .unwrap_or(ObjectStoreError::NotFound));
            }
        }

        while let Some(chunk) = response.chunk().await? {
            writer.write_all(&chunk).await?;
        }
        writer.flush().await?;
        Ok(())
    }
}
