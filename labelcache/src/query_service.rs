use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::blob_cache::BlobCache;
use crate::blob_key::BlobKey;
use crate::error::{BlobError, IndexError};
use crate::geometry::BoundingBox;
use crate::index_cache::IndexCache;
use crate::object_store::ObjectFetcher;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("background task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

pub struct QueryServiceConfig {
    pub cache_dir: PathBuf,
    pub blob_max_bytes: u64,
    pub index_max_entries: usize,
    pub index_max_memory_mb: f64,
}

/// Composes the disk blob cache and the in-memory spatial-index cache into
/// the single read-through path the HTTP layer calls into. Parsing and
/// querying are CPU-bound and run on the blocking thread pool so they never
/// stall the async reactor.
pub struct QueryService {
    blobs: Arc<BlobCache>,
    indexes: Arc<IndexCache>,
}

impl QueryService {
    pub fn new(config: QueryServiceConfig, fetcher: Arc<dyn ObjectFetcher>) -> Self {
        Self {
            blobs: Arc::new(BlobCache::new(config.cache_dir, config.blob_max_bytes, fetcher)),
            indexes: Arc::new(IndexCache::new(
                config.index_max_entries,
                config.index_max_memory_mb,
            )),
        }
    }

    pub async fn warm_up(&self) -> Result<(), QueryError> {
        self.blobs.reconcile_from_disk().await?;
        Ok(())
    }

    /// Fetches (downloading if needed), indexes (building if needed), and
    /// queries a spatial subset of `key`'s labels. `bbox` of `None` returns
    /// every label.
    pub async fn query(
        &self,
        key: &BlobKey,
        bbox: Option<BoundingBox>,
    ) -> Result<Vec<Value>, QueryError> {
        let local_path = self.blobs.get(key).await?;
        let entry = {
            let indexes = self.indexes.clone();
            let key = key.clone();
            // get_or_build parses/bulk-loads synchronously; offload it.
            let path = local_path.clone();
            tokio_spawn_blocking(move || indexes.get_or_build(&key, &path)).await??
        };

        match bbox {
            Some(bbox) => {
                let entry = entry.clone();
                Ok(tokio_spawn_blocking(move || entry.query(bbox)).await?)
            }
            None => Ok(entry.labels.clone()),
        }
    }

    /// Ensures `key` is indexed and reports its label count and estimated
    /// memory footprint, without materializing every label.
    pub async fn describe(&self, key: &BlobKey) -> Result<(usize, f64), QueryError> {
        let local_path = self.blobs.get(key).await?;
        let indexes = self.indexes.clone();
        let key = key.clone();
        let entry = tokio_spawn_blocking(move || indexes.get_or_build(&key, &local_path)).await??;
        Ok((entry.label_count, entry.memory_estimate_mb))
    }

    /// Ensures the blob is on disk (may trigger a download) and reports its
    /// compressed size and whether an index is currently resident, without
    /// forcing a build.
    pub async fn quick_stats(&self, key: &BlobKey) -> Result<(u64, bool), QueryError> {
        let local_path = self.blobs.get(key).await?;
        let size = tokio::fs::metadata(&local_path)
            .await
            .map_err(BlobError::Io)?
            .len();
        Ok((size, self.indexes.contains(key)))
    }

    pub async fn invalidate(&self, key: &BlobKey) {
        self.indexes.invalidate(key);
        self.blobs.remove(key).await;
    }

    pub fn stats(&self) -> ServiceStats {
        let (blob_count, blob_bytes) = self.blobs.stats();
        let (index_count, total_labels, index_memory_mb) = self.indexes.stats();
        ServiceStats {
            blob_count,
            blob_bytes,
            index_count,
            total_labels,
            index_memory_mb,
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ServiceStats {
    pub blob_count: u64,
    pub blob_bytes: u64,
    pub index_count: u64,
    pub total_labels: u64,
    pub index_memory_mb: f64,
}

/// Thin wrapper so call sites read as ordinary async calls; `spawn_blocking`
/// itself can't return our crate errors without a join first.
async fn tokio_spawn_blocking<F, T>(f: F) -> Result<T, tokio::task::JoinError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ObjectStoreError;
    use async_trait::async_trait;
    use tokio::io::{AsyncWrite, AsyncWriteExt};

    struct StaticFetcher(Vec<u8>);

    #[async_trait]
    impl ObjectFetcher for StaticFetcher {
        async fn fetch(
            &self,
            _key: &str,
            writer: &mut (dyn AsyncWrite + Send + Unpin),
        ) -> Result<(), ObjectStoreError> {
            writer.write_all(&self.0).await?;
            Ok(())
        }
    }

    fn service(fetcher: Arc<dyn ObjectFetcher>, dir: &tempfile::TempDir) -> QueryService {
        QueryService::new(
            QueryServiceConfig {
                cache_dir: dir.path().to_path_buf(),
                blob_max_bytes: 1_000_000,
                index_max_entries: 10,
                index_max_memory_mb: 1024.0,
            },
            fetcher,
        )
    }

    #[tokio::test]
    async fn query_without_bbox_returns_all_labels() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{"labels": [{"position": {"x": 0.0, "y": 0.0}}, {"position": {"x": 100.0, "y": 100.0}}]}"#;
        let svc = service(Arc::new(StaticFetcher(body.as_bytes().to_vec())), &dir);
        let key = BlobKey::new("a.json").unwrap();
        let labels = svc.query(&key, None).await.unwrap();
        assert_eq!(labels.len(), 2);
    }

    #[tokio::test]
    async fn query_with_bbox_filters() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{"labels": [{"position": {"x": 0.0, "y": 0.0}}, {"position": {"x": 100.0, "y": 100.0}}]}"#;
        let svc = service(Arc::new(StaticFetcher(body.as_bytes().to_vec())), &dir);
        let key = BlobKey::new("a.json").unwrap();
        let bbox = BoundingBox::new(-1.0, -1.0, 1.0, 1.0).unwrap();
        let labels = svc.query(&key, Some(bbox)).await.unwrap();
        assert_eq!(labels.len(), 1);
    }

    #[tokio::test]
    async fn invalidate_clears_both_caches() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{"labels": [{"position": {"x": 0.0, "y": 0.0}}]}"#;
        let svc = service(Arc::new(StaticFetcher(body.as_bytes().to_vec())), &dir);
        let key = BlobKey::new("a.json").unwrap();
        svc.query(&key, None).await.unwrap();
        assert_eq!(svc.stats().blob_count, 1);
        svc.invalidate(&key).await;
        let stats = svc.stats();
        assert_eq!(stats.blob_count, 0);
        assert_eq!(stats.index_count, 0);
    }
}
