use std::path::PathBuf;
use std::sync::Arc;

use labelcache::{HttpObjectStore, ObjectFetcher, QueryService, QueryServiceConfig};

use crate::config::Config;

/// Process-wide application state, constructed once at boot and handed to
/// every axum handler via `State<Arc<AppState>>` (mirrors the teacher's
/// `Arc<Ctx>`-over-`State` pattern).
pub struct AppState {
    pub config: Config,
    pub query_service: QueryService,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let fetcher: Arc<dyn ObjectFetcher> = Arc::new(HttpObjectStore::new(
            config.object_store_connection.clone(),
            config.object_store_container.clone(),
        ));
        let query_service = QueryService::new(
            QueryServiceConfig {
                cache_dir: PathBuf::from(&config.cache_dir),
                blob_max_bytes: config.cache_max_bytes(),
                index_max_entries: config.max_indexed_jobs,
                index_max_memory_mb: config.max_index_memory_mb,
            },
            fetcher,
        );
        Self {
            config,
            query_service,
        }
    }
}
