use clap::Parser;

/// Environment-driven server configuration. Every field can be set via its
/// `env` name; `object_store_connection` has no default and startup fails
/// fast without it.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Opaque credential/connection string for the remote object store.
    #[arg(long, env = "OBJECT_STORE_CONNECTION")]
    pub object_store_connection: String,

    /// Default container/bucket to read blobs from.
    #[arg(long, env = "OBJECT_STORE_CONTAINER", default_value = "labels")]
    pub object_store_container: String,

    #[arg(long, env = "CACHE_DIR", default_value = "/data/label-cache")]
    pub cache_dir: String,

    #[arg(long, env = "CACHE_MAX_SIZE_GB", default_value_t = 50.0)]
    pub cache_max_size_gb: f64,

    #[arg(long, env = "MAX_INDEXED_JOBS", default_value_t = 50)]
    pub max_indexed_jobs: usize,

    #[arg(long, env = "MAX_INDEX_MEMORY_MB", default_value_t = 8192.0)]
    pub max_index_memory_mb: f64,

    /// Static bearer token. Empty disables this scheme.
    #[arg(long, env = "API_KEY", default_value = "")]
    pub api_key: String,

    /// HS256 signing secret for JWT auth. Empty disables this scheme.
    #[arg(long, env = "JWT_SECRET", default_value = "")]
    pub jwt_secret: String,

    /// Required `iss` claim when JWT auth is enabled.
    #[arg(long, env = "JWT_ISSUER", default_value = "")]
    pub jwt_issuer: String,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Informational budget for the blocking-task pool; Tokio sizes its own
    /// pool, this documents the intended ceiling.
    #[arg(long, env = "WORKER_THREADS", default_value_t = 8)]
    pub worker_threads: usize,
}

impl Config {
    pub fn cache_max_bytes(&self) -> u64 {
        (self.cache_max_size_gb * 1024.0 * 1024.0 * 1024.0) as u64
    }

    pub fn auth_enabled(&self) -> bool {
        !self.api_key.is_empty() || !self.jwt_secret.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            object_store_connection: "https://example.invalid".into(),
            object_store_container: "labels".into(),
            cache_dir: "/tmp/cache".into(),
            cache_max_size_gb: 1.0,
            max_indexed_jobs: 10,
            max_index_memory_mb: 64.0,
            api_key: String::new(),
            jwt_secret: String::new(),
            jwt_issuer: String::new(),
            bind_addr: "127.0.0.1:0".into(),
            worker_threads: 1,
        }
    }

    #[test]
    fn cache_max_bytes_converts_gb_to_bytes() {
        let config = base();
        assert_eq!(config.cache_max_bytes(), 1024 * 1024 * 1024);
    }

    #[test]
    fn auth_disabled_when_both_empty() {
        assert!(!base().auth_enabled());
    }

    #[test]
    fn auth_enabled_with_either_scheme() {
        let mut config = base();
        config.api_key = "k".into();
        assert!(config.auth_enabled());

        let mut config = base();
        config.jwt_secret = "s".into();
        assert!(config.auth_enabled());
    }
}
