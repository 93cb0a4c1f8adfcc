mod blob_cache;
mod blob_key;
mod error;
mod geometry;
mod index_builder;
mod index_cache;
mod object_store;
mod query_service;

pub use blob_cache::BlobCache;
pub use blob_key::BlobKey;
pub use error::{BlobError, IndexError, ObjectStoreError};
pub use geometry::{extract_bbox, BoundingBox};
pub use index_builder::IndexEntry;
pub use index_cache::IndexCache;
pub use object_store::{HttpObjectStore, ObjectFetcher};
pub use query_service::{QueryError, QueryService, QueryServiceConfig, ServiceStats};
