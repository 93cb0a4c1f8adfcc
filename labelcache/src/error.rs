#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("object not found")]
    NotFound,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("write error while streaming blob: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found in object store")]
    NotFound,
    #[error("object store transport error: {0}")]
    Transport(String),
    #[error("local disk error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ObjectStoreError> for BlobError {
    fn from(e: ObjectStoreError) -> Self {
        match e {
            ObjectStoreError::NotFound => BlobError::NotFound,
            ObjectStoreError::Transport(e) => BlobError::Transport(e.to_string()),
            ObjectStoreError::Io(e) => BlobError::Io(e),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("annotation file malformed: {0}")]
    Parse(String),
    #[error("disk error while building index: {0}")]
    Io(#[from] std::io::Error),
    #[error("index estimated memory {estimate_mb:.1} MB exceeds cap {cap_mb:.1} MB")]
    OutOfMemory { estimate_mb: f64, cap_mb: f64 },
}
