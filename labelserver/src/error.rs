use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use labelcache::{BlobError, IndexError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("blob not found")]
    NotFound,
    #[error("malformed request: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<BlobError> for ApiError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::NotFound => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<IndexError> for ApiError {
    fn from(e: IndexError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<labelcache::QueryError> for ApiError {
    fn from(e: labelcache::QueryError) -> Self {
        match e {
            labelcache::QueryError::Blob(b) => b.into(),
            labelcache::QueryError::Index(i) => i.into(),
            labelcache::QueryError::TaskJoin(e) => ApiError::Internal(e.to_string()),
        }
    }
}
