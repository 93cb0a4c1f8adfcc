use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use labelcache::{BlobKey, BoundingBox};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/labels", get(get_labels))
        .route("/labels/stats", get(get_labels_stats))
        .route("/labels/invalidate", post(post_invalidate))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    cached_files: u64,
    cached_mb: f64,
    indexed_jobs: u64,
    total_labels: u64,
    total_memory_mb: f64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.query_service.stats();
    Json(HealthResponse {
        status: "ok",
        cached_files: stats.blob_count,
        cached_mb: stats.blob_bytes as f64 / (1024.0 * 1024.0),
        indexed_jobs: stats.index_count,
        total_labels: stats.total_labels,
        total_memory_mb: stats.index_memory_mb,
    })
}

#[derive(Deserialize)]
struct LabelsQuery {
    blob_path: String,
    bbox: Option<String>,
}

fn parse_key(blob_path: &str) -> Result<BlobKey, ApiError> {
    BlobKey::new(blob_path).ok_or_else(|| ApiError::BadRequest("invalid blob_path".into()))
}

fn parse_bbox(raw: &str) -> Result<BoundingBox, ApiError> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 4 {
        return Err(ApiError::BadRequest(
            "bbox must have exactly four comma-separated values".into(),
        ));
    }
    let mut values = [0.0f64; 4];
    for (slot, part) in values.iter_mut().zip(parts.iter()) {
        *slot = part
            .trim()
            .parse::<f64>()
            .map_err(|_| ApiError::BadRequest("bbox values must be numbers".into()))?;
    }
    BoundingBox::new(values[0], values[1], values[2], values[3])
        .ok_or_else(|| ApiError::BadRequest("bbox is not finite or has min > max".into()))
}

#[derive(Serialize)]
struct LabelsMetaResponse {
    blob_path: String,
    total_labels: usize,
    memory_mb: f64,
}

async fn get_labels(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LabelsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let key = parse_key(&query.blob_path)?;

    let headers = [(header::CACHE_CONTROL, "no-cache")];

    match query.bbox {
        None => {
            let (total_labels, memory_mb) = state.query_service.describe(&key).await?;
            Ok((
                headers,
                Json(LabelsMetaResponse {
                    blob_path: query.blob_path,
                    total_labels,
                    memory_mb,
                })
                .into_response(),
            ))
        }
        Some(raw) => {
            let bbox = parse_bbox(&raw)?;
            let labels = state.query_service.query(&key, Some(bbox)).await?;
            Ok((headers, Json(labels).into_response()))
        }
    }
}

#[derive(Deserialize)]
struct BlobPathQuery {
    blob_path: String,
}

#[derive(Serialize)]
struct StatsResponse {
    blob_path: String,
    compressed_size_mb: f64,
    is_indexed: bool,
}

async fn get_labels_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BlobPathQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let key = parse_key(&query.blob_path)?;
    let (size_bytes, is_indexed) = state.query_service.quick_stats(&key).await?;
    Ok(Json(StatsResponse {
        blob_path: query.blob_path,
        compressed_size_mb: size_bytes as f64 / (1024.0 * 1024.0),
        is_indexed,
    }))
}

#[derive(Serialize)]
struct InvalidateResponse {
    invalidated: bool,
}

async fn post_invalidate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BlobPathQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let key = parse_key(&query.blob_path)?;
    state.query_service.invalidate(&key).await;
    Ok(Json(InvalidateResponse { invalidated: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bbox_accepts_four_finite_values() {
        let bbox = parse_bbox("0,0,10,10").unwrap();
        assert_eq!(bbox.min_x, 0.0);
        assert_eq!(bbox.max_y, 10.0);
    }

    #[test]
    fn parse_bbox_rejects_wrong_arity() {
        assert!(parse_bbox("0,0,10").is_err());
        assert!(parse_bbox("0,0,10,10,10").is_err());
    }

    #[test]
    fn parse_bbox_rejects_non_numeric() {
        assert!(parse_bbox("a,0,10,10").is_err());
    }

    #[test]
    fn parse_bbox_rejects_inverted_axis() {
        assert!(parse_bbox("10,0,0,10").is_err());
    }

    #[test]
    fn parse_key_rejects_traversal() {
        assert!(parse_key("../etc/passwd").is_err());
        assert!(parse_key("tiles/a.json.gz").is_ok());
    }
}
