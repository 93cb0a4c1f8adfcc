use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

const OPEN_PATHS: &[&str] = &["/health"];

#[derive(Debug, Deserialize)]
struct Claims {
    #[allow(dead_code)]
    exp: u64,
    #[allow(dead_code)]
    sub: String,
    iss: String,
}

/// Fixed-time comparison so API key checks don't leak timing information
/// about where the mismatch occurred.
fn fixed_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn check_bearer_token(state: &AppState, header_value: &str) -> bool {
    let Some(token) = header_value.strip_prefix("Bearer ") else {
        return false;
    };
    if !state.config.api_key.is_empty() && fixed_time_eq(token.as_bytes(), state.config.api_key.as_bytes()) {
        return true;
    }
    if !state.config.jwt_secret.is_empty() {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        if !state.config.jwt_issuer.is_empty() {
            validation.set_issuer(&[&state.config.jwt_issuer]);
        }
        let key = DecodingKey::from_secret(state.config.jwt_secret.as_bytes());
        if let Ok(data) = decode::<Claims>(token, &key, &validation) {
            if state.config.jwt_issuer.is_empty() || data.claims.iss == state.config.jwt_issuer {
                return true;
            }
        }
    }
    false
}

/// Query-param fallback (`?token=...`) for clients that can't set an
/// `Authorization` header, such as a direct browser navigation to a label
/// export link. Only the static API key is honored this way, never a JWT.
fn check_query_token(state: &AppState, query: &str) -> bool {
    if state.config.api_key.is_empty() {
        return false;
    }
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("token=") {
            return fixed_time_eq(value.as_bytes(), state.config.api_key.as_bytes());
        }
    }
    false
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if OPEN_PATHS.contains(&request.uri().path()) {
        return Ok(next.run(request).await);
    }

    if !state.config.auth_enabled() {
        return Ok(next.run(request).await);
    }

    let authorized = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| check_bearer_token(&state, v))
        .unwrap_or(false)
        || check_query_token(&state, request.uri().query().unwrap_or(""));

    if authorized {
        Ok(next.run(request).await)
    } else {
        Err(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn fixed_time_eq_matches_equal_slices() {
        assert!(fixed_time_eq(b"secret", b"secret"));
    }

    #[test]
    fn fixed_time_eq_rejects_mismatch() {
        assert!(!fixed_time_eq(b"secret", b"wrong!"));
        assert!(!fixed_time_eq(b"secret", b"short"));
    }

    fn test_state(api_key: &str, jwt_secret: &str, jwt_issuer: &str) -> AppState {
        AppState::new(Config {
            object_store_connection: "https://example.invalid".into(),
            object_store_container: "labels".into(),
            cache_dir: std::env::temp_dir()
                .join("labelserver-auth-test")
                .to_string_lossy()
                .into_owned(),
            cache_max_size_gb: 1.0,
            max_indexed_jobs: 10,
            max_index_memory_mb: 64.0,
            api_key: api_key.into(),
            jwt_secret: jwt_secret.into(),
            jwt_issuer: jwt_issuer.into(),
            bind_addr: "127.0.0.1:0".into(),
            worker_threads: 1,
        })
    }

    #[test]
    fn static_token_accepted() {
        let state = test_state("topsecret", "", "");
        assert!(check_bearer_token(&state, "Bearer topsecret"));
        assert!(!check_bearer_token(&state, "Bearer nope"));
    }

    #[test]
    fn missing_bearer_prefix_rejected() {
        let state = test_state("topsecret", "", "");
        assert!(!check_bearer_token(&state, "topsecret"));
    }

    #[test]
    fn query_param_token_fallback_accepted() {
        let state = test_state("topsecret", "", "");
        assert!(check_query_token(&state, "blob_path=a.json&token=topsecret"));
        assert!(!check_query_token(&state, "blob_path=a.json&token=wrong"));
        assert!(!check_query_token(&state, "blob_path=a.json"));
    }

    #[test]
    fn jwt_with_matching_issuer_accepted() {
        use jsonwebtoken::{encode, EncodingKey, Header};
        use serde::Serialize;

        #[derive(Serialize)]
        struct TestClaims {
            exp: u64,
            sub: &'static str,
            iss: &'static str,
        }

        let state = test_state("", "jwt-signing-secret", "label-service");
        let claims = TestClaims {
            exp: 9_999_999_999,
            sub: "batch-client",
            iss: "label-service",
        };
        let token = encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"jwt-signing-secret"),
        )
        .unwrap();

        assert!(check_bearer_token(&state, &format!("Bearer {token}")));
    }

    #[test]
    fn jwt_with_wrong_issuer_rejected() {
        use jsonwebtoken::{encode, EncodingKey, Header};
        use serde::Serialize;

        #[derive(Serialize)]
        struct TestClaims {
            exp: u64,
            sub: &'static str,
            iss: &'static str,
        }

        let state = test_state("", "jwt-signing-secret", "label-service");
        let claims = TestClaims {
            exp: 9_999_999_999,
            sub: "batch-client",
            iss: "someone-else",
        };
        let token = encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"jwt-signing-secret"),
        )
        .unwrap();

        assert!(!check_bearer_token(&state, &format!("Bearer {token}")));
    }
}
