/// Authentication middleware for the admin API

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::debug;

use super::AppState;

/// Reject requests without the configured token
pub async fn require_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let provided = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        // Support both "Bearer TOKEN" and just "TOKEN"
        .map(|header| header.strip_prefix("Bearer ").unwrap_or(header));

    match provided {
        Some(token) if token == state.token => Ok(next.run(request).await),
        _ => {
            debug!(path = %request.uri().path(), "Rejected unauthenticated request");
            Err(unauthorized_response())
        }
    }
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "success": false,
            "data": null,
            "error": "Unauthorized - invalid or missing authentication token"
        })),
    )
        .into_response()
}

/// Generate a random secure token
pub fn generate_token() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    const TOKEN_LEN: usize = 32;
    let mut rng = rand::thread_rng();

    (0..TOKEN_LEN)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_token());
    }
}
