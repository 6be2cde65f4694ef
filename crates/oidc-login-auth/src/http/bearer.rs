//! Bearer diagnostics endpoint.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::bearer::{BearerError, BearerGate};

/// Handler for `GET /bearertest`.
///
/// Returns `{"username": uid}` for a resolvable bearer token.
pub async fn bearer_test_handler(
    State(gate): State<Arc<BearerGate>>,
    headers: HeaderMap,
) -> Response {
    let header = headers
        .get(gate.header_name())
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    match gate.resolve_identity(header).await {
        Ok(username) => Json(json!({ "username": username })).into_response(),
        Err(BearerError::NotBearer) => {
            (StatusCode::UNAUTHORIZED, Json(json!(["Not a bearer authorization"]))).into_response()
        }
        Err(e) => {
            match &e {
                BearerError::EmptyToken => {
                    tracing::warn!("Authorization header without bearer token received");
                }
                BearerError::Identity(_) | BearerError::Registry(_) => {
                    tracing::error!(error = %e, "Bearer identity resolution failed");
                }
                _ => tracing::info!(error = %e, "Bearer token rejected"),
            }
            (StatusCode::UNAUTHORIZED, Json(json!(["Not authenticated"]))).into_response()
        }
    }
}
