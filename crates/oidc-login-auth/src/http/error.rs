//! Error response handling.
//!
//! Implements `IntoResponse` for [`AuthError`]: a JSON body with `error` and
//! `error_description`, plus `WWW-Authenticate` on 401.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_code(&self);
        let code = self.error_code();

        if self.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let message = if self.is_server_error() {
            // Storage and configuration details stay in the log.
            "internal server error".to_string()
        } else {
            self.message().to_string()
        };

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED
            && let Ok(value) = HeaderValue::from_str(&www_authenticate(code, &message))
        {
            headers.insert(header::WWW_AUTHENTICATE, value);
        }

        let body = json!({
            "error": code,
            "error_description": message,
        });

        (status, headers, Json(body)).into_response()
    }
}

fn status_code(error: &AuthError) -> StatusCode {
    match error {
        AuthError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
        AuthError::NotFound { .. } => StatusCode::NOT_FOUND,
        AuthError::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
        AuthError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        AuthError::Storage { .. } | AuthError::Configuration { .. } | AuthError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn www_authenticate(error: &str, description: &str) -> String {
    let escaped = description.replace('"', "\\\"");
    format!("Bearer realm=\"oidc-login\", error=\"{error}\", error_description=\"{escaped}\"")
}
