//! Logout handlers.
//!
//! - `GET|POST /logout/sessionlogout` ends the browser session and sends the
//!   browser to the logout provider's `logout_endpoint`
//! - `POST /logout` receives back-channel logout notifications

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use cookie::Cookie;
use serde::Deserialize;
use serde_json::json;

use crate::error::AuthError;
use crate::login::LoginFlow;

/// Back-channel logout request body.
#[derive(Debug, Default, Deserialize)]
pub struct BackchannelLogoutParams {
    #[serde(default)]
    pub logout_token: Option<String>,
}

/// Handler for `GET|POST /logout/sessionlogout`.
pub async fn session_logout_handler(
    State(flow): State<Arc<LoginFlow>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response, AuthError> {
    let cookie_name = flow.config().session_cookie.clone();
    let session_id = jar.get(&cookie_name).map(|c| c.value().to_string());

    let target = flow.session_logout(session_id.as_deref()).await?;
    tracing::info!(%target, "Browser session logged out");

    let jar = jar.remove(Cookie::build(cookie_name).path("/"));
    let mut response = (jar, (StatusCode::FOUND, [(header::LOCATION, target)])).into_response();

    let is_chrome = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|ua| ua.contains("Chrome"));
    if !is_chrome {
        response.headers_mut().insert(
            "clear-site-data",
            HeaderValue::from_static("\"cache\", \"storage\""),
        );
    }

    Ok(response)
}

/// Handler for `POST /logout` (back-channel logout).
///
/// The notification is logged; sessions are not correlated with it.
pub async fn backchannel_logout_handler(
    Form(params): Form<BackchannelLogoutParams>,
) -> impl IntoResponse {
    match params.logout_token {
        Some(token) => tracing::info!(
            token_prefix = token_prefix(&token),
            token_len = token.len(),
            "Back-channel logout received"
        ),
        None => tracing::warn!("Back-channel logout without logout_token"),
    }
    Json(json!({}))
}

/// Leading characters of a token, safe to log.
fn token_prefix(token: &str) -> &str {
    const LOGGED_CHARS: usize = 8;
    token
        .char_indices()
        .nth(LOGGED_CHARS)
        .map_or(token, |(end, _)| &token[..end])
}
