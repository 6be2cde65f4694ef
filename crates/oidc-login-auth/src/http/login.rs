//! Browser login handlers.
//!
//! - `GET /login/{providerId}?redirectUrl=` starts the Authorization Code flow
//! - `GET /code?state=&code=&scope=` receives the provider callback
//!
//! The browser session is identified by an opaque id in the session cookie;
//! a fresh id is issued on the first login.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use cookie::{Cookie, SameSite};
use serde::Deserialize;
use uuid::Uuid;

use super::templates::{render_error_page, render_meta_refresh};
use crate::config::LoginConfig;
use crate::error::AuthError;
use crate::login::{LoginFlow, LoginResponse};

/// Query parameters of `/login/{providerId}`.
#[derive(Debug, Deserialize)]
pub struct LoginParams {
    /// Where to land after a successful login.
    #[serde(rename = "redirectUrl")]
    pub redirect_url: Option<String>,
}

/// Query parameters of the `/code` callback.
#[derive(Debug, Deserialize)]
pub struct CodeParams {
    #[serde(default)]
    pub state: String,

    #[serde(default)]
    pub code: String,

    /// Granted scopes, informational only.
    #[serde(default)]
    pub scope: Option<String>,
}

impl IntoResponse for LoginResponse {
    fn into_response(self) -> Response {
        match self {
            LoginResponse::Redirect(url) => {
                (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
            }
            LoginResponse::MetaRefresh(url) => Html(render_meta_refresh(&url)).into_response(),
            LoginResponse::Json { status, body } => (status, Json(body)).into_response(),
            LoginResponse::ErrorPage { status, message } => {
                (status, Html(render_error_page(status, &message))).into_response()
            }
        }
    }
}

/// Handler for `GET /login/{providerId}`.
pub async fn login_handler(
    State(flow): State<Arc<LoginFlow>>,
    Path(provider_id): Path<i64>,
    Query(params): Query<LoginParams>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, LoginResponse), AuthError> {
    let config = flow.config();
    let (jar, session_id) = match jar.get(&config.session_cookie) {
        Some(cookie) => {
            let session_id = cookie.value().to_string();
            (jar, session_id)
        }
        None => {
            let session_id = Uuid::new_v4().to_string();
            let jar = jar.add(session_cookie(config, session_id.clone()));
            (jar, session_id)
        }
    };

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok());

    let response = flow
        .login(
            &session_id,
            provider_id,
            params.redirect_url.as_deref(),
            user_agent,
        )
        .await?;
    Ok((jar, response))
}

/// Handler for `GET /code`.
pub async fn code_handler(
    State(flow): State<Arc<LoginFlow>>,
    Query(params): Query<CodeParams>,
    jar: CookieJar,
) -> Result<LoginResponse, AuthError> {
    let Some(session_id) = jar
        .get(&flow.config().session_cookie)
        .map(|cookie| cookie.value().to_string())
    else {
        tracing::debug!("Callback without session cookie");
        return Ok(LoginResponse::Json {
            status: StatusCode::FORBIDDEN,
            body: serde_json::json!(["invalid state"]),
        });
    };

    if let Some(scope) = &params.scope {
        tracing::debug!(%scope, "Scopes granted by provider");
    }

    flow.code(&session_id, &params.state, &params.code).await
}

/// Builds the browser session cookie.
fn session_cookie(config: &LoginConfig, session_id: String) -> Cookie<'static> {
    Cookie::build((config.session_cookie.clone(), session_id))
        .http_only(true)
        .secure(config.callback_url.starts_with("https://"))
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}
