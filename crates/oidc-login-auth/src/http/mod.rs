//! HTTP handlers for the browser login flow, logout and bearer diagnostics.
//!
//! # Routes
//!
//! | Route | Handler |
//! |-------|---------|
//! | `GET /login/{providerId}` | [`login::login_handler`] |
//! | `GET /code` | [`login::code_handler`] |
//! | `GET /bearertest` | [`bearer::bearer_test_handler`] |
//! | `GET, POST /logout/sessionlogout` | [`logout::session_logout_handler`] |
//! | `POST /logout` | [`logout::backchannel_logout_handler`] |

pub mod bearer;
pub mod error;
pub mod login;
pub mod logout;
pub mod templates;

use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    routing::{get, post},
};

use crate::bearer::BearerGate;
use crate::login::LoginFlow;

/// Router state shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Interactive login controller.
    pub login: Arc<LoginFlow>,

    /// Bearer token gate.
    pub bearer: Arc<BearerGate>,
}

impl AppState {
    #[must_use]
    pub fn new(login: Arc<LoginFlow>, bearer: Arc<BearerGate>) -> Self {
        Self { login, bearer }
    }
}

impl FromRef<AppState> for Arc<LoginFlow> {
    fn from_ref(state: &AppState) -> Self {
        state.login.clone()
    }
}

impl FromRef<AppState> for Arc<BearerGate> {
    fn from_ref(state: &AppState) -> Self {
        state.bearer.clone()
    }
}

/// Builds the router with all login, logout and diagnostics routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/login/{provider_id}", get(login::login_handler))
        .route("/code", get(login::code_handler))
        .route("/bearertest", get(bearer::bearer_test_handler))
        .route(
            "/logout/sessionlogout",
            get(logout::session_logout_handler).post(logout::session_logout_handler),
        )
        .route("/logout", post(logout::backchannel_logout_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::bearer::BearerIdentity;
    use crate::config::{BearerConfig, DiscoveryConfig, LoginConfig};
    use crate::federation::{
        DiscoveryCache, EndpointClient, IdentityResolver, PolicyChain, Provider, ProviderMatcher,
        StaticProviderRegistry, TokenVerifier, build_http_client,
    };
    use crate::storage::{InMemoryLoginSessionStorage, InMemoryUserStorage, LoginSessionStorage};
    use crate::testing::{BEARER_SECRET, encoded_secret, now, sign_hs256};

    const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
    const CHROME: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/126.0 Safari/537.36";
    const SAFARI: &str = "Mozilla/5.0 (Macintosh) AppleWebKit/605.1.15 Version/17.0 Safari/605.1.15";

    struct TestApp {
        server: MockServer,
        state: AppState,
        sessions: Arc<InMemoryLoginSessionStorage>,
    }

    async fn app() -> TestApp {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": server.uri(),
                "authorization_endpoint": format!("{}/authorize", server.uri()),
                "token_endpoint": format!("{}/token", server.uri()),
                "logout_endpoint": format!("{}/logout", server.uri())
            })))
            .mount(&server)
            .await;

        let provider = Provider::new(
            1,
            "Telekom",
            "CLIENT_A",
            Url::parse(&format!("{}/.well-known/openid-configuration", server.uri())).unwrap(),
        )
        .with_client_secret("s3cret")
        .with_bearer_secret(encoded_secret(BEARER_SECRET));

        let registry = Arc::new(StaticProviderRegistry::new(vec![provider]));
        let config = DiscoveryConfig::default().with_allow_http(true);
        let http = build_http_client(&config).unwrap();
        let discovery = Arc::new(DiscoveryCache::new(http.clone(), config));
        let verifier = TokenVerifier::new(Duration::from_secs(60));
        let users = Arc::new(InMemoryUserStorage::new());
        let sessions = Arc::new(InMemoryLoginSessionStorage::new());
        let policies = Arc::new(PolicyChain::new());
        let login_config = LoginConfig::default();

        let login = LoginFlow::new(
            registry.clone(),
            discovery.clone(),
            EndpointClient::new(http, discovery.clone(), login_config.callback_url.clone()),
            verifier.clone(),
            IdentityResolver::new(users.clone(), policies.clone()),
            sessions.clone(),
            login_config,
        );
        let bearer = BearerGate::new(
            registry,
            ProviderMatcher::new(discovery, verifier),
            IdentityResolver::new(users, policies),
            BearerConfig::default(),
        );

        TestApp {
            server,
            state: AppState::new(Arc::new(login), Arc::new(bearer)),
            sessions,
        }
    }

    async fn send(state: &AppState, request: Request<Body>) -> Response {
        router(state.clone()).oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> axum::http::request::Builder {
        Request::builder().method("GET").uri(uri)
    }

    #[tokio::test]
    async fn test_bearertest_without_bearer_header() {
        let app = app().await;
        let response = send(&app.state, get("/bearertest").body(Body::empty()).unwrap()).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await, json!(["Not a bearer authorization"]));
    }

    #[tokio::test]
    async fn test_bearertest_empty_token() {
        let app = app().await;
        let request = get("/bearertest")
            .header(header::AUTHORIZATION, "Bearer ")
            .body(Body::empty())
            .unwrap();
        let response = send(&app.state, request).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await, json!(["Not authenticated"]));
    }

    #[tokio::test]
    async fn test_bearertest_bare_scheme_is_empty_token() {
        let app = app().await;
        let request = get("/bearertest")
            .header(header::AUTHORIZATION, "Bearer")
            .body(Body::empty())
            .unwrap();
        let response = send(&app.state, request).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await, json!(["Not authenticated"]));
    }

    #[tokio::test]
    async fn test_bearertest_resolves_user() {
        let app = app().await;
        let token = sign_hs256(
            &json!({"sub": "jgyros", "aud": "CLIENT_A", "exp": now() + 600}),
            BEARER_SECRET,
        );
        let request = get("/bearertest")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = send(&app.state, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"username": "jgyros"}));
    }

    #[tokio::test]
    async fn test_bearer_identity_extractor() {
        let app = app().await;
        let protected = Router::new()
            .route(
                "/me",
                axum::routing::get(|BearerIdentity(uid): BearerIdentity| async move { uid }),
            )
            .with_state(app.state.clone());

        let response = protected
            .oneshot(
                get("/me")
                    .header(header::AUTHORIZATION, "Bearer not.a.token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn test_login_sets_session_cookie_and_redirects() {
        let app = app().await;
        let request = get("/login/1?redirectUrl=%2Fapps%2Ffiles")
            .header(header::USER_AGENT, FIREFOX)
            .body(Body::empty())
            .unwrap();
        let response = send(&app.state, request).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with(&format!("{}/authorize?", app.server.uri())));

        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("oidc_login_session="));
        assert!(cookie.contains("HttpOnly"));

        let session_id = cookie
            .trim_start_matches("oidc_login_session=")
            .split(';')
            .next()
            .unwrap();
        let pending = app.sessions.pending(session_id).unwrap();
        assert_eq!(pending.redirect_url.as_deref(), Some("/apps/files"));
    }

    #[tokio::test]
    async fn test_login_safari_meta_refresh() {
        let app = app().await;
        let request = get("/login/1")
            .header(header::USER_AGENT, SAFARI)
            .body(Body::empty())
            .unwrap();
        let response = send(&app.state, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("<meta http-equiv=\"refresh\" content=\"0; url="));
        assert!(html.contains("&amp;response_type=code"));
    }

    #[tokio::test]
    async fn test_login_unknown_provider_page() {
        let app = app().await;
        let response = send(&app.state, get("/login/42").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_code_without_session_is_forbidden() {
        let app = app().await;
        let response = send(
            &app.state,
            get("/code?state=ABC&code=XYZ").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await, json!(["invalid state"]));
    }

    #[tokio::test]
    async fn test_session_logout_redirects_and_clears_site_data() {
        let app = app().await;
        app.sessions.bind_user("sid-1", "jgyros").await.unwrap();

        let request = get("/logout/sessionlogout")
            .header(header::COOKIE, "oidc_login_session=sid-1")
            .header(header::USER_AGENT, FIREFOX)
            .body(Body::empty())
            .unwrap();
        let response = send(&app.state, request).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION].to_str().unwrap(),
            format!("{}/logout", app.server.uri())
        );
        assert_eq!(
            response.headers()["clear-site-data"].to_str().unwrap(),
            "\"cache\", \"storage\""
        );
        assert!(app.sessions.user_id("sid-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_logout_chrome_keeps_site_data() {
        let app = app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/logout/sessionlogout")
            .header(header::USER_AGENT, CHROME)
            .body(Body::empty())
            .unwrap();
        let response = send(&app.state, request).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(!response.headers().contains_key("clear-site-data"));
    }

    #[tokio::test]
    async fn test_backchannel_logout() {
        let app = app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/logout")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("logout_token=eyJhbGciOi.eyJzdWIi.sig"))
            .unwrap();
        let response = send(&app.state, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({}));
    }
}
