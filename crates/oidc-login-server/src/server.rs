use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, http::StatusCode, routing::get};
use oidc_login_auth::federation::{
    DiscoveryCache, EndpointClient, IdentityResolver, PolicyChain, ProviderMatcher,
    StaticProviderRegistry, TokenVerifier, build_http_client,
};
use oidc_login_auth::storage::{
    InMemoryLoginSessionStorage, InMemoryUserStorage, LoginSessionStorage, UserStorage,
};
use oidc_login_auth::{AppState, BearerGate, LoginFlow};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::AppConfig;

pub struct OidcLoginServer {
    addr: SocketAddr,
    app: Router,
    discovery: Arc<DiscoveryCache>,
}

/// Wires providers, caches, stores and policies into the handler state.
pub fn build_state(
    cfg: &AppConfig,
    policies: PolicyChain,
) -> anyhow::Result<(AppState, Arc<DiscoveryCache>)> {
    let auth = &cfg.auth;
    let http_client = build_http_client(&auth.discovery)?;
    let discovery = Arc::new(DiscoveryCache::new(http_client.clone(), auth.discovery.clone()));
    let registry = Arc::new(StaticProviderRegistry::new(cfg.providers.clone()));
    let verifier = TokenVerifier::from_config(&auth.tokens);
    let policies = Arc::new(policies);

    let users: Arc<dyn UserStorage> = Arc::new(InMemoryUserStorage::new());
    let sessions: Arc<dyn LoginSessionStorage> = Arc::new(InMemoryLoginSessionStorage::new());

    let endpoints = EndpointClient::new(http_client, discovery.clone(), auth.login.callback_url.clone());

    let login = LoginFlow::new(
        registry.clone(),
        discovery.clone(),
        endpoints.clone(),
        verifier.clone(),
        IdentityResolver::new(users.clone(), policies.clone()),
        sessions,
        auth.login.clone(),
    );

    let bearer = BearerGate::new(
        registry,
        ProviderMatcher::new(discovery.clone(), verifier).with_introspection(endpoints),
        IdentityResolver::new(users, policies),
        auth.bearer.clone(),
    );

    Ok((AppState::new(Arc::new(login), Arc::new(bearer)), discovery))
}

pub fn build_app(cfg: &AppConfig, state: AppState) -> Router {
    oidc_login_auth::router(state)
        .route("/healthz", get(healthz))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            cfg.server.request_timeout,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        // Query strings carry authorization codes and state.
                        http.target = %req.uri().path(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
}

async fn healthz() -> &'static str {
    "ok"
}

pub struct ServerBuilder {
    config: AppConfig,
    policies: PolicyChain,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            policies: PolicyChain::new(),
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Sets the attribute override and account decision policies.
    pub fn with_policies(mut self, policies: PolicyChain) -> Self {
        self.policies = policies;
        self
    }

    pub fn build(self) -> anyhow::Result<OidcLoginServer> {
        let (state, discovery) = build_state(&self.config, self.policies)?;
        let app = build_app(&self.config, state);

        tracing::info!(
            providers = self.config.providers.len(),
            "Providers registered"
        );

        Ok(OidcLoginServer {
            addr: self.config.addr(),
            app,
            discovery,
        })
    }
}

impl OidcLoginServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let cleanup = tokio::spawn(evict_expired(self.discovery.clone()));

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let result = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        cleanup.abort();
        result?;
        Ok(())
    }
}

/// Periodically drops expired discovery and JWKS entries.
async fn evict_expired(discovery: Arc<DiscoveryCache>) {
    let mut interval = tokio::time::interval(discovery.ttl());
    interval.tick().await;
    loop {
        interval.tick().await;
        discovery.cleanup().await;
        let entries = discovery.len().await;
        tracing::debug!(entries, "Discovery cache cleaned up");
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
