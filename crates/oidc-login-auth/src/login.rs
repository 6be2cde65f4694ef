//! Authorization Code login flow.
//!
//! # States
//!
//! ```text
//! ANONYMOUS --login--> REDIRECTED --code--> CODE_RECEIVED --> AUTHENTICATED
//!                                                        \--> REJECTED
//! ```
//!
//! `login` stores a pending login (`state`, `nonce`, provider, redirect) in
//! the browser session and sends the user to the provider. `code` consumes
//! the pending login only if the returned `state` matches, exchanges the
//! code, verifies the id_token, resolves the identity and decides where the
//! browser goes next.
//!
//! Outcomes are returned as [`LoginResponse`] values; [`crate::http`] turns
//! them into HTTP responses.

use std::sync::Arc;

use axum::http::StatusCode;
use jsonwebtoken::Algorithm;
use rand::Rng;
use serde_json::{Map, Value, json};
use url::Url;

use crate::error::{AuthError, AuthResult};
use crate::config::LoginConfig;
use crate::federation::{
    BearerKeys, ClaimBag, DiscoveryCache, EndpointClient, EndpointError, IdentityError,
    IdentityResolver, Provider, ProviderRegistry, TokenError, TokenShape, TokenVerifier,
    VerificationKey,
};
use crate::storage::{LoginSessionStorage, PendingLogin};

/// Length of generated `state` and `nonce` values.
pub const STATE_LENGTH: usize = 32;

const STATE_CHARSET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

const UNREACHABLE_PROVIDER: &str = "Could not reach the OpenID Connect provider.";

/// What the browser should receive.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginResponse {
    /// `302` with a `Location` header.
    Redirect(String),
    /// `200` HTML page refreshing to the URL (Safari session workaround).
    MetaRefresh(String),
    /// JSON body with the given status.
    Json { status: StatusCode, body: Value },
    /// Rendered error page.
    ErrorPage { status: StatusCode, message: String },
}

impl LoginResponse {
    fn unauthorized(reason: &str) -> Self {
        Self::Json {
            status: StatusCode::UNAUTHORIZED,
            body: json!([reason]),
        }
    }

    fn unknown_provider() -> Self {
        Self::ErrorPage {
            status: StatusCode::NOT_FOUND,
            message: "Unknown OpenID Connect provider.".to_string(),
        }
    }

    fn unreachable() -> Self {
        Self::ErrorPage {
            status: StatusCode::NOT_FOUND,
            message: UNREACHABLE_PROVIDER.to_string(),
        }
    }
}

/// Failures of the code callback.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// No pending login matches the returned `state`.
    #[error("invalid state")]
    StateMismatch,

    /// The pending login refers to a provider that no longer exists.
    #[error("Unknown provider {0}")]
    UnknownProvider(i64),

    /// The authorization code could not be exchanged.
    #[error("Token exchange failed: {0}")]
    Exchange(#[from] EndpointError),

    /// The token response carries no id_token.
    #[error("Token response without id_token")]
    MissingIdToken,

    /// The id_token failed verification.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The verified claims could not be resolved to a user.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Session or provider storage failed.
    #[error(transparent)]
    Storage(#[from] AuthError),
}

impl LoginError {
    /// Maps the failure to the browser response; storage failures stay errors.
    fn into_response(self) -> AuthResult<LoginResponse> {
        let response = match self {
            Self::StateMismatch => {
                tracing::debug!("State does not match a pending login");
                LoginResponse::Json {
                    status: StatusCode::FORBIDDEN,
                    body: json!(["invalid state"]),
                }
            }
            Self::UnknownProvider(provider_id) => {
                tracing::warn!(provider_id, "Pending login refers to unknown provider");
                LoginResponse::unknown_provider()
            }
            Self::Exchange(EndpointError::Discovery(e)) => {
                tracing::error!(error = %e, "Provider discovery failed during callback");
                LoginResponse::unreachable()
            }
            Self::Exchange(e) => {
                tracing::warn!(error = %e, "Token exchange failed");
                LoginResponse::unauthorized("token exchange failed")
            }
            Self::MissingIdToken => {
                tracing::warn!("Token response without id_token");
                LoginResponse::unauthorized("invalid token")
            }
            Self::Token(TokenError::KeysUnavailable(e)) => {
                tracing::error!(error = %e, "Provider keys unavailable");
                LoginResponse::unreachable()
            }
            Self::Token(e) => {
                tracing::warn!(error = %e, "Invalid id_token");
                LoginResponse::unauthorized(e.reason())
            }
            Self::Identity(IdentityError::AttributeValue(message)) => LoginResponse::Json {
                status: StatusCode::NOT_ACCEPTABLE,
                body: Value::String(message),
            },
            Self::Identity(IdentityError::Storage(e)) | Self::Storage(e) => return Err(e),
        };
        Ok(response)
    }
}

/// Generates a `state`/`nonce` value of digits and uppercase letters.
#[must_use]
pub fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    (0..STATE_LENGTH)
        .map(|_| STATE_CHARSET[rng.gen_range(0..STATE_CHARSET.len())] as char)
        .collect()
}

/// Whether the user agent needs the meta-refresh workaround.
#[must_use]
pub fn needs_meta_refresh(user_agent: Option<&str>) -> bool {
    user_agent.is_some_and(|ua| ua.contains("Safari") && !ua.contains("Chrome"))
}

/// The Authorization Code flow controller.
pub struct LoginFlow {
    registry: Arc<dyn ProviderRegistry>,
    discovery: Arc<DiscoveryCache>,
    endpoints: EndpointClient,
    verifier: TokenVerifier,
    identities: IdentityResolver,
    sessions: Arc<dyn LoginSessionStorage>,
    config: LoginConfig,
}

impl LoginFlow {
    #[must_use]
    pub fn new(
        registry: Arc<dyn ProviderRegistry>,
        discovery: Arc<DiscoveryCache>,
        endpoints: EndpointClient,
        verifier: TokenVerifier,
        identities: IdentityResolver,
        sessions: Arc<dyn LoginSessionStorage>,
        config: LoginConfig,
    ) -> Self {
        Self {
            registry,
            discovery,
            endpoints,
            verifier,
            identities,
            sessions,
            config,
        }
    }

    /// Login configuration.
    #[must_use]
    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    /// Starts a login at `provider_id`.
    ///
    /// A session that is already logged in is redirected without contacting
    /// the provider.
    ///
    /// # Errors
    ///
    /// Returns an error only if session or provider storage fails.
    pub async fn login(
        &self,
        session_id: &str,
        provider_id: i64,
        redirect_url: Option<&str>,
        user_agent: Option<&str>,
    ) -> AuthResult<LoginResponse> {
        if self.sessions.user_id(session_id).await?.is_some() {
            let target = redirect_url.unwrap_or(&self.config.default_page);
            return Ok(LoginResponse::Redirect(target.to_string()));
        }

        tracing::debug!(provider_id, "Initiating login");

        let Some(provider) = self.registry.provider(provider_id).await? else {
            tracing::warn!(provider_id, "Login requested for unknown provider");
            return Ok(LoginResponse::unknown_provider());
        };

        let document = match self.discovery.obtain_discovery(&provider).await {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(
                    provider = %provider.identifier,
                    url = %provider.discovery_endpoint,
                    error = %e,
                    "Could not reach provider"
                );
                return Ok(LoginResponse::unreachable());
            }
        };

        let Some(mut url) = document
            .authorization_endpoint()
            .and_then(|endpoint| Url::parse(endpoint).ok())
        else {
            tracing::error!(provider = %provider.identifier, "Discovery document has no usable authorization_endpoint");
            return Ok(LoginResponse::unreachable());
        };

        let state = generate_state();
        let nonce = generate_state();

        url.query_pairs_mut()
            .append_pair("client_id", &provider.client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", &provider.scope)
            .append_pair("redirect_uri", &self.config.callback_url)
            .append_pair("claims", &self.claims_request(&provider).to_string())
            .append_pair("state", &state)
            .append_pair("nonce", &nonce);

        self.sessions
            .store_pending(
                session_id,
                PendingLogin::new(state, nonce, provider.id, redirect_url.map(str::to_string)),
            )
            .await?;

        tracing::debug!(provider = %provider.identifier, "Redirecting user to authorization endpoint");

        let url = url.to_string();
        if needs_meta_refresh(user_agent) {
            Ok(LoginResponse::MetaRefresh(url))
        } else {
            Ok(LoginResponse::Redirect(url))
        }
    }

    /// Handles the provider callback.
    ///
    /// # Errors
    ///
    /// Returns an error only if session, provider or user storage fails.
    pub async fn code(&self, session_id: &str, state: &str, code: &str) -> AuthResult<LoginResponse> {
        match self.complete(session_id, state, code).await {
            Ok(response) => Ok(response),
            Err(e) => e.into_response(),
        }
    }

    async fn complete(
        &self,
        session_id: &str,
        state: &str,
        code: &str,
    ) -> Result<LoginResponse, LoginError> {
        let pending = self
            .sessions
            .consume_pending(session_id, state)
            .await?
            .ok_or(LoginError::StateMismatch)?;

        let provider = self
            .registry
            .provider(pending.provider_id)
            .await?
            .ok_or(LoginError::UnknownProvider(pending.provider_id))?;

        let tokens = self.endpoints.exchange_code(&provider, code).await?;
        let id_token = tokens.id_token.as_deref().ok_or(LoginError::MissingIdToken)?;
        let claims = self
            .verify_id_token(&provider, id_token, &pending.nonce)
            .await?;
        let claims = self
            .with_userinfo(&provider, claims, &tokens.access_token)
            .await;

        let resolution = self.identities.resolve(&provider, &claims).await?;
        let decision = resolution.decision;
        if let Some(user) = &resolution.user {
            tracing::info!(user_id = %user.user_id, reason = %decision.reason, "User accepted by OpenID web authorization");
            self.sessions.bind_user(session_id, &user.user_id).await?;
        } else {
            tracing::info!(reason = %decision.reason, "User rejected by OpenID web authorization");
        }

        if let Some(redirect) = decision.redirect_url {
            tracing::debug!(%redirect, "Custom redirect");
            Ok(LoginResponse::Redirect(redirect))
        } else if decision.access_allowed {
            let target = pending
                .redirect_url
                .unwrap_or_else(|| self.config.default_page.clone());
            Ok(LoginResponse::Redirect(target))
        } else {
            Ok(LoginResponse::unauthorized(&decision.reason))
        }
    }

    /// Ends the browser session and returns where to send the browser.
    ///
    /// The target is the logout provider's `logout_endpoint` when it can be
    /// discovered, otherwise the default page.
    ///
    /// # Errors
    ///
    /// Returns an error only if session or provider storage fails.
    pub async fn session_logout(&self, session_id: Option<&str>) -> AuthResult<String> {
        if let Some(session_id) = session_id {
            self.sessions.clear(session_id).await?;
        }

        let Some(provider) = self
            .registry
            .provider_by_identifier(&self.config.logout_provider)
            .await?
        else {
            return Ok(self.config.default_page.clone());
        };

        match self.discovery.obtain_discovery(&provider).await {
            Ok(document) => Ok(document
                .logout_endpoint()
                .map_or_else(|| self.config.default_page.clone(), str::to_string)),
            Err(e) => {
                tracing::warn!(provider = %provider.identifier, error = %e, "Logout endpoint not discoverable");
                Ok(self.config.default_page.clone())
            }
        }
    }

    /// Local user bound to the browser session.
    ///
    /// # Errors
    ///
    /// Returns an error if session storage fails.
    pub async fn session_user(&self, session_id: &str) -> AuthResult<Option<String>> {
        self.sessions.user_id(session_id).await
    }

    /// Fills mapped claims the id_token lacks from the userinfo endpoint.
    ///
    /// Userinfo for a different subject is ignored.
    async fn with_userinfo(
        &self,
        provider: &Provider,
        mut claims: ClaimBag,
        access_token: &str,
    ) -> ClaimBag {
        let settings = &provider.settings;
        let mapped = [
            &settings.mapping_uid,
            &settings.mapping_display_name,
            &settings.mapping_email,
            &settings.mapping_quota,
        ];
        if access_token.is_empty() || mapped.iter().all(|name| claims.get(name.as_str()).is_some()) {
            return claims;
        }

        let userinfo = self.endpoints.fetch_userinfo(provider, access_token).await;
        if userinfo.is_empty() {
            return claims;
        }
        if userinfo.get("sub").and_then(Value::as_str) != claims.sub() {
            tracing::warn!(provider = %provider.identifier, "Userinfo subject differs from id_token, ignoring userinfo");
            return claims;
        }
        claims.fill_missing(userinfo);
        claims
    }

    async fn verify_id_token(
        &self,
        provider: &Provider,
        id_token: &str,
        nonce: &str,
    ) -> Result<ClaimBag, TokenError> {
        let signed = match TokenShape::detect(id_token)? {
            TokenShape::Jwe => self
                .verifier
                .decrypt(id_token, &BearerKeys::for_provider(provider))?,
            TokenShape::Jws => id_token.to_string(),
        };

        let header = jsonwebtoken::decode_header(&signed)
            .map_err(|e| TokenError::invalid(format!("malformed JWS header: {e}")))?;

        if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            // HMAC-signed id_tokens use the client secret as key.
            self.verifier.verify_signature(
                &signed,
                VerificationKey::Secret(provider.client_secret.as_bytes()),
            )?;
        } else {
            let keys = self.discovery.obtain_jwks(provider).await?;
            self.verifier
                .verify_signature(&signed, VerificationKey::KeySet(&keys))?;
        }

        let claims = self.verifier.decode_claims(&signed)?;
        self.verifier
            .verify_claims(&claims, &[provider.client_id.as_str()], Some(nonce))?;
        Ok(claims)
    }

    /// The OIDC `claims` request parameter: every mapped claim plus the
    /// configured extra claims, requested with `null`.
    fn claims_request(&self, provider: &Provider) -> Value {
        let settings = &provider.settings;
        let mut requested = Map::new();
        for claim in [
            &settings.mapping_uid,
            &settings.mapping_display_name,
            &settings.mapping_email,
            &settings.mapping_quota,
        ]
        .into_iter()
        .chain(&self.config.extra_claims)
        {
            requested.insert(claim.clone(), Value::Null);
        }

        json!({
            "id_token": requested.clone(),
            "userinfo": requested,
        })
    }
}
