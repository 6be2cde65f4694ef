//! Calls to provider endpoints published in the discovery document.
//!
//! - Token endpoint: authorization code exchange.
//! - Userinfo endpoint: additional claims for an access token.
//! - Introspection endpoint: server-side token inspection.
//!
//! Userinfo and introspection are best-effort: failures are logged and an
//! empty map is returned.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::discovery::DiscoveryCache;
use super::error::EndpointError;
use super::oidc::{INTROSPECTION_ENDPOINT, TOKEN_ENDPOINT, USERINFO_ENDPOINT};
use super::provider::Provider;

/// OAuth token response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default)]
    pub token_type: Option<String>,

    #[serde(default)]
    pub expires_in: Option<u64>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    /// The ID token (JWT). Required for interactive login.
    #[serde(default)]
    pub id_token: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,
}

/// OAuth error response from the provider.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Client for provider token, userinfo and introspection endpoints.
#[derive(Clone)]
pub struct EndpointClient {
    http_client: reqwest::Client,
    discovery: Arc<DiscoveryCache>,
    redirect_uri: String,
}

impl EndpointClient {
    /// Creates a client sending `redirect_uri` in code exchanges.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        discovery: Arc<DiscoveryCache>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            discovery,
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails, the provider has no token
    /// endpoint, the request fails, or the provider rejects the code.
    pub async fn exchange_code(
        &self,
        provider: &Provider,
        code: &str,
    ) -> Result<TokenResponse, EndpointError> {
        let document = self.discovery.obtain_discovery(provider).await?;
        let token_endpoint = document
            .token_endpoint()
            .ok_or(EndpointError::MissingEndpoint(TOKEN_ENDPOINT))?;

        let params = [
            ("code", code),
            ("client_id", provider.client_id.as_str()),
            ("client_secret", provider.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        tracing::debug!(provider = %provider.identifier, endpoint = %token_endpoint, "Exchanging authorization code");

        let response = self
            .http_client
            .post(token_endpoint)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(oauth_error) = serde_json::from_str::<OAuthErrorResponse>(&body) {
                return Err(EndpointError::oauth(
                    oauth_error.error,
                    oauth_error.error_description.unwrap_or_default(),
                ));
            }
            return Err(EndpointError::Http {
                status: status.as_u16(),
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| EndpointError::Parse(e.to_string()))
    }

    /// Fetches userinfo claims for `access_token`.
    ///
    /// Returns an empty map on any failure.
    pub async fn fetch_userinfo(&self, provider: &Provider, access_token: &str) -> Map<String, Value> {
        let result: Result<_, EndpointError> = async {
            let url = self.endpoint(provider, USERINFO_ENDPOINT).await?;
            let response = self
                .http_client
                .get(url)
                .bearer_auth(access_token)
                .send()
                .await?;
            read_object(response).await
        }
        .await;

        result.unwrap_or_else(|e| {
            tracing::warn!(provider = %provider.identifier, error = %e, "Userinfo request failed");
            Map::new()
        })
    }

    /// Introspects `token` with the provider's client credentials.
    ///
    /// Returns an empty map on any failure.
    pub async fn introspect(&self, provider: &Provider, token: &str) -> Map<String, Value> {
        let result: Result<_, EndpointError> = async {
            let url = self.endpoint(provider, INTROSPECTION_ENDPOINT).await?;
            let credentials =
                STANDARD.encode(format!("{}:{}", provider.client_id, provider.client_secret));
            let response = self
                .http_client
                .post(url)
                .header(reqwest::header::AUTHORIZATION, credentials)
                .form(&[("token", token)])
                .send()
                .await?;
            read_object(response).await
        }
        .await;

        result.unwrap_or_else(|e| {
            tracing::warn!(provider = %provider.identifier, error = %e, "Introspection request failed");
            Map::new()
        })
    }

    async fn endpoint(
        &self,
        provider: &Provider,
        name: &'static str,
    ) -> Result<String, EndpointError> {
        let document = self.discovery.obtain_discovery(provider).await?;
        document
            .endpoint(name)
            .map(str::to_string)
            .ok_or(EndpointError::MissingEndpoint(name))
    }
}

async fn read_object(response: reqwest::Response) -> Result<Map<String, Value>, EndpointError> {
    let status = response.status();
    if !status.is_success() {
        return Err(EndpointError::Http {
            status: status.as_u16(),
        });
    }
    match response.json::<Value>().await {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(EndpointError::Parse("expected a JSON object".to_string())),
        Err(e) => Err(EndpointError::Parse(e.to_string())),
    }
}
