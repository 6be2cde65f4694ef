//! Authentication configuration.
//!
//! All sections use `#[serde(default)]`, so a partial TOML table only needs
//! the values it overrides.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth.discovery]
//! ttl = "4h"
//! request_timeout = "10s"
//!
//! [auth.tokens]
//! leeway = "60s"
//!
//! [auth.login]
//! callback_url = "https://cloud.example.com/code"
//! default_page = "/apps/files"
//!
//! [auth.bearer]
//! header = "Authorization"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Root authentication configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Discovery document and JWKS caching.
    pub discovery: DiscoveryConfig,

    /// Token validation settings.
    pub tokens: TokenConfig,

    /// Interactive login flow settings.
    pub login: LoginConfig,

    /// Bearer token gate settings.
    pub bearer: BearerConfig,
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery.ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "discovery.ttl must be greater than zero".to_string(),
            ));
        }

        if self.discovery.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "discovery.request_timeout must be greater than zero".to_string(),
            ));
        }

        if self.tokens.max_pbes2_count == 0 {
            return Err(ConfigError::InvalidValue(
                "tokens.max_pbes2_count must be greater than zero".to_string(),
            ));
        }

        if let Err(e) = Url::parse(&self.login.callback_url) {
            return Err(ConfigError::InvalidValue(format!(
                "login.callback_url '{}' is not a valid URL: {}",
                self.login.callback_url, e
            )));
        }

        if self.login.session_cookie.is_empty() {
            return Err(ConfigError::InvalidValue(
                "login.session_cookie cannot be empty".to_string(),
            ));
        }

        if self.bearer.header.is_empty() {
            return Err(ConfigError::InvalidValue(
                "bearer.header cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Discovery cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// How long discovery documents and key sets are served from the cache.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// HTTP request timeout for provider calls.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Maximum accepted response size in bytes.
    pub max_response_size: usize,

    /// Whether plain `http://` provider URLs are accepted.
    /// This should only be enabled for testing.
    pub allow_http: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(4 * 3600),
            request_timeout: Duration::from_secs(10),
            max_response_size: 1024 * 1024,
            allow_http: false,
        }
    }
}

impl DiscoveryConfig {
    /// Sets the cache TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum response size.
    #[must_use]
    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    /// Allows HTTP (non-HTTPS) provider URLs.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }
}

/// Token validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Clock-skew leeway applied to `nbf`, `iat` and `exp`.
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,

    /// Largest PBES2 `p2c` accepted in a JWE header. Tokens above it are
    /// rejected before any key derivation.
    pub max_pbes2_count: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            leeway: Duration::from_secs(60),
            max_pbes2_count: 10_000,
        }
    }
}

/// Interactive login configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Absolute URL of the `/code` callback, sent as `redirect_uri`.
    pub callback_url: String,

    /// Landing page after login when no redirect was requested.
    pub default_page: String,

    /// Claims requested in addition to the mapped attributes.
    pub extra_claims: Vec<String>,

    /// Identifier of the provider whose `logout_endpoint` ends the SSO session.
    pub logout_provider: String,

    /// Name of the browser session cookie.
    pub session_cookie: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            callback_url: "http://localhost:8080/code".to_string(),
            default_page: "/".to_string(),
            extra_claims: vec!["urn:telekom.com:all".to_string()],
            logout_provider: "Telekom".to_string(),
            session_cookie: "oidc_login_session".to_string(),
        }
    }
}

/// Bearer gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BearerConfig {
    /// Request header carrying `Bearer <token>`.
    pub header: String,
}

impl Default for BearerConfig {
    fn default() -> Self {
        Self {
            header: "Authorization".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
