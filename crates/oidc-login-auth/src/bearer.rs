//! Stateless bearer authentication.
//!
//! [`BearerGate::resolve_identity`] is the whole contract for API callers:
//! take the raw authorization header, find the provider whose keys fit the
//! token, validate it, and map it to a local user id. [`BearerGate::resolve`]
//! flattens every failure to the empty-string sentinel, and the
//! [`BearerIdentity`] extractor rejects with 401.

use std::sync::{Arc, LazyLock};

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use regex::Regex;

use crate::config::BearerConfig;
use crate::error::AuthError;
use crate::federation::{
    IdentityError, IdentityResolver, ProviderMatch, ProviderMatcher, ProviderRegistry,
};

static BEARER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*bearer(?:\s+|$)").expect("Invalid bearer regex"));

/// Errors of the bearer gate.
#[derive(Debug, thiserror::Error)]
pub enum BearerError {
    /// The header does not use the bearer scheme.
    #[error("Not a bearer authorization")]
    NotBearer,

    /// The bearer scheme is present but the token is empty.
    #[error("Authorization header without bearer token")]
    EmptyToken,

    /// No provider's keys fit the token.
    #[error("No provider accepted the bearer token")]
    NoMatchingProvider,

    /// The token failed validation for the provider whose keys fit.
    #[error("Invalid bearer token for {provider}: {reason}")]
    InvalidToken {
        /// Provider identifier.
        provider: String,
        /// Validation failure.
        reason: String,
    },

    /// The account decision denied access.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The claims could not be mapped to a user.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Providers could not be listed.
    #[error(transparent)]
    Registry(#[from] AuthError),
}

impl From<BearerError> for AuthError {
    fn from(err: BearerError) -> Self {
        match err {
            BearerError::NotBearer => AuthError::unauthorized("Not a bearer authorization"),
            BearerError::Identity(e) => e.into(),
            BearerError::Registry(e) => e,
            other => AuthError::unauthorized(other.to_string()),
        }
    }
}

/// Returns the token following a case-insensitive `Bearer` scheme, trimmed.
///
/// Returns `None` if the header does not use the bearer scheme.
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    BEARER_PREFIX
        .find(header)
        .map(|prefix| header[prefix.end()..].trim())
}

/// Resolves bearer tokens to local user ids.
pub struct BearerGate {
    registry: Arc<dyn ProviderRegistry>,
    matcher: ProviderMatcher,
    identities: IdentityResolver,
    config: BearerConfig,
}

impl BearerGate {
    #[must_use]
    pub fn new(
        registry: Arc<dyn ProviderRegistry>,
        matcher: ProviderMatcher,
        identities: IdentityResolver,
        config: BearerConfig,
    ) -> Self {
        Self {
            registry,
            matcher,
            identities,
            config,
        }
    }

    /// Name of the request header carrying the bearer token.
    #[must_use]
    pub fn header_name(&self) -> &str {
        &self.config.header
    }

    /// Resolves a raw authorization header to a local user id.
    ///
    /// No provider is contacted and no account is touched unless the header
    /// carries a non-empty bearer token, and no account is touched unless the
    /// token validates.
    ///
    /// # Errors
    ///
    /// Returns a [`BearerError`] describing why no user was resolved.
    pub async fn resolve_identity(&self, header: &str) -> Result<String, BearerError> {
        let token = bearer_token(header).ok_or(BearerError::NotBearer)?;
        if token.is_empty() {
            return Err(BearerError::EmptyToken);
        }

        let providers = self.registry.providers().await?;
        let (provider, claims) = match self.matcher.find_match(&providers, token).await {
            ProviderMatch::Found { provider, claims } => (provider, claims),
            ProviderMatch::NoMatch => return Err(BearerError::NoMatchingProvider),
            ProviderMatch::Invalid { provider, reason } => {
                return Err(BearerError::InvalidToken { provider, reason });
            }
        };

        let resolution = self.identities.resolve(&provider, &claims).await?;
        match resolution.user {
            Some(user) => Ok(user.user_id),
            None => Err(BearerError::AccessDenied(resolution.decision.reason)),
        }
    }

    /// Like [`Self::resolve_identity`], returning `""` on any failure.
    pub async fn resolve(&self, header: &str) -> String {
        match self.resolve_identity(header).await {
            Ok(user_id) => user_id,
            Err(BearerError::NotBearer) => String::new(),
            Err(BearerError::EmptyToken) => {
                tracing::warn!("Authorization header without bearer token received");
                String::new()
            }
            Err(e @ (BearerError::Identity(_) | BearerError::Registry(_))) => {
                tracing::error!(error = %e, "Bearer identity resolution failed");
                String::new()
            }
            Err(e) => {
                tracing::info!(error = %e, "Bearer token rejected");
                String::new()
            }
        }
    }
}

/// Extractor yielding the local user id of a valid bearer token.
///
/// Requires `Arc<BearerGate>` to be extractable from the router state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerIdentity(pub String);

impl<S> FromRequestParts<S> for BearerIdentity
where
    S: Send + Sync,
    Arc<BearerGate>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = Arc::<BearerGate>::from_ref(state);
        let header = parts
            .headers
            .get(gate.header_name())
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();

        match gate.resolve_identity(header).await {
            Ok(user_id) => Ok(Self(user_id)),
            Err(BearerError::EmptyToken) => {
                tracing::warn!("Authorization header without bearer token received");
                Err(AuthError::unauthorized("Not authenticated"))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use url::Url;

    use super::*;
    use crate::AuthResult;
    use crate::config::DiscoveryConfig;
    use crate::federation::{
        AccountCandidate, DiscoveryCache, PolicyChain, PolicyVerdict, Provider,
        StaticProviderRegistry, TokenVerifier, UserAccountChangeResult, build_http_client,
    };
    use crate::storage::InMemoryUserStorage;
    use crate::testing::{BEARER_SECRET, encoded_secret, encrypt_pbes2, now, sam_claims, sign_hs256};

    /// Registry counting how often providers were listed.
    struct CountingRegistry {
        inner: StaticProviderRegistry,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProviderRegistry for CountingRegistry {
        async fn providers(&self) -> AuthResult<Vec<Provider>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.providers().await
        }
    }

    fn telekom(client_id: &str) -> Provider {
        Provider::new(
            1,
            "Telekom",
            client_id,
            Url::parse("http://127.0.0.1:9/.well-known/openid-configuration").unwrap(),
        )
        .with_bearer_secret(encoded_secret(BEARER_SECRET))
    }

    fn gate_with(
        providers: Vec<Provider>,
        policies: PolicyChain,
    ) -> (BearerGate, Arc<CountingRegistry>, Arc<InMemoryUserStorage>) {
        let registry = Arc::new(CountingRegistry {
            inner: StaticProviderRegistry::new(providers),
            calls: AtomicUsize::new(0),
        });
        let users = Arc::new(InMemoryUserStorage::new());
        let config = DiscoveryConfig::default().with_allow_http(true);
        let cache = DiscoveryCache::new(build_http_client(&config).unwrap(), config);
        let matcher = ProviderMatcher::new(Arc::new(cache), TokenVerifier::new(Duration::from_secs(60)));
        let identities = IdentityResolver::new(users.clone(), Arc::new(policies));
        let gate = BearerGate::new(registry.clone(), matcher, identities, BearerConfig::default());
        (gate, registry, users)
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("  bEaReR   abc  "), Some("abc"));
        assert_eq!(bearer_token("Bearer "), Some(""));
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        // Header values arrive with trailing whitespace stripped.
        assert_eq!(bearer_token("Bearer"), Some(""));
        assert_eq!(bearer_token("Bearerabc"), None);
        assert_eq!(bearer_token(""), None);
    }

    #[tokio::test]
    async fn test_empty_token_makes_no_attempt() {
        let (gate, registry, users) = gate_with(vec![telekom("CLIENT_A")], PolicyChain::new());

        assert!(matches!(
            gate.resolve_identity("Bearer ").await,
            Err(BearerError::EmptyToken)
        ));
        assert_eq!(gate.resolve("Bearer ").await, "");
        assert!(matches!(
            gate.resolve_identity("bearer").await,
            Err(BearerError::EmptyToken)
        ));
        assert_eq!(registry.calls.load(Ordering::SeqCst), 0);
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn test_non_bearer_header_is_ignored() {
        let (gate, registry, _) = gate_with(vec![telekom("CLIENT_A")], PolicyChain::new());

        assert!(matches!(
            gate.resolve_identity("Basic dXNlcjpwYXNz").await,
            Err(BearerError::NotBearer)
        ));
        assert_eq!(registry.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_plain_jws_resolves_user() {
        let (gate, _, users) = gate_with(vec![telekom("CLIENT_A")], PolicyChain::new());
        let token = sign_hs256(
            &json!({"sub": "jgyros", "exp": now() + 7200, "aud": ["CLIENT_A"]}),
            BEARER_SECRET,
        );

        let header = format!("Bearer {token}");
        assert_eq!(gate.resolve(&header).await, "jgyros");
        assert_eq!(gate.resolve(&header).await, "jgyros");
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn test_encrypted_sam_token_resolves_user() {
        let client_id = "10TVL0SAM30000004901NEXTMAGENTACLOUDTEST";
        let provider = telekom(client_id).with_settings(
            crate::federation::ProviderSettings::default()
                .with_mapping_uid("urn:telekom.com:anid")
                .with_mapping_display_name("urn:telekom.com:displayname"),
        );
        let (gate, _, _) = gate_with(vec![provider], PolicyChain::new());

        let jws = sign_hs256(&sam_claims(client_id, "1200490100000000100XXXXX"), BEARER_SECRET);
        let jwe = encrypt_pbes2(&jws, BEARER_SECRET, true);

        assert_eq!(
            gate.resolve_identity(&format!("bearer {jwe}")).await.unwrap(),
            "120049010000000010239960"
        );
    }

    #[tokio::test]
    async fn test_invalid_token_yields_sentinel() {
        let (gate, _, users) = gate_with(vec![telekom("CLIENT_A")], PolicyChain::new());
        let expired = sign_hs256(
            &json!({"sub": "jgyros", "exp": now() - 3600, "aud": "CLIENT_A"}),
            BEARER_SECRET,
        );

        assert!(matches!(
            gate.resolve_identity(&format!("Bearer {expired}")).await,
            Err(BearerError::InvalidToken { .. })
        ));
        assert_eq!(gate.resolve(&format!("Bearer {expired}")).await, "");
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_signer_yields_no_match() {
        let (gate, _, _) = gate_with(vec![telekom("CLIENT_A")], PolicyChain::new());
        let token = sign_hs256(&json!({"sub": "x", "aud": "CLIENT_A"}), b"unrelated-signing-secret");

        assert!(matches!(
            gate.resolve_identity(&format!("Bearer {token}")).await,
            Err(BearerError::NoMatchingProvider)
        ));
    }

    #[tokio::test]
    async fn test_denied_account_yields_sentinel() {
        let policies = PolicyChain::new().with_account_policy(
            |_: &AccountCandidate<'_>, _: &UserAccountChangeResult| {
                PolicyVerdict::Halt(UserAccountChangeResult::deny("blocked"))
            },
        );
        let (gate, _, users) = gate_with(vec![telekom("CLIENT_A")], policies);
        let token = sign_hs256(&json!({"sub": "jgyros", "aud": "CLIENT_A"}), BEARER_SECRET);

        assert!(matches!(
            gate.resolve_identity(&format!("Bearer {token}")).await,
            Err(BearerError::AccessDenied(reason)) if reason == "blocked"
        ));
        assert!(users.is_empty());
    }

    #[test]
    fn test_error_conversion() {
        let err: AuthError = BearerError::NotBearer.into();
        assert_eq!(err.message(), "Not a bearer authorization");

        let err: AuthError = BearerError::Identity(IdentityError::attribute_value("no uid")).into();
        assert!(matches!(err, AuthError::NotAcceptable { .. }));
    }
}
