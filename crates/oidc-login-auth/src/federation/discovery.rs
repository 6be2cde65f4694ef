//! Discovery document and JWKS caching.
//!
//! # Overview
//!
//! [`DiscoveryCache`] fetches a provider's discovery document from its
//! configured `discovery_endpoint` and the key set published at `jwks_uri`,
//! and serves both from memory until their TTL runs out.
//!
//! Entries are keyed by provider (id and discovery URL), so providers never
//! see each other's keys. Concurrent misses may fetch twice; the later write
//! wins, which is harmless because the content is the same.
//!
//! A failed fetch is returned to the caller and leaves any previous entry in
//! place. Only [`DiscoveryCache::invalidate`] and
//! [`DiscoveryCache::invalidate_provider`] remove entries.
//!
//! # Example
//!
//! ```ignore
//! use oidc_login_auth::config::DiscoveryConfig;
//! use oidc_login_auth::federation::{DiscoveryCache, build_http_client};
//!
//! let config = DiscoveryConfig::default();
//! let cache = DiscoveryCache::new(build_http_client(&config)?, config);
//!
//! let doc = cache.obtain_discovery(&provider).await?;
//! let keys = cache.obtain_jwks(&provider).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use url::Url;

use crate::config::DiscoveryConfig;

use super::jwks::KeySet;
use super::oidc::DiscoveryDocument;
use super::provider::Provider;

/// Errors that can occur while fetching discovery documents or key sets.
///
/// Every variant means the provider is unreachable for this request.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// A network error occurred while fetching the document.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The response could not be parsed.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// A required field is missing from the discovery document.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A URL in the configuration or discovery document is invalid.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The URL scheme is not allowed (must be HTTPS in production).
    #[error("Invalid URL scheme: {0} (only HTTPS is allowed)")]
    InvalidScheme(String),

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: usize,
    },
}

/// Builds the HTTP client shared by the discovery cache and endpoint calls.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_http_client(config: &DiscoveryConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
}

/// Cache key: provider id plus discovery URL.
type CacheKey = (i64, String);

fn cache_key(provider: &Provider) -> CacheKey {
    (provider.id, provider.discovery_endpoint.as_str().to_string())
}

struct CachedEntry<T> {
    value: T,
    fetched_at: Instant,
    ttl: Duration,
}

impl<T: Clone> CachedEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
            ttl,
        }
    }

    fn fresh(&self) -> Option<T> {
        (self.fetched_at.elapsed() < self.ttl).then(|| self.value.clone())
    }

    fn is_expired(&self) -> bool {
        self.fetched_at.elapsed() >= self.ttl
    }
}

/// Per-provider cache of discovery documents and key sets.
pub struct DiscoveryCache {
    http_client: reqwest::Client,
    config: DiscoveryConfig,
    documents: Arc<RwLock<HashMap<CacheKey, CachedEntry<DiscoveryDocument>>>>,
    key_sets: Arc<RwLock<HashMap<CacheKey, CachedEntry<KeySet>>>>,
}

impl DiscoveryCache {
    /// Creates a cache using the given HTTP client.
    #[must_use]
    pub fn new(http_client: reqwest::Client, config: DiscoveryConfig) -> Self {
        Self {
            http_client,
            config,
            documents: Arc::new(RwLock::new(HashMap::new())),
            key_sets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The configured default TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Returns the provider's discovery document with the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the document has to be fetched and the fetch fails.
    pub async fn obtain_discovery(
        &self,
        provider: &Provider,
    ) -> Result<DiscoveryDocument, DiscoveryError> {
        self.obtain_discovery_with_ttl(provider, self.config.ttl)
            .await
    }

    /// Returns the provider's discovery document, caching a fresh fetch for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document has to be fetched and the fetch fails.
    pub async fn obtain_discovery_with_ttl(
        &self,
        provider: &Provider,
        ttl: Duration,
    ) -> Result<DiscoveryDocument, DiscoveryError> {
        let key = cache_key(provider);

        {
            let cache = self.documents.read().await;
            if let Some(entry) = cache.get(&key) {
                if let Some(document) = entry.fresh() {
                    tracing::trace!(provider = %provider.identifier, "Cache hit for discovery document");
                    return Ok(document);
                }
                tracing::trace!(provider = %provider.identifier, "Cached discovery document expired");
            }
        }

        tracing::debug!(
            provider = %provider.identifier,
            url = %provider.discovery_endpoint,
            "Fetching discovery document"
        );
        let body = self.fetch(&provider.discovery_endpoint).await?;
        let document: DiscoveryDocument = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(provider = %provider.identifier, error = %e, "Failed to parse discovery document");
            DiscoveryError::ParseError(e.to_string())
        })?;

        self.documents
            .write()
            .await
            .insert(key, CachedEntry::new(document.clone(), ttl));

        Ok(document)
    }

    /// Returns the provider's key set with the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the discovery document or the key set cannot be fetched.
    pub async fn obtain_jwks(&self, provider: &Provider) -> Result<KeySet, DiscoveryError> {
        self.obtain_jwks_with_ttl(provider, self.config.ttl).await
    }

    /// Returns the provider's key set, caching a fresh fetch for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the discovery document or the key set cannot be fetched.
    pub async fn obtain_jwks_with_ttl(
        &self,
        provider: &Provider,
        ttl: Duration,
    ) -> Result<KeySet, DiscoveryError> {
        let key = cache_key(provider);

        {
            let cache = self.key_sets.read().await;
            if let Some(keys) = cache.get(&key).and_then(CachedEntry::fresh) {
                tracing::trace!(provider = %provider.identifier, "Cache hit for JWKS");
                return Ok(keys);
            }
        }

        let document = self.obtain_discovery_with_ttl(provider, ttl).await?;
        let jwks_uri = document
            .jwks_uri()
            .ok_or_else(|| DiscoveryError::MissingField("jwks_uri".to_string()))?;
        let jwks_uri = Url::parse(jwks_uri)
            .map_err(|e| DiscoveryError::InvalidUrl(format!("{}: {}", jwks_uri, e)))?;

        tracing::debug!(provider = %provider.identifier, url = %jwks_uri, "Fetching JWKS");
        let body = self.fetch(&jwks_uri).await?;
        let keys = KeySet::from_slice(&body).map_err(|e| {
            tracing::warn!(provider = %provider.identifier, error = %e, "Failed to parse JWKS");
            DiscoveryError::ParseError(e.to_string())
        })?;

        tracing::debug!(provider = %provider.identifier, keys = keys.len(), "Cached JWKS");
        self.key_sets
            .write()
            .await
            .insert(key, CachedEntry::new(keys.clone(), ttl));

        Ok(keys)
    }

    /// Returns the cached document regardless of expiry, without fetching.
    pub async fn cached_discovery(&self, provider: &Provider) -> Option<DiscoveryDocument> {
        self.documents
            .read()
            .await
            .get(&cache_key(provider))
            .map(|entry| entry.value.clone())
    }

    /// Clears all discovery documents and key sets.
    pub async fn invalidate(&self) {
        self.documents.write().await.clear();
        self.key_sets.write().await.clear();
        tracing::debug!("Discovery cache invalidated");
    }

    /// Clears the entries of one provider.
    pub async fn invalidate_provider(&self, provider_id: i64) {
        self.documents
            .write()
            .await
            .retain(|(id, _), _| *id != provider_id);
        self.key_sets
            .write()
            .await
            .retain(|(id, _), _| *id != provider_id);
        tracing::debug!(provider_id, "Discovery cache invalidated for provider");
    }

    /// Removes expired entries.
    pub async fn cleanup(&self) {
        self.documents
            .write()
            .await
            .retain(|_, entry| !entry.is_expired());
        self.key_sets
            .write()
            .await
            .retain(|_, entry| !entry.is_expired());
    }

    /// Number of cached discovery documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Whether no discovery documents are cached.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, DiscoveryError> {
        self.validate_scheme(url)?;

        let response = self
            .http_client
            .get(url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %url, error = %e, "Provider request failed");
                DiscoveryError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            tracing::warn!(url = %url, status = response.status().as_u16(), "Provider returned error status");
            return Err(DiscoveryError::HttpError(response.status().as_u16()));
        }

        let max_size = self.config.max_response_size;
        if let Some(len) = response.content_length()
            && len as usize > max_size
        {
            return Err(DiscoveryError::ResponseTooLarge { max_size });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DiscoveryError::NetworkError(e.to_string()))?;
        if body.len() > max_size {
            return Err(DiscoveryError::ResponseTooLarge { max_size });
        }

        Ok(body.to_vec())
    }

    fn validate_scheme(&self, url: &Url) -> Result<(), DiscoveryError> {
        match url.scheme() {
            "https" => Ok(()),
            "http" if self.config.allow_http => Ok(()),
            other => Err(DiscoveryError::InvalidScheme(other.to_string())),
        }
    }
}
