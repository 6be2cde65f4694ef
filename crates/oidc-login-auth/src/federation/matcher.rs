//! Multi-provider bearer token matching.
//!
//! A bearer token carries no trustworthy hint about its issuer, so each
//! provider is tried in registry order. Only a wrong-key failure moves on to
//! the next provider; any other failure ends the search.
//!
//! Opaque tokens (neither JWS nor JWE) can only be checked by the issuer.
//! When introspection is enabled they are sent to the introspection endpoint
//! of each provider with `introspect_bearer` set; the first provider
//! reporting the token active decides.

use std::sync::Arc;

use jsonwebtoken::Algorithm;
use serde_json::Value;

use super::claims::ClaimBag;
use super::discovery::DiscoveryCache;
use super::endpoints::EndpointClient;
use super::error::TokenError;
use super::provider::Provider;
use super::verifier::{BearerKeys, TokenShape, TokenVerifier, VerificationKey};

/// Result of trying one provider.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// The token is valid for the provider.
    Matched(ClaimBag),
    /// The token was not issued with this provider's keys.
    WrongKey,
    /// The token is invalid; no other provider should be tried.
    Invalid(String),
}

/// Result of trying all providers.
#[derive(Debug, Clone)]
pub enum ProviderMatch {
    /// A provider accepted the token.
    Found {
        provider: Provider,
        claims: ClaimBag,
    },
    /// No provider's keys fit the token.
    NoMatch,
    /// A provider's keys fit but the token failed validation.
    Invalid {
        /// Identifier of the provider that stopped the search.
        provider: String,
        reason: String,
    },
}

/// Tries bearer tokens against providers.
#[derive(Clone)]
pub struct ProviderMatcher {
    discovery: Arc<DiscoveryCache>,
    verifier: TokenVerifier,
    introspection: Option<EndpointClient>,
}

impl ProviderMatcher {
    #[must_use]
    pub fn new(discovery: Arc<DiscoveryCache>, verifier: TokenVerifier) -> Self {
        Self {
            discovery,
            verifier,
            introspection: None,
        }
    }

    /// Enables introspection of opaque tokens through `endpoints`.
    #[must_use]
    pub fn with_introspection(mut self, endpoints: EndpointClient) -> Self {
        self.introspection = Some(endpoints);
        self
    }

    /// Tries `providers` in order until one matches or reports the token invalid.
    pub async fn find_match(&self, providers: &[Provider], token: &str) -> ProviderMatch {
        if TokenShape::detect(token).is_err()
            && let Some(endpoints) = &self.introspection
        {
            let introspecting: Vec<&Provider> = providers
                .iter()
                .filter(|p| p.settings.introspect_bearer)
                .collect();
            if !introspecting.is_empty() {
                return self.find_introspected(endpoints, &introspecting, token).await;
            }
        }

        for provider in providers {
            match self.attempt(provider, token).await {
                MatchOutcome::Matched(claims) => {
                    tracing::debug!(provider = %provider.identifier, "Bearer token matched provider");
                    return ProviderMatch::Found {
                        provider: provider.clone(),
                        claims,
                    };
                }
                MatchOutcome::WrongKey => continue,
                MatchOutcome::Invalid(reason) => {
                    return ProviderMatch::Invalid {
                        provider: provider.identifier.clone(),
                        reason,
                    };
                }
            }
        }

        tracing::info!(providers = providers.len(), "No provider accepted the bearer token");
        ProviderMatch::NoMatch
    }

    /// Runs decrypt, signature, decode and claim checks for one provider.
    pub async fn attempt(&self, provider: &Provider, token: &str) -> MatchOutcome {
        match self.verify(provider, token).await {
            Ok(claims) => MatchOutcome::Matched(claims),
            Err(e) if e.is_wrong_key() => {
                tracing::debug!(provider = %provider.identifier, error = %e, "Token not signed for provider");
                MatchOutcome::WrongKey
            }
            Err(e) => {
                if e.is_claim_error() {
                    tracing::info!(provider = %provider.identifier, error = %e, "Bearer token claims rejected");
                } else {
                    tracing::warn!(provider = %provider.identifier, error = %e, "Invalid bearer token");
                }
                MatchOutcome::Invalid(e.to_string())
            }
        }
    }

    async fn find_introspected(
        &self,
        endpoints: &EndpointClient,
        providers: &[&Provider],
        token: &str,
    ) -> ProviderMatch {
        for provider in providers {
            let mut response = endpoints.introspect(provider, token).await;
            if response.get("active").and_then(Value::as_bool) != Some(true) {
                tracing::debug!(provider = %provider.identifier, "Token not active at provider");
                continue;
            }

            // Responses without `aud` are bound to the client they were issued to.
            if !response.contains_key("aud")
                && let Some(client_id) = response.get("client_id").cloned()
            {
                response.insert("aud".to_string(), client_id);
            }

            let claims = ClaimBag::new(response);
            return match self
                .verifier
                .verify_claims(&claims, &[provider.client_id.as_str()], None)
            {
                Ok(()) => {
                    tracing::debug!(provider = %provider.identifier, "Opaque bearer token introspected");
                    ProviderMatch::Found {
                        provider: (*provider).clone(),
                        claims,
                    }
                }
                Err(e) => {
                    tracing::info!(provider = %provider.identifier, error = %e, "Introspected token rejected");
                    ProviderMatch::Invalid {
                        provider: provider.identifier.clone(),
                        reason: e.to_string(),
                    }
                }
            };
        }

        tracing::info!(providers = providers.len(), "No provider reported the opaque token active");
        ProviderMatch::NoMatch
    }

    async fn verify(&self, provider: &Provider, token: &str) -> Result<ClaimBag, TokenError> {
        let keys = BearerKeys::for_provider(provider);

        let signed = match TokenShape::detect(token)? {
            TokenShape::Jwe => self.verifier.decrypt(token, &keys)?,
            TokenShape::Jws => token.to_string(),
        };

        let header = jsonwebtoken::decode_header(&signed)
            .map_err(|e| TokenError::invalid(format!("malformed JWS header: {e}")))?;

        if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            let secret = keys
                .secret()
                .ok_or_else(|| TokenError::signature("provider has no bearer secret"))?;
            self.verifier
                .verify_signature(&signed, VerificationKey::Secret(secret))?;
        } else {
            let key_set = self.discovery.obtain_jwks(provider).await?;
            self.verifier
                .verify_signature(&signed, VerificationKey::KeySet(&key_set))?;
        }

        let claims = self.verifier.decode_claims(&signed)?;
        self.verifier
            .verify_claims(&claims, &[provider.client_id.as_str()], None)?;
        Ok(claims)
    }
}
