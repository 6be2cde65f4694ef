//! Provider key sets.
//!
//! A [`KeySet`] wraps the JWKS published at a provider's `jwks_uri` and
//! selects the verification keys usable for a given JWS header. Fetching and
//! caching happen in [`super::discovery::DiscoveryCache`].

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey, Header};

/// A provider's JSON Web Key Set.
#[derive(Debug, Clone)]
pub struct KeySet {
    keys: JwkSet,
}

impl KeySet {
    /// Wraps a parsed key set.
    #[must_use]
    pub fn new(keys: JwkSet) -> Self {
        Self { keys }
    }

    /// Parses a JWKS document.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the body is not a key set.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(Self {
            keys: serde_json::from_slice(body)?,
        })
    }

    /// Finds a key by `kid`.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.find(kid)
    }

    /// Returns all keys not restricted to encryption.
    #[must_use]
    pub fn signing_keys(&self) -> Vec<&Jwk> {
        self.keys
            .keys
            .iter()
            .filter(|k| !matches!(&k.common.public_key_use, Some(PublicKeyUse::Encryption)))
            .collect()
    }

    /// Number of keys in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.keys.len()
    }

    /// Whether the set has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.keys.is_empty()
    }

    /// Returns the decoding keys eligible to verify a token with `header`.
    ///
    /// With a `kid`, only that key is eligible. Without one, every signing
    /// key whose declared algorithm (if any) equals the header's is tried.
    /// Keys that cannot be converted are skipped.
    #[must_use]
    pub fn candidates(&self, header: &Header) -> Vec<DecodingKey> {
        let keys: Vec<&Jwk> = match header.kid.as_deref() {
            Some(kid) => self.find(kid).into_iter().collect(),
            None => self.signing_keys(),
        };

        keys.into_iter()
            .filter(|jwk| jwk_algorithm(jwk).is_none_or(|alg| alg == header.alg))
            .filter_map(|jwk| match DecodingKey::from_jwk(jwk) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::debug!(
                        kid = jwk.common.key_id.as_deref().unwrap_or(""),
                        error = %e,
                        "Skipping unusable JWK"
                    );
                    None
                }
            })
            .collect()
    }
}

/// Maps a JWK's declared algorithm to a JWS algorithm.
pub(crate) fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}
