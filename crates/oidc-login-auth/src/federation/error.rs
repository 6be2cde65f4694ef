//! Error types for token verification, identity resolution and provider
//! endpoint calls.
//!
//! The split between [`TokenError::Signature`] and [`TokenError::InvalidToken`]
//! drives the provider matcher: a signature (or key-unwrap) failure means the
//! token belongs to some other provider, while an invalid token stops the
//! search.

use crate::error::AuthError;

use super::discovery::DiscoveryError;

/// Errors raised while decrypting, verifying or validating a token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The signature does not verify with the offered key material.
    #[error("Signature verification failed: {0}")]
    Signature(String),

    /// The JWE could not be unwrapped or decrypted with the offered key material.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// The token is malformed, uses an unsupported algorithm, or violates a
    /// timing or audience rule.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The `nonce` claim does not equal the session nonce.
    #[error("Nonce mismatch: token nonce does not match the session nonce")]
    NonceMismatch,

    /// The audience does not contain the provider's client id.
    #[error("Audience mismatch: token audience does not include {client_id}")]
    AudienceMismatch {
        /// The client id that was expected.
        client_id: String,
    },

    /// Provider keys could not be obtained.
    #[error("Key material unavailable: {0}")]
    KeysUnavailable(#[from] DiscoveryError),
}

impl TokenError {
    /// Creates a `Signature` error.
    #[must_use]
    pub fn signature(message: impl Into<String>) -> Self {
        Self::Signature(message.into())
    }

    /// Creates an `InvalidToken` error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidToken(message.into())
    }

    /// Returns `true` if the token was verified against the wrong key.
    ///
    /// These are the only failures after which another provider may be tried.
    #[must_use]
    pub fn is_wrong_key(&self) -> bool {
        matches!(self, Self::Signature(_) | Self::Decryption(_))
    }

    /// Returns `true` if this is a claim validation failure.
    #[must_use]
    pub fn is_claim_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken(_) | Self::NonceMismatch | Self::AudienceMismatch { .. }
        )
    }

    /// Short reason suitable for a 401 response body.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NonceMismatch => "invalid nonce",
            Self::AudienceMismatch { .. } => "invalid audience",
            Self::KeysUnavailable(_) => "provider keys unavailable",
            Self::Signature(_) | Self::Decryption(_) | Self::InvalidToken(_) => "invalid token",
        }
    }
}

/// Errors raised while turning verified claims into a local identity.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// A required attribute (the uid) could not be resolved from the claims.
    #[error("Attribute value error: {0}")]
    AttributeValue(String),

    /// The backend user store failed.
    #[error(transparent)]
    Storage(#[from] AuthError),
}

impl IdentityError {
    /// Creates an `AttributeValue` error.
    #[must_use]
    pub fn attribute_value(message: impl Into<String>) -> Self {
        Self::AttributeValue(message.into())
    }
}

/// Errors raised by calls to provider endpoints (token, userinfo, introspection).
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The discovery document could not be obtained.
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// The discovery document does not publish the endpoint.
    #[error("Provider does not publish {0}")]
    MissingEndpoint(&'static str),

    /// A network error occurred.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("HTTP error: status {status}")]
    Http {
        /// Response status code.
        status: u16,
    },

    /// The provider returned an OAuth error body.
    #[error("OAuth error from provider: {error} - {description}")]
    OAuth {
        /// OAuth error code.
        error: String,
        /// Optional error description.
        description: String,
    },

    /// The response body could not be parsed.
    #[error("Failed to parse provider response: {0}")]
    Parse(String),
}

impl EndpointError {
    /// Creates an `OAuth` error from the provider's response.
    #[must_use]
    pub fn oauth(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::OAuth {
            error: error.into(),
            description: description.into(),
        }
    }
}
