//! OpenID Connect provider federation.
//!
//! This module provides the token verification and identity pipeline:
//!
//! - Provider configuration and registry
//! - Discovery document and JWKS fetching and caching
//! - JWS/JWE token verification and claim validation
//! - Multi-provider bearer token matching
//! - Claim-to-attribute mapping with override policies
//! - Backend user resolution
//! - Token, userinfo and introspection endpoint calls

pub mod claims;
pub mod discovery;
pub mod endpoints;
pub mod error;
pub mod identity;
pub mod jwks;
pub mod mapping;
pub mod matcher;
pub mod oidc;
pub mod policy;
pub mod provider;
pub mod verifier;

pub use claims::ClaimBag;
pub use discovery::{DiscoveryCache, DiscoveryError, build_http_client};
pub use endpoints::{EndpointClient, TokenResponse};
pub use error::{EndpointError, IdentityError, TokenError};
pub use identity::{IdentityResolution, IdentityResolver};
pub use jwks::KeySet;
pub use mapping::{AttributeMapper, MappedAttributes};
pub use matcher::{MatchOutcome, ProviderMatch, ProviderMatcher};
pub use oidc::DiscoveryDocument;
pub use policy::{
    AccountCandidate, AccountDecisionPolicy, AttributeKind, AttributeOverridePolicy, PolicyChain,
    PolicyVerdict, UserAccountChangeResult,
};
pub use provider::{Provider, ProviderRegistry, ProviderSettings, StaticProviderRegistry};
pub use verifier::{BearerKeys, TokenShape, TokenVerifier, VerificationKey};
