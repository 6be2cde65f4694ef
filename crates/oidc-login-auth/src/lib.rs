//! # oidc-login-auth
//!
//! OpenID Connect login and bearer token authentication.
//!
//! This crate provides:
//! - Authorization Code login against configured OpenID Connect providers
//! - Stateless bearer authentication across several providers
//! - JWS and JWE token verification with cached discovery and JWKS
//! - Claim-to-attribute mapping with pluggable override policies
//! - Backend user provisioning
//!
//! ## Modules
//!
//! - [`config`] - Discovery, token, login and bearer configuration
//! - [`federation`] - Providers, discovery, verification, mapping and identity resolution
//! - [`storage`] - Storage traits and in-memory implementations
//! - [`bearer`] - Bearer gate and axum extractor
//! - [`login`] - Authorization Code flow controller
//! - [`http`] - Axum handlers and router

pub mod bearer;
pub mod config;
pub mod error;
pub mod federation;
pub mod http;
pub mod login;
pub mod storage;

#[cfg(test)]
mod testing;

pub use bearer::{BearerError, BearerGate, BearerIdentity, bearer_token};
pub use config::{AuthConfig, BearerConfig, ConfigError, DiscoveryConfig, LoginConfig, TokenConfig};
pub use error::{AuthError, AuthResult};
pub use http::{AppState, router};
pub use login::{LoginError, LoginFlow, LoginResponse};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use oidc_login_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bearer::{BearerGate, BearerIdentity};
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, AuthResult};
    pub use crate::federation::{
        AccountCandidate, AccountDecisionPolicy, AttributeKind, AttributeOverridePolicy,
        ClaimBag, PolicyChain, PolicyVerdict, Provider, ProviderRegistry, ProviderSettings,
        StaticProviderRegistry, UserAccountChangeResult,
    };
    pub use crate::http::{AppState, router};
    pub use crate::login::LoginFlow;
    pub use crate::storage::{
        BackendUser, InMemoryLoginSessionStorage, InMemoryUserStorage, LoginSessionStorage,
        UserStorage,
    };
}
