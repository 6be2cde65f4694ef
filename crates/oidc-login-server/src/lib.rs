//! # oidc-login-server
//!
//! HTTP server exposing OpenID Connect login, logout and bearer diagnostics.
//! Providers and settings come from a TOML file layered with `OIDC_LOGIN__*`
//! environment overrides.

pub mod config;
pub mod observability;
pub mod server;

pub use config::{AppConfig, LoggingConfig, ServerConfig};
pub use observability::{apply_logging_level, init_tracing};
pub use server::{OidcLoginServer, ServerBuilder, build_app, build_state};
