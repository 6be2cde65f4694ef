//! OpenID Connect discovery document.
//!
//! Providers in the field publish anything from a full OIDC Discovery 1.0
//! document to a bare `{"jwks_uri": ...}`, and some add non-standard entries
//! such as `logout_endpoint`. The document is therefore kept as a flat
//! string-keyed map with typed accessors for the endpoints this crate uses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Endpoint name for the authorization endpoint.
pub const AUTHORIZATION_ENDPOINT: &str = "authorization_endpoint";
/// Endpoint name for the token endpoint.
pub const TOKEN_ENDPOINT: &str = "token_endpoint";
/// Endpoint name for the userinfo endpoint.
pub const USERINFO_ENDPOINT: &str = "userinfo_endpoint";
/// Endpoint name for the token introspection endpoint.
pub const INTROSPECTION_ENDPOINT: &str = "introspection_endpoint";
/// Endpoint name for the key set location.
pub const JWKS_URI: &str = "jwks_uri";
/// Endpoint name for the provider logout page.
pub const LOGOUT_ENDPOINT: &str = "logout_endpoint";

/// A provider's discovery document.
///
/// # Example
///
/// ```ignore
/// use oidc_login_auth::federation::oidc::DiscoveryDocument;
///
/// let doc: DiscoveryDocument = serde_json::from_str(r#"{
///     "issuer": "https://auth.example.com",
///     "authorization_endpoint": "https://auth.example.com/authorize",
///     "jwks_uri": "https://auth.example.com/jwks"
/// }"#)?;
/// assert_eq!(doc.jwks_uri(), Some("https://auth.example.com/jwks"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscoveryDocument {
    entries: Map<String, Value>,
}

impl DiscoveryDocument {
    /// Creates a document from raw entries.
    #[must_use]
    pub fn from_entries(entries: Map<String, Value>) -> Self {
        Self { entries }
    }

    /// Returns a string entry by name.
    #[must_use]
    pub fn endpoint(&self, name: &str) -> Option<&str> {
        self.entries
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Returns the raw entry map.
    #[must_use]
    pub fn entries(&self) -> &Map<String, Value> {
        &self.entries
    }

    /// Issuer identifier, when published.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.endpoint("issuer")
    }

    /// Authorization endpoint.
    #[must_use]
    pub fn authorization_endpoint(&self) -> Option<&str> {
        self.endpoint(AUTHORIZATION_ENDPOINT)
    }

    /// Token endpoint.
    #[must_use]
    pub fn token_endpoint(&self) -> Option<&str> {
        self.endpoint(TOKEN_ENDPOINT)
    }

    /// Userinfo endpoint.
    #[must_use]
    pub fn userinfo_endpoint(&self) -> Option<&str> {
        self.endpoint(USERINFO_ENDPOINT)
    }

    /// Introspection endpoint.
    #[must_use]
    pub fn introspection_endpoint(&self) -> Option<&str> {
        self.endpoint(INTROSPECTION_ENDPOINT)
    }

    /// JWKS location.
    #[must_use]
    pub fn jwks_uri(&self) -> Option<&str> {
        self.endpoint(JWKS_URI)
    }

    /// Provider logout page, falling back to the RP-initiated logout endpoint.
    #[must_use]
    pub fn logout_endpoint(&self) -> Option<&str> {
        self.endpoint(LOGOUT_ENDPOINT)
            .or_else(|| self.endpoint("end_session_endpoint"))
    }

    /// Checks if the provider advertises support for the `claims` request parameter.
    ///
    /// Absent means unknown; the login flow sends `claims` regardless.
    #[must_use]
    pub fn supports_claims_parameter(&self) -> Option<bool> {
        self.entries
            .get("claims_parameter_supported")
            .and_then(Value::as_bool)
    }

    /// Checks if a signing algorithm is advertised for id tokens.
    #[must_use]
    pub fn supports_id_token_alg(&self, alg: &str) -> bool {
        self.entries
            .get("id_token_signing_alg_values_supported")
            .and_then(Value::as_array)
            .is_some_and(|algs| algs.iter().any(|a| a.as_str() == Some(alg)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_document() {
        let doc: DiscoveryDocument = serde_json::from_value(serde_json::json!({
            "issuer": "https://accounts.login.idm.telekom.com",
            "authorization_endpoint": "https://accounts.login.idm.telekom.com/oauth2/auth",
            "token_endpoint": "https://accounts.login.idm.telekom.com/oauth2/tokens",
            "userinfo_endpoint": "https://accounts.login.idm.telekom.com/oauth2/userinfo",
            "jwks_uri": "https://accounts.login.idm.telekom.com/oauth2/v1/certs",
            "logout_endpoint": "https://accounts.login.idm.telekom.com/oauth2/logout",
            "claims_parameter_supported": true,
            "id_token_signing_alg_values_supported": ["RS256", "ES256"]
        }))
        .unwrap();

        assert_eq!(doc.issuer(), Some("https://accounts.login.idm.telekom.com"));
        assert_eq!(
            doc.token_endpoint(),
            Some("https://accounts.login.idm.telekom.com/oauth2/tokens")
        );
        assert_eq!(
            doc.logout_endpoint(),
            Some("https://accounts.login.idm.telekom.com/oauth2/logout")
        );
        assert!(doc.introspection_endpoint().is_none());
        assert_eq!(doc.supports_claims_parameter(), Some(true));
        assert!(doc.supports_id_token_alg("ES256"));
        assert!(!doc.supports_id_token_alg("HS256"));
    }

    #[test]
    fn test_minimal_document() {
        let doc: DiscoveryDocument =
            serde_json::from_str(r#"{"jwks_uri": "https://idp.example.com/jwks"}"#).unwrap();

        assert_eq!(doc.jwks_uri(), Some("https://idp.example.com/jwks"));
        assert!(doc.authorization_endpoint().is_none());
        assert!(doc.supports_claims_parameter().is_none());
    }

    #[test]
    fn test_logout_falls_back_to_end_session() {
        let doc: DiscoveryDocument = serde_json::from_str(
            r#"{"end_session_endpoint": "https://idp.example.com/logout", "logout_endpoint": ""}"#,
        )
        .unwrap();
        assert_eq!(doc.logout_endpoint(), Some("https://idp.example.com/logout"));
    }

    #[test]
    fn test_non_string_entries_are_not_endpoints() {
        let doc: DiscoveryDocument =
            serde_json::from_str(r#"{"token_endpoint": 42}"#).unwrap();
        assert!(doc.token_endpoint().is_none());
        assert_eq!(doc.entries().len(), 1);
    }
}
