//! Trusted OIDC provider configuration.
//!
//! A [`Provider`] carries everything needed to talk to one identity provider:
//! client credentials, the discovery URL, the bearer secret for partner JOSE
//! tokens and the typed attribute-mapping [`ProviderSettings`].
//!
//! # Example
//!
//! ```ignore
//! use oidc_login_auth::federation::provider::{Provider, ProviderSettings};
//! use url::Url;
//!
//! let provider = Provider::new(
//!     2,
//!     "Telekom",
//!     "10TVL0SAM30000004901NEXTMAGENTACLOUDTEST",
//!     Url::parse("https://accounts.login.idm.telekom.com/.well-known/openid-configuration")?,
//! )
//! .with_client_secret("secret")
//! .with_bearer_secret("SlExN0M5OUEtRjBDOQ")
//! .with_settings(ProviderSettings::default().with_mapping_display_name("urn:telekom.com:displayname"));
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AuthResult;

/// Setting name for the uid source claim.
pub const SETTING_MAPPING_UID: &str = "mappingUid";
/// Setting name for the display name source claim.
pub const SETTING_MAPPING_DISPLAYNAME: &str = "mappingDisplayName";
/// Setting name for the email source claim.
pub const SETTING_MAPPING_EMAIL: &str = "mappingEmail";
/// Setting name for the quota source claim.
pub const SETTING_MAPPING_QUOTA: &str = "mappingQuota";
/// Setting name for the unique-uid flag.
pub const SETTING_UNIQUE_UID: &str = "uniqueUid";
/// Setting name for the opaque bearer introspection flag.
pub const SETTING_INTROSPECT_BEARER: &str = "introspectBearer";

/// A trusted OpenID Connect provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    /// Numeric provider id, used to key settings and backend users.
    pub id: i64,

    /// Unique human-chosen identifier (e.g. "Telekom").
    pub identifier: String,

    /// OAuth client id registered with the provider.
    pub client_id: String,

    /// OAuth client secret.
    #[serde(default)]
    pub client_secret: String,

    /// Base64url-encoded symmetric secret for bearer JOSE tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_secret: Option<String>,

    /// Private JWK (JSON) for RSA-OAEP-256 / ECDH-ES+A256KW wrapped bearer tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_decryption_key: Option<String>,

    /// Full URL of the provider's discovery document.
    pub discovery_endpoint: Url,

    /// Space-separated scopes requested at login.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Attribute-mapping settings.
    #[serde(default)]
    pub settings: ProviderSettings,
}

fn default_scope() -> String {
    "openid email profile".to_string()
}

impl Provider {
    /// Creates a provider with the required fields.
    #[must_use]
    pub fn new(
        id: i64,
        identifier: impl Into<String>,
        client_id: impl Into<String>,
        discovery_endpoint: Url,
    ) -> Self {
        Self {
            id,
            identifier: identifier.into(),
            client_id: client_id.into(),
            client_secret: String::new(),
            bearer_secret: None,
            bearer_decryption_key: None,
            discovery_endpoint,
            scope: default_scope(),
            settings: ProviderSettings::default(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = secret.into();
        self
    }

    /// Sets the base64url-encoded bearer secret.
    #[must_use]
    pub fn with_bearer_secret(mut self, secret: impl Into<String>) -> Self {
        self.bearer_secret = Some(secret.into());
        self
    }

    /// Sets the private JWK used to unwrap asymmetric JWE bearer tokens.
    #[must_use]
    pub fn with_bearer_decryption_key(mut self, jwk_json: impl Into<String>) -> Self {
        self.bearer_decryption_key = Some(jwk_json.into());
        self
    }

    /// Sets the requested scopes.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Sets the attribute-mapping settings.
    #[must_use]
    pub fn with_settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns the decoded bearer secret bytes.
    ///
    /// Trailing `=` padding is tolerated. A secret that is not valid base64url
    /// yields `None` and the provider cannot verify symmetric bearer tokens.
    #[must_use]
    pub fn bearer_key(&self) -> Option<Vec<u8>> {
        let secret = self.bearer_secret.as_deref()?.trim().trim_end_matches('=');
        if secret.is_empty() {
            return None;
        }
        match URL_SAFE_NO_PAD.decode(secret) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(provider = %self.identifier, error = %e, "Bearer secret is not valid base64url");
                None
            }
        }
    }
}

/// Typed per-provider attribute-mapping settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Claim holding the user id.
    pub mapping_uid: String,

    /// Claim holding the display name.
    pub mapping_display_name: String,

    /// Claim holding the email address.
    pub mapping_email: String,

    /// Claim holding the quota.
    pub mapping_quota: String,

    /// Key backend users by uid alone instead of (provider id, uid).
    pub unique_uid: bool,

    /// Send opaque (non-JWT) bearer tokens to the provider's introspection
    /// endpoint.
    pub introspect_bearer: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            mapping_uid: "sub".to_string(),
            mapping_display_name: "name".to_string(),
            mapping_email: "email".to_string(),
            mapping_quota: "quota".to_string(),
            unique_uid: false,
            introspect_bearer: false,
        }
    }
}

impl ProviderSettings {
    /// Sets the uid claim.
    #[must_use]
    pub fn with_mapping_uid(mut self, claim: impl Into<String>) -> Self {
        self.mapping_uid = claim.into();
        self
    }

    /// Sets the display name claim.
    #[must_use]
    pub fn with_mapping_display_name(mut self, claim: impl Into<String>) -> Self {
        self.mapping_display_name = claim.into();
        self
    }

    /// Sets the email claim.
    #[must_use]
    pub fn with_mapping_email(mut self, claim: impl Into<String>) -> Self {
        self.mapping_email = claim.into();
        self
    }

    /// Sets the quota claim.
    #[must_use]
    pub fn with_mapping_quota(mut self, claim: impl Into<String>) -> Self {
        self.mapping_quota = claim.into();
        self
    }

    /// Sets the unique-uid flag.
    #[must_use]
    pub fn with_unique_uid(mut self, unique: bool) -> Self {
        self.unique_uid = unique;
        self
    }

    /// Enables introspection of opaque bearer tokens.
    #[must_use]
    pub fn with_introspect_bearer(mut self, enabled: bool) -> Self {
        self.introspect_bearer = enabled;
        self
    }

    /// Builds settings from key-value rows named `provider-{id}-{settingName}`.
    ///
    /// Rows for other providers are ignored; empty values keep the default.
    #[must_use]
    pub fn from_key_values<'a, I>(provider_id: i64, rows: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let prefix = format!("provider-{}-", provider_id);
        let values: HashMap<&str, &str> = rows
            .into_iter()
            .filter_map(|(key, value)| Some((key.strip_prefix(prefix.as_str())?, value)))
            .filter(|(_, value)| !value.is_empty())
            .collect();

        let mut settings = Self::default();
        if let Some(v) = values.get(SETTING_MAPPING_UID) {
            settings.mapping_uid = (*v).to_string();
        }
        if let Some(v) = values.get(SETTING_MAPPING_DISPLAYNAME) {
            settings.mapping_display_name = (*v).to_string();
        }
        if let Some(v) = values.get(SETTING_MAPPING_EMAIL) {
            settings.mapping_email = (*v).to_string();
        }
        if let Some(v) = values.get(SETTING_MAPPING_QUOTA) {
            settings.mapping_quota = (*v).to_string();
        }
        if let Some(v) = values.get(SETTING_UNIQUE_UID) {
            settings.unique_uid = matches!(*v, "1" | "true");
        }
        if let Some(v) = values.get(SETTING_INTROSPECT_BEARER) {
            settings.introspect_bearer = matches!(*v, "1" | "true");
        }
        settings
    }
}

/// Read-only source of provider records.
///
/// Providers are returned in registry order; the bearer gate tries them in
/// that order.
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    /// Lists all providers in registry order.
    async fn providers(&self) -> AuthResult<Vec<Provider>>;

    /// Looks up a provider by numeric id.
    async fn provider(&self, id: i64) -> AuthResult<Option<Provider>> {
        Ok(self.providers().await?.into_iter().find(|p| p.id == id))
    }

    /// Looks up a provider by identifier.
    async fn provider_by_identifier(&self, identifier: &str) -> AuthResult<Option<Provider>> {
        Ok(self
            .providers()
            .await?
            .into_iter()
            .find(|p| p.identifier == identifier))
    }
}

/// Registry over a fixed list of providers, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticProviderRegistry {
    providers: Vec<Provider>,
}

impl StaticProviderRegistry {
    /// Creates a registry from providers in the given order.
    #[must_use]
    pub fn new(providers: Vec<Provider>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl ProviderRegistry for StaticProviderRegistry {
    async fn providers(&self) -> AuthResult<Vec<Provider>> {
        Ok(self.providers.clone())
    }
}
