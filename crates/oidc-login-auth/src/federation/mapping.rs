//! Claim-to-attribute mapping.
//!
//! Each local attribute is read from the claim named in the provider's
//! [`ProviderSettings`](super::provider::ProviderSettings) and then passed
//! through the attribute policy chain.

use std::sync::Arc;

use serde_json::Value;

use super::claims::ClaimBag;
use super::policy::{AttributeKind, PolicyChain};
use super::provider::Provider;

/// Maximum display name length in characters.
pub const MAX_DISPLAY_NAME_CHARS: usize = 255;

/// Attribute values mapped from one token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedAttributes {
    pub uid: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub quota: Option<String>,
}

/// Maps verified claims to local account attributes.
#[derive(Debug, Clone, Default)]
pub struct AttributeMapper {
    policies: Arc<PolicyChain>,
}

impl AttributeMapper {
    /// Creates a mapper running `policies` after each lookup.
    #[must_use]
    pub fn new(policies: Arc<PolicyChain>) -> Self {
        Self { policies }
    }

    /// Maps every attribute.
    #[must_use]
    pub fn map(&self, provider: &Provider, claims: &ClaimBag) -> MappedAttributes {
        MappedAttributes {
            uid: self.determine_uid(provider, claims),
            display_name: self.determine_display_name(provider, claims),
            email: self.determine_email(provider, claims),
            quota: self.determine_quota(provider, claims),
        }
    }

    pub fn determine_uid(&self, provider: &Provider, claims: &ClaimBag) -> Option<String> {
        let proposed = claim_string(claims, &provider.settings.mapping_uid);
        self.policies.apply_attribute(AttributeKind::Uid, claims, proposed)
    }

    /// Display name, truncated to [`MAX_DISPLAY_NAME_CHARS`] before the policies run.
    pub fn determine_display_name(&self, provider: &Provider, claims: &ClaimBag) -> Option<String> {
        let proposed = claim_string(claims, &provider.settings.mapping_display_name)
            .map(|name| name.chars().take(MAX_DISPLAY_NAME_CHARS).collect());
        self.policies
            .apply_attribute(AttributeKind::DisplayName, claims, proposed)
    }

    pub fn determine_email(&self, provider: &Provider, claims: &ClaimBag) -> Option<String> {
        let proposed = claim_string(claims, &provider.settings.mapping_email);
        self.policies.apply_attribute(AttributeKind::Email, claims, proposed)
    }

    pub fn determine_quota(&self, provider: &Provider, claims: &ClaimBag) -> Option<String> {
        let proposed = claim_string(claims, &provider.settings.mapping_quota);
        self.policies.apply_attribute(AttributeKind::Quota, claims, proposed)
    }
}

/// Reads a claim as a string. Numbers and booleans are stringified; null,
/// arrays and objects yield `None`.
fn claim_string(claims: &ClaimBag, name: &str) -> Option<String> {
    match claims.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => {
            tracing::debug!(claim = name, kind = json_kind(other), "Ignoring non-scalar claim");
            None
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        _ => "scalar",
    }
}
