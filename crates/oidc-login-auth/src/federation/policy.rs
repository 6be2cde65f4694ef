//! Override policies for attribute mapping and account decisions.
//!
//! Deployments inject business rules as ordered chains of policies. Each
//! policy sees the current proposal and returns a [`PolicyVerdict`]:
//!
//! - `PassThrough` keeps the proposal and continues with the next policy.
//! - `Override(value)` replaces the proposal and continues.
//! - `Halt(value)` replaces the proposal and stops the chain.
//!
//! Plain closures implement both policy traits.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::claims::ClaimBag;
use super::provider::{
    SETTING_MAPPING_DISPLAYNAME, SETTING_MAPPING_EMAIL, SETTING_MAPPING_QUOTA, SETTING_MAPPING_UID,
};

/// Outcome of a single policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyVerdict<T> {
    /// Keep the current value, continue with the next policy.
    PassThrough,
    /// Replace the value, continue with the next policy.
    Override(T),
    /// Replace the value and stop the chain.
    Halt(T),
}

/// The local attribute being mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// Local user id.
    Uid,
    /// Display name.
    DisplayName,
    /// Email address.
    Email,
    /// Storage quota.
    Quota,
}

impl AttributeKind {
    /// Provider setting name that configures the source claim.
    #[must_use]
    pub fn setting_name(self) -> &'static str {
        match self {
            Self::Uid => SETTING_MAPPING_UID,
            Self::DisplayName => SETTING_MAPPING_DISPLAYNAME,
            Self::Email => SETTING_MAPPING_EMAIL,
            Self::Quota => SETTING_MAPPING_QUOTA,
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.setting_name())
    }
}

/// Rewrites a mapped attribute value.
pub trait AttributeOverridePolicy: Send + Sync {
    /// Inspects `proposed` for `kind` and decides whether to replace it.
    fn map_attribute(
        &self,
        kind: AttributeKind,
        claims: &ClaimBag,
        proposed: Option<&str>,
    ) -> PolicyVerdict<Option<String>>;
}

impl<F> AttributeOverridePolicy for F
where
    F: Fn(AttributeKind, &ClaimBag, Option<&str>) -> PolicyVerdict<Option<String>> + Send + Sync,
{
    fn map_attribute(
        &self,
        kind: AttributeKind,
        claims: &ClaimBag,
        proposed: Option<&str>,
    ) -> PolicyVerdict<Option<String>> {
        self(kind, claims, proposed)
    }
}

/// Outcome of the account decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccountChangeResult {
    /// Whether the user may log in.
    pub access_allowed: bool,
    /// Short reason for the decision.
    pub reason: String,
    /// Alternate redirect target, honoured for interactive logins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl UserAccountChangeResult {
    /// An allowing result.
    #[must_use]
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            access_allowed: true,
            reason: reason.into(),
            redirect_url: None,
        }
    }

    /// A denying result.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            access_allowed: false,
            reason: reason.into(),
            redirect_url: None,
        }
    }

    /// Sets the redirect URL.
    #[must_use]
    pub fn with_redirect(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }
}

impl Default for UserAccountChangeResult {
    /// Deny with reason `default`; the state before any mapping step ran.
    fn default() -> Self {
        Self::deny("default")
    }
}

/// Mapped attributes offered to account policies.
#[derive(Debug, Clone, Copy)]
pub struct AccountCandidate<'a> {
    /// Provider the token was verified against.
    pub provider_id: i64,
    /// Mapped uid.
    pub uid: &'a str,
    /// Mapped display name.
    pub display_name: Option<&'a str>,
    /// Mapped email.
    pub email: Option<&'a str>,
    /// Mapped quota.
    pub quota: Option<&'a str>,
    /// Verified claims.
    pub claims: &'a ClaimBag,
}

/// Decides whether an account may log in.
pub trait AccountDecisionPolicy: Send + Sync {
    /// Inspects the candidate and the current result.
    fn decide(
        &self,
        candidate: &AccountCandidate<'_>,
        current: &UserAccountChangeResult,
    ) -> PolicyVerdict<UserAccountChangeResult>;
}

impl<F> AccountDecisionPolicy for F
where
    F: Fn(&AccountCandidate<'_>, &UserAccountChangeResult) -> PolicyVerdict<UserAccountChangeResult>
        + Send
        + Sync,
{
    fn decide(
        &self,
        candidate: &AccountCandidate<'_>,
        current: &UserAccountChangeResult,
    ) -> PolicyVerdict<UserAccountChangeResult> {
        self(candidate, current)
    }
}

/// Ordered attribute and account policies.
#[derive(Clone, Default)]
pub struct PolicyChain {
    attribute_policies: Vec<Arc<dyn AttributeOverridePolicy>>,
    account_policies: Vec<Arc<dyn AccountDecisionPolicy>>,
}

impl fmt::Debug for PolicyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyChain")
            .field("attribute_policies", &self.attribute_policies.len())
            .field("account_policies", &self.account_policies.len())
            .finish()
    }
}

impl PolicyChain {
    /// An empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attribute policy.
    #[must_use]
    pub fn with_attribute_policy(mut self, policy: impl AttributeOverridePolicy + 'static) -> Self {
        self.attribute_policies.push(Arc::new(policy));
        self
    }

    /// Appends an account policy.
    #[must_use]
    pub fn with_account_policy(mut self, policy: impl AccountDecisionPolicy + 'static) -> Self {
        self.account_policies.push(Arc::new(policy));
        self
    }

    /// Runs the attribute policies over `proposed`.
    #[must_use]
    pub fn apply_attribute(
        &self,
        kind: AttributeKind,
        claims: &ClaimBag,
        proposed: Option<String>,
    ) -> Option<String> {
        let mut value = proposed;
        for policy in &self.attribute_policies {
            match policy.map_attribute(kind, claims, value.as_deref()) {
                PolicyVerdict::PassThrough => {}
                PolicyVerdict::Override(next) => value = next,
                PolicyVerdict::Halt(next) => {
                    tracing::debug!(attribute = %kind, "Attribute policy halted the chain");
                    return next;
                }
            }
        }
        value
    }

    /// Runs the account policies starting from `base`.
    #[must_use]
    pub fn decide_account(
        &self,
        candidate: &AccountCandidate<'_>,
        base: UserAccountChangeResult,
    ) -> UserAccountChangeResult {
        let mut result = base;
        for policy in &self.account_policies {
            match policy.decide(candidate, &result) {
                PolicyVerdict::PassThrough => {}
                PolicyVerdict::Override(next) => result = next,
                PolicyVerdict::Halt(next) => return next,
            }
        }
        result
    }
}
