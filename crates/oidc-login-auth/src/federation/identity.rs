//! Identity resolution.
//!
//! Turns verified claims into an access decision and, when access is
//! granted, a backend user record:
//!
//! 1. Map uid, display name, email and quota ([`AttributeMapper`]).
//! 2. Run the account decision: the result starts as a denial with reason
//!    `default`, the built-in mapping step grants access, then the
//!    [`AccountDecisionPolicy`](super::policy::AccountDecisionPolicy) chain runs.
//! 3. On allow, get or create the backend user and write changed attributes.
//!
//! A denied account is never created or updated.
//!
//! Local user ids are the bare uid. A provider-scoped uid whose bare id is
//! already owned by another record gets `{provider_id}_{uid}` instead, so two
//! providers issuing the same `sub` never share a local user. If that id is
//! taken as well, resolution fails.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::storage::{BackendUser, UserEntry, UserKey, UserStorage};

use super::claims::ClaimBag;
use super::error::IdentityError;
use super::mapping::{AttributeMapper, MappedAttributes};
use super::policy::{AccountCandidate, PolicyChain, UserAccountChangeResult};
use super::provider::Provider;

/// Outcome of resolving one token.
#[derive(Debug, Clone)]
pub struct IdentityResolution {
    /// The account decision.
    pub decision: UserAccountChangeResult,
    /// The backend user, present only when access was allowed.
    pub user: Option<BackendUser>,
}

impl IdentityResolution {
    /// Local user id when access was allowed.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.user_id.as_str())
    }
}

/// Maps claims to backend users through the configured policies.
#[derive(Clone)]
pub struct IdentityResolver {
    users: Arc<dyn UserStorage>,
    mapper: AttributeMapper,
    policies: Arc<PolicyChain>,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

impl IdentityResolver {
    /// Creates a resolver storing users in `users`.
    #[must_use]
    pub fn new(users: Arc<dyn UserStorage>, policies: Arc<PolicyChain>) -> Self {
        Self {
            users,
            mapper: AttributeMapper::new(policies.clone()),
            policies,
        }
    }

    /// The attribute mapper.
    #[must_use]
    pub fn mapper(&self) -> &AttributeMapper {
        &self.mapper
    }

    /// Decides whether the candidate may log in.
    #[must_use]
    pub fn change_user_account(&self, candidate: &AccountCandidate<'_>) -> UserAccountChangeResult {
        let granted = UserAccountChangeResult {
            access_allowed: true,
            ..UserAccountChangeResult::default()
        };
        self.policies.decide_account(candidate, granted)
    }

    /// Resolves verified `claims` of `provider` to a local identity.
    ///
    /// # Errors
    ///
    /// - `AttributeValue` if no uid can be determined.
    /// - `Storage` if the user store fails.
    pub async fn resolve(
        &self,
        provider: &Provider,
        claims: &ClaimBag,
    ) -> Result<IdentityResolution, IdentityError> {
        let attributes = self.mapper.map(provider, claims);
        let uid = attributes
            .uid
            .as_deref()
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| IdentityError::attribute_value("cannot determine userId from token"))?;

        let candidate = AccountCandidate {
            provider_id: provider.id,
            uid,
            display_name: attributes.display_name.as_deref(),
            email: attributes.email.as_deref(),
            quota: attributes.quota.as_deref(),
            claims,
        };
        let decision = self.change_user_account(&candidate);

        if !decision.access_allowed {
            tracing::info!(
                provider = %provider.identifier,
                uid,
                reason = %decision.reason,
                "Account access denied"
            );
            return Ok(IdentityResolution {
                decision,
                user: None,
            });
        }

        let user = self.upsert(provider, uid, &attributes).await?;
        Ok(IdentityResolution {
            decision,
            user: Some(user),
        })
    }

    async fn upsert(
        &self,
        provider: &Provider,
        uid: &str,
        attributes: &MappedAttributes,
    ) -> Result<BackendUser, IdentityError> {
        let key = UserKey::for_provider(provider.id, provider.settings.unique_uid, uid);

        let mut entry = self
            .users
            .get_or_create(&key, new_user(uid, provider, attributes))
            .await?;
        if entry == UserEntry::IdTaken && key.provider_id.is_some() {
            let qualified = format!("{}_{uid}", provider.id);
            tracing::info!(
                provider = %provider.identifier,
                uid,
                user_id = %qualified,
                "Uid already bound to another account, using provider-qualified user id"
            );
            entry = self
                .users
                .get_or_create(&key, new_user(&qualified, provider, attributes))
                .await?;
        }

        let mut user = match entry {
            UserEntry::Created(user) => {
                tracing::info!(provider = %provider.identifier, user_id = %user.user_id, "Created backend user");
                return Ok(user);
            }
            UserEntry::Existing(user) => user,
            UserEntry::IdTaken => {
                tracing::warn!(provider = %provider.identifier, uid, "No free local user id for uid");
                return Err(IdentityError::attribute_value(format!(
                    "user id {uid} is already bound to another account"
                )));
            }
        };

        // Only write when a mapped value differs from the stored one.
        let changed = [
            replace_if_changed(&mut user.display_name, attributes.display_name.as_deref()),
            replace_if_changed(&mut user.email, attributes.email.as_deref()),
            replace_if_changed(&mut user.quota, attributes.quota.as_deref()),
        ]
        .contains(&true);

        if changed {
            user.updated_at = OffsetDateTime::now_utc();
            self.users.update(&key, &user).await?;
            tracing::debug!(user_id = %user.user_id, "Updated backend user attributes");
        }

        Ok(user)
    }
}

fn new_user(user_id: &str, provider: &Provider, attributes: &MappedAttributes) -> BackendUser {
    let mut user = BackendUser::new(user_id, provider.id);
    user.display_name = attributes.display_name.clone();
    user.email = attributes.email.clone();
    user.quota = attributes.quota.clone();
    user
}

fn replace_if_changed(slot: &mut Option<String>, value: Option<&str>) -> bool {
    match value {
        Some(value) if slot.as_deref() != Some(value) => {
            *slot = Some(value.to_string());
            true
        }
        _ => false,
    }
}
