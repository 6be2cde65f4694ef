//! Backend user storage trait.
//!
//! A backend user links a provider uid to a stable local user id and caches
//! the mapped display name, email and quota.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;

/// Lookup key of a backend user.
///
/// Uids are scoped to their provider unless the provider declares them
/// globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserKey {
    /// Provider scope, `None` for globally unique uids.
    pub provider_id: Option<i64>,
    /// Mapped uid.
    pub uid: String,
}

impl UserKey {
    /// Key scoped to one provider.
    #[must_use]
    pub fn scoped(provider_id: i64, uid: impl Into<String>) -> Self {
        Self {
            provider_id: Some(provider_id),
            uid: uid.into(),
        }
    }

    /// Key for a uid that is unique across providers.
    #[must_use]
    pub fn global(uid: impl Into<String>) -> Self {
        Self {
            provider_id: None,
            uid: uid.into(),
        }
    }

    /// Builds the key according to the provider's unique-uid flag.
    #[must_use]
    pub fn for_provider(provider_id: i64, unique_uid: bool, uid: impl Into<String>) -> Self {
        if unique_uid {
            Self::global(uid)
        } else {
            Self::scoped(provider_id, uid)
        }
    }
}

/// A federated user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendUser {
    /// Stable local user id.
    pub user_id: String,

    /// Provider that first created the record.
    pub provider_id: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl BackendUser {
    /// Creates an empty record for `user_id`.
    #[must_use]
    pub fn new(user_id: impl Into<String>, provider_id: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            user_id: user_id.into(),
            provider_id,
            display_name: None,
            email: None,
            quota: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of [`UserStorage::get_or_create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEntry {
    /// A record already existed for the key.
    Existing(BackendUser),
    /// The record was created by this call.
    Created(BackendUser),
    /// No record exists for the key and the requested local user id is
    /// owned by another key. Nothing was stored.
    IdTaken,
}

/// Storage trait for backend users.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Finds a user by key.
    async fn find(&self, key: &UserKey) -> AuthResult<Option<BackendUser>>;

    /// Returns the user for `key`, creating it from `init` if absent.
    ///
    /// Local user ids are unique across keys: a create whose
    /// `init.user_id` already belongs to another key yields
    /// [`UserEntry::IdTaken`]. Implementations must make the
    /// check-and-insert atomic.
    async fn get_or_create(&self, key: &UserKey, init: BackendUser) -> AuthResult<UserEntry>;

    /// Replaces the stored record for `key`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if no record exists for `key`.
    async fn update(&self, key: &UserKey, user: &BackendUser) -> AuthResult<()>;
}
