//! In-memory storage backends.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::{AuthError, AuthResult};

use super::session::{LoginSessionStorage, PendingLogin};
use super::user::{BackendUser, UserEntry, UserKey, UserStorage};

/// Backend users held in a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryUserStorage {
    users: DashMap<UserKey, BackendUser>,
    /// Local user id to the key owning it.
    owners: DashMap<String, UserKey>,
}

impl InMemoryUserStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStorage for InMemoryUserStorage {
    async fn find(&self, key: &UserKey) -> AuthResult<Option<BackendUser>> {
        Ok(self.users.get(key).map(|u| u.value().clone()))
    }

    async fn get_or_create(&self, key: &UserKey, init: BackendUser) -> AuthResult<UserEntry> {
        // Lock order: users before owners.
        match self.users.entry(key.clone()) {
            Entry::Occupied(entry) => Ok(UserEntry::Existing(entry.get().clone())),
            Entry::Vacant(entry) => match self.owners.entry(init.user_id.clone()) {
                Entry::Occupied(_) => Ok(UserEntry::IdTaken),
                Entry::Vacant(owner) => {
                    owner.insert(key.clone());
                    let user = entry.insert(init);
                    Ok(UserEntry::Created(user.value().clone()))
                }
            },
        }
    }

    async fn update(&self, key: &UserKey, user: &BackendUser) -> AuthResult<()> {
        match self.users.get_mut(key) {
            Some(mut existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(AuthError::storage(format!(
                "backend user '{}' does not exist",
                key.uid
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct BrowserSession {
    pending: Option<PendingLogin>,
    user_id: Option<String>,
}

/// Browser sessions held in a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryLoginSessionStorage {
    sessions: DashMap<String, BrowserSession>,
}

impl InMemoryLoginSessionStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pending login of a session without consuming it.
    #[must_use]
    pub fn pending(&self, session_id: &str) -> Option<PendingLogin> {
        self.sessions
            .get(session_id)
            .and_then(|s| s.pending.clone())
    }
}

#[async_trait]
impl LoginSessionStorage for InMemoryLoginSessionStorage {
    async fn user_id(&self, session_id: &str) -> AuthResult<Option<String>> {
        Ok(self
            .sessions
            .get(session_id)
            .and_then(|s| s.user_id.clone()))
    }

    async fn store_pending(&self, session_id: &str, pending: PendingLogin) -> AuthResult<()> {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .pending = Some(pending);
        Ok(())
    }

    async fn consume_pending(
        &self,
        session_id: &str,
        state: &str,
    ) -> AuthResult<Option<PendingLogin>> {
        let Some(mut session) = self.sessions.get_mut(session_id) else {
            return Ok(None);
        };
        if session.pending.as_ref().is_some_and(|p| p.state == state) {
            Ok(session.pending.take())
        } else {
            Ok(None)
        }
    }

    async fn bind_user(&self, session_id: &str, user_id: &str) -> AuthResult<()> {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .user_id = Some(user_id.to_string());
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> AuthResult<()> {
        self.sessions.remove(session_id);
        Ok(())
    }
}
