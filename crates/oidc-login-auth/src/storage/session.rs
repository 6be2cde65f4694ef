//! Browser login session storage trait.
//!
//! A browser session carries at most one pending login (written when the
//! user is redirected to a provider) and, once login succeeds, the bound
//! local user id.
//!
//! # Implementation Notes
//!
//! - `consume_pending` must be atomic so a callback cannot be replayed.
//! - Never log the state or nonce values.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;

/// Anti-forgery values stored between `login` and `code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    /// OAuth `state` sent to the provider.
    pub state: String,
    /// OIDC `nonce` expected in the id_token.
    pub nonce: String,
    /// Numeric id of the chosen provider.
    pub provider_id: i64,
    /// Where to land after login.
    pub redirect_url: Option<String>,
    pub created_at: OffsetDateTime,
}

impl PendingLogin {
    #[must_use]
    pub fn new(
        state: impl Into<String>,
        nonce: impl Into<String>,
        provider_id: i64,
        redirect_url: Option<String>,
    ) -> Self {
        Self {
            state: state.into(),
            nonce: nonce.into(),
            provider_id,
            redirect_url,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Storage trait for browser login sessions, keyed by session id.
#[async_trait]
pub trait LoginSessionStorage: Send + Sync {
    /// Returns the local user bound to the session, if logged in.
    async fn user_id(&self, session_id: &str) -> AuthResult<Option<String>>;

    /// Stores a pending login, replacing any previous one.
    async fn store_pending(&self, session_id: &str, pending: PendingLogin) -> AuthResult<()>;

    /// Removes and returns the pending login if its state equals `state`.
    ///
    /// A pending login with a different state is left in place.
    async fn consume_pending(&self, session_id: &str, state: &str)
    -> AuthResult<Option<PendingLogin>>;

    /// Binds a local user to the session.
    async fn bind_user(&self, session_id: &str, user_id: &str) -> AuthResult<()>;

    /// Removes the session entirely.
    async fn clear(&self, session_id: &str) -> AuthResult<()>;
}
