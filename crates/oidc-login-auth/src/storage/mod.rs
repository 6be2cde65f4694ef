//! Storage traits for federated users and browser login sessions.
//!
//! This module defines storage interfaces for:
//!
//! - Backend user records bound to a provider uid
//! - Pending logins and bound users of browser sessions
//!
//! # Implementations
//!
//! [`memory`] provides `DashMap`-backed implementations used by the server
//! binary and the tests.

pub mod memory;
pub mod session;
pub mod user;

pub use memory::{InMemoryLoginSessionStorage, InMemoryUserStorage};
pub use session::{LoginSessionStorage, PendingLogin};
pub use user::{BackendUser, UserEntry, UserKey, UserStorage};
