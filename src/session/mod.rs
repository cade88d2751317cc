//! Session state: the app's single belief about who is signed in.
//!
//! ARCHITECTURE
//! ============
//! [`SessionStore`] owns the one live [`Session`] and is its only writer.
//! UI consumers read snapshots with `state()` or watch changes through
//! `subscribe()`. Inputs are the auth provider's state-change stream, the
//! credential cache (read once at start), and the session operations.
//!
//! ```text
//!   Initializing ──cache hit──▶ ProvisionallyAuthenticated
//!        │                              │
//!        └──────── provider event ──────┴──▶ Authenticated | Anonymous
//! ```
//!
//! INVARIANTS
//! ==========
//! - `is_authenticated()` is derived from the user, never stored.
//! - Every transition replaces the whole value in one `watch` send, so no
//!   reader observes a half-applied session.
//! - The provider stream has the last word: any event it emits overrides
//!   whatever a local operation or the cache set before.

pub mod store;

use std::time::Duration;

use serde::Serialize;

use crate::auth::AuthUser;
use crate::config::env_parse;

pub use store::SessionStore;

pub const DEFAULT_PROVISIONAL_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nothing is known yet.
    Initializing,
    /// Showing the cached identity while the provider resolves.
    ProvisionallyAuthenticated,
    Authenticated,
    Anonymous,
}

/// Snapshot of the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    user: Option<AuthUser>,
    is_loading: bool,
    phase: SessionPhase,
}

impl Session {
    pub(crate) fn initializing() -> Self {
        Self { user: None, is_loading: true, phase: SessionPhase::Initializing }
    }

    pub(crate) fn provisional(user: AuthUser) -> Self {
        Self { user: Some(user), is_loading: true, phase: SessionPhase::ProvisionallyAuthenticated }
    }

    pub(crate) fn authenticated(user: AuthUser) -> Self {
        Self { user: Some(user), is_loading: false, phase: SessionPhase::Authenticated }
    }

    pub(crate) fn anonymous() -> Self {
        Self { user: None, is_loading: false, phase: SessionPhase::Anonymous }
    }

    /// The identity this session believes in, confirmed or provisional.
    #[must_use]
    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.uid.as_str())
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.email.as_deref())
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.display_name.as_deref())
    }

    #[must_use]
    pub fn avatar_url(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.photo_url.as_deref())
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }
}

/// Session store tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a cached identity may stand in for the provider before the
    /// session falls back to anonymous. `None` leaves the window open.
    pub provisional_timeout: Option<Duration>,
}

impl SessionConfig {
    /// Read `EATOS_PROVISIONAL_TIMEOUT_MS` (default 10000, `0` disables).
    #[must_use]
    pub fn from_env() -> Self {
        let ms = env_parse("EATOS_PROVISIONAL_TIMEOUT_MS", DEFAULT_PROVISIONAL_TIMEOUT_MS);
        Self { provisional_timeout: (ms > 0).then(|| Duration::from_millis(ms)) }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { provisional_timeout: Some(Duration::from_millis(DEFAULT_PROVISIONAL_TIMEOUT_MS)) }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
