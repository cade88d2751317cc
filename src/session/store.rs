//! Session store: reconciles the credential cache and the auth provider.
//!
//! DESIGN
//! ======
//! `start` subscribes to the provider before spawning anything, so no event
//! is lost, then runs three background tasks:
//!
//! - the listener applies every provider event as-is;
//! - the bootstrap reads the cache once and adopts it only while the session
//!   is still `Initializing`;
//! - the deadline drops an unresolved session to anonymous after
//!   `provisional_timeout`.
//!
//! All three are aborted when the store is dropped, which also closes the
//! provider subscription.
//!
//! ERROR HANDLING
//! ==============
//! Provider errors are returned unchanged. Cache errors are logged and
//! swallowed: a stale or missing cache never blocks a session transition.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Session, SessionConfig, SessionPhase};
use crate::auth::{AuthError, AuthProvider, AuthStateReceiver, AuthUser};
use crate::cache::{CachedCredential, CredentialCache};

pub struct SessionStore {
    state: Arc<watch::Sender<Session>>,
    provider: Arc<dyn AuthProvider>,
    cache: Arc<dyn CredentialCache>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionStore {
    /// Create the store and begin resolving the session. Must be called from
    /// within a tokio runtime.
    #[must_use]
    pub fn start(provider: Arc<dyn AuthProvider>, cache: Arc<dyn CredentialCache>, config: SessionConfig) -> Self {
        let (tx, _) = watch::channel(Session::initializing());
        let state = Arc::new(tx);

        let events = provider.subscribe();
        let mut tasks = vec![
            tokio::spawn(listen(state.clone(), events)),
            tokio::spawn(adopt_cached(state.clone(), cache.clone())),
        ];
        if let Some(timeout) = config.provisional_timeout {
            tasks.push(tokio::spawn(expire_provisional(state.clone(), timeout)));
        }

        Self { state, provider, cache, tasks }
    }

    /// Snapshot of the current session.
    #[must_use]
    pub fn state(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Watch the session. The receiver starts at the current value.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Wait until the session is no longer loading and return it.
    pub async fn resolved(&self) -> Session {
        let mut rx = self.subscribe();
        match rx.wait_for(|s| !s.is_loading()).await {
            Ok(session) => session.clone(),
            Err(_) => self.state(),
        }
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`]; the session is left as it was.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.begin();
        let result = self.provider.sign_in_with_email(email, password).await;
        self.complete_sign_in(result, "sign-in").await
    }

    /// Federated Google sign-in.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unsupported`] in this build.
    pub async fn sign_in_with_google(&self) -> Result<(), AuthError> {
        self.begin();
        let result = self.provider.sign_in_with_google().await;
        self.complete_sign_in(result, "google sign-in").await
    }

    /// Register a new account and sign it in.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`]; the session is left as it was.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.begin();
        let result = self.provider.register_with_email(email, password).await;
        self.complete_sign_in(result, "sign-up").await
    }

    /// Sign out with the provider, clear the cache, and go anonymous. A cache
    /// failure does not block the transition.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`]; the session is left as it was.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.begin();
        if let Err(e) = self.provider.sign_out().await {
            warn!(error = %e, "session: sign-out failed");
            self.end_loading();
            return Err(e);
        }
        if let Err(e) = self.cache.clear().await {
            warn!(error = %e, "session: failed to clear cached credential");
        }
        self.state.send_replace(Session::anonymous());
        info!("session: signed out");
        Ok(())
    }

    /// Ask the provider to send a password-reset message. Does not touch the
    /// session.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`].
    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        self.provider
            .send_password_reset(email)
            .await
            .inspect_err(|e| warn!(error = %e, "session: password reset failed"))
    }

    /// Update the display name and, when given, the avatar. Without a
    /// signed-in user this is a no-op that succeeds, and so is a provider that
    /// reports nobody signed in: a cached identity is never promoted here.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`]; the session is left as it was.
    pub async fn update_profile(&self, display_name: &str, avatar_url: Option<&str>) -> Result<(), AuthError> {
        let Some(current) = self.state.borrow().user().cloned() else {
            debug!("session: profile update ignored without a signed-in user");
            return Ok(());
        };

        self.begin();
        let confirmed = match self.provider.update_profile(display_name, avatar_url).await {
            Ok(Some(confirmed)) => confirmed,
            Ok(None) => {
                debug!(uid = %current.uid, "session: provider has no signed-in user, profile update ignored");
                self.end_loading();
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "session: profile update failed");
                self.end_loading();
                return Err(e);
            }
        };
        let updated = merge_profile(current, confirmed, display_name, avatar_url);

        // A provider event may have replaced the user while the request was
        // in flight; only merge into the same identity.
        let mut applied = false;
        self.state.send_modify(|s| {
            if s.user_id() == Some(updated.uid.as_str()) {
                *s = Session::authenticated(updated.clone());
                applied = true;
            } else {
                settle_loading(s);
            }
        });
        if applied {
            self.write_cache(&updated).await;
            info!(uid = %updated.uid, "session: profile updated");
        }
        Ok(())
    }

    fn begin(&self) {
        self.state.send_modify(|s| s.is_loading = true);
    }

    fn end_loading(&self) {
        self.state.send_modify(settle_loading);
    }

    async fn complete_sign_in(&self, result: Result<AuthUser, AuthError>, op: &'static str) -> Result<(), AuthError> {
        match result {
            Ok(user) => {
                info!(uid = %user.uid, op, "session: signed in");
                // Publish before the cache write so a provider event arriving
                // during the write lands after this result.
                self.state.send_replace(Session::authenticated(user.clone()));
                self.write_cache(&user).await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, op, "session: sign-in failed");
                self.end_loading();
                Err(e)
            }
        }
    }

    async fn write_cache(&self, user: &AuthUser) {
        if let Err(e) = self.cache.save(&CachedCredential::from(user)).await {
            warn!(error = %e, uid = %user.uid, "session: failed to cache credential");
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Clear the loading flag unless the session is still waiting on the provider.
fn settle_loading(s: &mut Session) {
    s.is_loading = matches!(s.phase, SessionPhase::Initializing | SessionPhase::ProvisionallyAuthenticated);
}

/// Fill gaps in the provider's confirmed profile from the requested change
/// and the current user. An absent or empty avatar keeps the current one.
fn merge_profile(current: AuthUser, confirmed: AuthUser, display_name: &str, avatar_url: Option<&str>) -> AuthUser {
    let avatar = avatar_url.filter(|a| !a.is_empty()).map(str::to_string);
    AuthUser {
        display_name: confirmed.display_name.or_else(|| Some(display_name.to_string())),
        photo_url: confirmed.photo_url.or(avatar).or(current.photo_url),
        email: confirmed.email.or(current.email),
        uid: confirmed.uid,
    }
}

// =============================================================================
// BACKGROUND TASKS
// =============================================================================

async fn listen(state: Arc<watch::Sender<Session>>, mut events: AuthStateReceiver) {
    while let Some(user) = events.recv().await {
        match user {
            Some(user) => {
                debug!(uid = %user.uid, "session: provider reports signed in");
                state.send_replace(Session::authenticated(user));
            }
            None => {
                debug!("session: provider reports signed out");
                state.send_replace(Session::anonymous());
            }
        }
    }
    debug!("session: provider stream closed");
}

async fn adopt_cached(state: Arc<watch::Sender<Session>>, cache: Arc<dyn CredentialCache>) {
    let credential = match cache.load().await {
        Ok(Some(credential)) => credential,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "session: failed to read cached credential");
            return;
        }
    };

    let uid = credential.uid.clone();
    let adopted = state.send_if_modified(|s| {
        if s.phase() == SessionPhase::Initializing {
            *s = Session::provisional(credential.into());
            true
        } else {
            false
        }
    });
    if adopted {
        debug!(%uid, "session: showing cached identity until provider resolves");
    }
}

async fn expire_provisional(state: Arc<watch::Sender<Session>>, timeout: Duration) {
    tokio::time::sleep(timeout).await;
    let expired = state.send_if_modified(|s| {
        if matches!(s.phase(), SessionPhase::Initializing | SessionPhase::ProvisionallyAuthenticated) {
            *s = Session::anonymous();
            true
        } else {
            false
        }
    });
    if expired {
        warn!(timeout_ms = timeout.as_millis(), "session: provider did not resolve in time, treating as signed out");
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
