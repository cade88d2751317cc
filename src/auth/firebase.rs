//! Firebase Authentication over the Identity Toolkit REST API.
//!
//! Thin HTTP wrapper for `accounts:*` endpoints. The provider session (ID
//! token + user) lives in memory. With a token store attached, the refresh
//! token is persisted so [`FirebaseAuth::restore_session`] can bring the
//! session back after a restart; until that finishes, subscribers hear
//! nothing. The credential cache stays the session store's concern.
//! Error-body mapping is pure for testability.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::FirebaseConfig;
use super::{AuthError, AuthProvider, AuthStateReceiver, AuthUser};
use crate::store::KeyValueStore;

const PASSWORD_RESET: &str = "PASSWORD_RESET";

/// Store key holding the Firebase refresh token.
pub const REFRESH_TOKEN_KEY: &str = "eatos_firebase_refresh_token";

// =============================================================================
// CLIENT
// =============================================================================

struct ProviderSession {
    id_token: String,
    user: AuthUser,
}

struct Listeners {
    /// False while a persisted session is still being restored.
    resolved: bool,
    senders: Vec<mpsc::UnboundedSender<Option<AuthUser>>>,
}

pub struct FirebaseAuth {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    token_base_url: String,
    token_store: Option<Arc<dyn KeyValueStore>>,
    session: Mutex<Option<ProviderSession>>,
    listeners: Mutex<Listeners>,
}

impl FirebaseAuth {
    /// Build a client from environment variables (see [`FirebaseConfig::from_env`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the HTTP client fails.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::new(FirebaseConfig::from_env()?)
    }

    /// # Errors
    ///
    /// Returns [`AuthError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn new(config: FirebaseConfig) -> Result<Self, AuthError> {
        let http = config
            .timeouts
            .client()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            api_key: config.api_key,
            base_url: config.base_url,
            token_base_url: config.token_base_url,
            token_store: None,
            session: Mutex::new(None),
            listeners: Mutex::new(Listeners { resolved: true, senders: Vec::new() }),
        })
    }

    /// Persist refresh tokens in `store`. The provider then stays unresolved
    /// until [`FirebaseAuth::restore_session`] has run.
    #[must_use]
    pub fn with_token_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.token_store = Some(store);
        self.listeners = Mutex::new(Listeners { resolved: false, senders: Vec::new() });
        self
    }

    /// Exchange the persisted refresh token for a live session, then tell
    /// subscribers who is signed in.
    ///
    /// A rejected token is deleted. A network failure keeps it for the next
    /// start. Either way subscribers learn the outcome, so the session store
    /// never waits on a provider that cannot answer.
    pub async fn restore_session(&self) {
        let Some(store) = self.token_store.clone() else {
            self.notify(self.current_user().as_ref());
            return;
        };
        let refresh_token = match store.get(REFRESH_TOKEN_KEY).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("firebase: no persisted session");
                self.notify(self.current_user().as_ref());
                return;
            }
            Err(err) => {
                warn!(error = %err, code = err.error_code(), "firebase: refresh token unreadable");
                self.notify(self.current_user().as_ref());
                return;
            }
        };

        match self.refresh(&refresh_token).await {
            Ok(user) => info!(uid = %user.uid, "firebase: session restored"),
            Err(err) => {
                warn!(error = %err, code = err.error_code(), "firebase: session restore failed");
                let current = self.current_user();
                if current.is_none() && !matches!(err, AuthError::Network(_)) {
                    self.forget_refresh_token().await;
                }
                self.notify(current.as_ref());
            }
        }
    }

    /// The user of the current provider session, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.lock_session().as_ref().map(|s| s.user.clone())
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<ProviderSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send `user` to every live subscriber. Marks the provider resolved.
    fn notify(&self, user: Option<&AuthUser>) {
        let mut listeners = self.lock_listeners();
        listeners.resolved = true;
        listeners.senders.retain(|tx| tx.send(user.cloned()).is_ok());
    }

    async fn persist_refresh_token(&self, token: &str) {
        let Some(store) = &self.token_store else {
            return;
        };
        if let Err(err) = store.set(REFRESH_TOKEN_KEY, token).await {
            warn!(error = %err, code = err.error_code(), "firebase: failed to persist refresh token");
        }
    }

    async fn forget_refresh_token(&self) {
        let Some(store) = &self.token_store else {
            return;
        };
        if let Err(err) = store.delete(REFRESH_TOKEN_KEY).await {
            warn!(error = %err, code = err.error_code(), "firebase: failed to delete refresh token");
        }
    }

    /// POST a JSON body to an Identity Toolkit `accounts:` endpoint.
    async fn call<B, R>(&self, endpoint: &str, body: &B) -> Result<R, AuthError>
    where
        B: serde::Serialize + Sync,
        R: DeserializeOwned,
    {
        let request = self
            .http
            .post(format!("{}/accounts:{endpoint}", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .json(body);
        self.execute(endpoint, request).await
    }

    async fn execute<R: DeserializeOwned>(&self, endpoint: &str, request: reqwest::RequestBuilder) -> Result<R, AuthError> {
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !(200..300).contains(&status) {
            let err = parse_error(status, &text);
            warn!(endpoint, status, error = %err, "firebase: request rejected");
            return Err(err);
        }

        serde_json::from_str(&text).map_err(|e| AuthError::ResponseParse(e.to_string()))
    }

    /// Fetch the profile behind a fresh ID token and make it the current session.
    async fn start_session(&self, token: TokenResponse) -> Result<AuthUser, AuthError> {
        let lookup: LookupResponse = self
            .call("lookup", &LookupRequest { id_token: &token.id_token })
            .await?;
        let user = user_from_lookup(&token, lookup);

        *self.lock_session() = Some(ProviderSession { id_token: token.id_token, user: user.clone() });
        if let Some(refresh_token) = &token.refresh_token {
            self.persist_refresh_token(refresh_token).await;
        }
        info!(uid = %user.uid, "firebase: session started");
        self.notify(Some(&user));
        Ok(user)
    }

    /// Trade a refresh token for a new ID token at the Secure Token service.
    async fn refresh(&self, refresh_token: &str) -> Result<AuthUser, AuthError> {
        let request = self
            .http
            .post(format!("{}/token", self.token_base_url))
            .query(&[("key", self.api_key.as_str())])
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)]);
        let refreshed: RefreshResponse = self.execute("token", request).await?;
        self.start_session(TokenResponse {
            local_id: refreshed.user_id,
            id_token: refreshed.id_token,
            refresh_token: Some(refreshed.refresh_token),
            email: None,
            display_name: None,
        })
        .await
    }
}

#[async_trait]
impl AuthProvider for FirebaseAuth {
    fn subscribe(&self) -> AuthStateReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listeners = self.lock_listeners();
        // Once resolved, subscribers learn the current state immediately.
        if listeners.resolved {
            let _ = tx.send(self.current_user());
        }
        listeners.senders.push(tx);
        rx
    }

    async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let token: TokenResponse = self
            .call("signInWithPassword", &PasswordRequest { email, password, return_secure_token: true })
            .await?;
        self.start_session(token).await
    }

    async fn register_with_email(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let token: TokenResponse = self
            .call("signUp", &PasswordRequest { email, password, return_secure_token: true })
            .await?;
        self.start_session(token).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let previous = self.lock_session().take();
        if let Some(session) = previous {
            info!(uid = %session.user.uid, "firebase: signed out");
        }
        self.forget_refresh_token().await;
        self.notify(None);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let _: serde_json::Value = self
            .call("sendOobCode", &OobRequest { request_type: PASSWORD_RESET, email })
            .await?;
        Ok(())
    }

    async fn update_profile(&self, display_name: &str, photo_url: Option<&str>) -> Result<Option<AuthUser>, AuthError> {
        let current = self
            .lock_session()
            .as_ref()
            .map(|s| (s.id_token.clone(), s.user.clone()));
        let Some((id_token, user)) = current else {
            return Ok(None);
        };

        let photo_url = photo_url
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .or_else(|| user.photo_url.clone());
        let resp: UpdateResponse = self
            .call(
                "update",
                &UpdateRequest {
                    id_token: &id_token,
                    display_name,
                    photo_url: photo_url.as_deref(),
                    return_secure_token: true,
                },
            )
            .await?;

        let updated = AuthUser {
            uid: resp.local_id,
            email: resp.email.or(user.email),
            display_name: resp.display_name.or_else(|| Some(display_name.to_string())),
            photo_url: resp.photo_url.or(photo_url),
        };
        if let Some(session) = self.lock_session().as_mut() {
            session.user = updated.clone();
            if let Some(token) = resp.id_token {
                session.id_token = token;
            }
        }
        if let Some(refresh_token) = &resp.refresh_token {
            self.persist_refresh_token(refresh_token).await;
        }
        Ok(Some(updated))
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    local_id: String,
    id_token: String,
    refresh_token: Option<String>,
    email: Option<String>,
    display_name: Option<String>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct OobRequest<'a> {
    request_type: &'a str,
    email: &'a str,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    id_token: &'a str,
    display_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
    return_secure_token: bool,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
}

/// Secure Token reply. Unlike Identity Toolkit, fields are snake case.
#[derive(Debug, serde::Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    user_id: String,
}

#[derive(serde::Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    message: String,
}

// =============================================================================
// PARSING
// =============================================================================

/// Merge the token response with the looked-up account. The lookup wins for
/// profile fields; the token response is the fallback when lookup is empty.
fn user_from_lookup(token: &TokenResponse, lookup: LookupResponse) -> AuthUser {
    match lookup.users.into_iter().find(|u| u.local_id == token.local_id) {
        Some(account) => AuthUser {
            uid: account.local_id,
            email: account.email.or_else(|| token.email.clone()),
            display_name: account.display_name.or_else(|| token.display_name.clone()),
            photo_url: account.photo_url,
        },
        None => AuthUser {
            uid: token.local_id.clone(),
            email: token.email.clone(),
            display_name: token.display_name.clone(),
            photo_url: None,
        },
    }
}

/// Map an Identity Toolkit error response to an [`AuthError`].
fn parse_error(status: u16, body: &str) -> AuthError {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return AuthError::Provider { status, message: body.to_string() };
    };
    let message = envelope.error.message;
    // Messages look like `WEAK_PASSWORD : Password should be at least 6 characters`.
    let (code, detail) = match message.split_once(':') {
        Some((code, detail)) => (code.trim(), detail.trim()),
        None => (message.trim(), ""),
    };

    match code {
        "EMAIL_NOT_FOUND"
        | "INVALID_PASSWORD"
        | "INVALID_LOGIN_CREDENTIALS"
        | "USER_DISABLED"
        | "INVALID_EMAIL"
        | "USER_NOT_FOUND"
        | "TOKEN_EXPIRED"
        | "INVALID_REFRESH_TOKEN"
        | "INVALID_ID_TOKEN" => AuthError::InvalidCredential(code.to_string()),
        "EMAIL_EXISTS" => AuthError::EmailAlreadyInUse,
        "WEAK_PASSWORD" => AuthError::WeakPassword(if detail.is_empty() { code.to_string() } else { detail.to_string() }),
        _ => AuthError::Provider { status, message },
    }
}

#[cfg(test)]
#[path = "firebase_test.rs"]
mod tests;
