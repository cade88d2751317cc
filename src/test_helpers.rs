//! Shared test fixtures: an in-memory key-value store, fake collaborators,
//! and a process-wide lock for tests that mutate environment variables.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::auth::{AuthError, AuthProvider, AuthStateReceiver, AuthUser};
use crate::cache::{CachedCredential, CredentialCache};
use crate::store::{KeyValueStore, StorageError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serialize tests that call `std::env::set_var` / `remove_var`.
pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

#[must_use]
pub fn user(uid: &str, email: &str) -> AuthUser {
    AuthUser { uid: uid.into(), email: Some(email.into()), display_name: None, photo_url: None }
}

// =============================================================================
// HTTP RESPONDER
// =============================================================================

/// Serve canned HTTP responses on a local port, one connection per response,
/// in order. Returns the origin (`http://127.0.0.1:<port>`) and a handle
/// yielding the raw requests received.
pub async fn serve_http(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);
            let reply = format!(
                "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
        requests
    });
    (format!("http://{addr}"), handle)
}

/// Read one request: headers plus `content-length` bytes of body.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&raw);
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if raw.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&raw).into_owned()
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-memory [`KeyValueStore`] with switchable write failures.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    fail_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn insert_raw(&self, key: &str, value: &str) {
        self.values.lock().unwrap().insert(key.into(), value.into());
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if *self.fail_writes.lock().unwrap() {
            return Err(StorageError::Io(std::io::Error::other("write refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.insert_raw(key, value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

// =============================================================================
// FAKE CREDENTIAL CACHE
// =============================================================================

/// [`CredentialCache`] whose `load` can be held back until released, so tests
/// control whether the cache or the provider resolves first.
pub struct FakeCache {
    pub stored: Mutex<Option<CachedCredential>>,
    pub fail_clear: Mutex<bool>,
    pub fail_save: Mutex<bool>,
    gate: tokio::sync::Semaphore,
    saves_held: Mutex<bool>,
    save_gate: tokio::sync::Semaphore,
}

impl FakeCache {
    /// A cache whose `load` returns immediately.
    #[must_use]
    pub fn open(stored: Option<CachedCredential>) -> Self {
        let cache = Self::gated(stored);
        cache.release_load();
        cache
    }

    /// A cache whose `load` blocks until [`FakeCache::release_load`].
    #[must_use]
    pub fn gated(stored: Option<CachedCredential>) -> Self {
        Self {
            stored: Mutex::new(stored),
            fail_clear: Mutex::new(false),
            fail_save: Mutex::new(false),
            gate: tokio::sync::Semaphore::new(0),
            saves_held: Mutex::new(false),
            save_gate: tokio::sync::Semaphore::new(0),
        }
    }

    pub fn release_load(&self) {
        self.gate.add_permits(1);
    }

    /// Make every later `save` wait for [`FakeCache::release_save`].
    pub fn hold_saves(&self) {
        *self.saves_held.lock().unwrap() = true;
    }

    pub fn release_save(&self) {
        self.save_gate.add_permits(1);
    }

    pub fn current(&self) -> Option<CachedCredential> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialCache for FakeCache {
    async fn save(&self, credential: &CachedCredential) -> Result<(), StorageError> {
        let held = *self.saves_held.lock().unwrap();
        if held {
            let _permit = self
                .save_gate
                .acquire()
                .await
                .map_err(|e| StorageError::Io(std::io::Error::other(e.to_string())))?;
        }
        if *self.fail_save.lock().unwrap() {
            return Err(StorageError::Io(std::io::Error::other("save refused")));
        }
        *self.stored.lock().unwrap() = Some(credential.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<CachedCredential>, StorageError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e.to_string())))?;
        Ok(self.current())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        if *self.fail_clear.lock().unwrap() {
            return Err(StorageError::Io(std::io::Error::other("clear refused")));
        }
        *self.stored.lock().unwrap() = None;
        Ok(())
    }
}

// =============================================================================
// FAKE AUTH PROVIDER
// =============================================================================

/// Scripted [`AuthProvider`]: tests push state-change events by hand and
/// queue the result of the next request.
#[derive(Default)]
pub struct FakeProvider {
    listeners: Mutex<Vec<mpsc::UnboundedSender<Option<AuthUser>>>>,
    next_user: Mutex<Option<Result<AuthUser, AuthError>>>,
    fail_sign_out: Mutex<Option<AuthError>>,
    pub reset_requests: Mutex<Vec<String>>,
    pub profile_updates: Mutex<Vec<(String, Option<String>)>>,
    pub signed_out: Mutex<u32>,
}

impl FakeProvider {
    /// Emit an auth state-change event to every subscriber.
    pub fn emit(&self, user: Option<AuthUser>) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|tx| tx.send(user.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|tx| !tx.is_closed());
        listeners.len()
    }

    /// Result returned by the next sign-in, sign-up, or profile update.
    pub fn respond_with(&self, result: Result<AuthUser, AuthError>) {
        *self.next_user.lock().unwrap() = Some(result);
    }

    pub fn fail_sign_out(&self, err: AuthError) {
        *self.fail_sign_out.lock().unwrap() = Some(err);
    }

    fn take_next(&self) -> Result<AuthUser, AuthError> {
        self.next_user
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(AuthError::Network("no scripted response".into())))
    }
}

#[async_trait]
impl AuthProvider for FakeProvider {
    fn subscribe(&self) -> AuthStateReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().unwrap().push(tx);
        rx
    }

    async fn sign_in_with_email(&self, _email: &str, _password: &str) -> Result<AuthUser, AuthError> {
        self.take_next()
    }

    async fn register_with_email(&self, _email: &str, _password: &str) -> Result<AuthUser, AuthError> {
        self.take_next()
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(err) = self.fail_sign_out.lock().unwrap().take() {
            return Err(err);
        }
        *self.signed_out.lock().unwrap() += 1;
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        if let Some(Err(err)) = self.next_user.lock().unwrap().take() {
            return Err(err);
        }
        self.reset_requests.lock().unwrap().push(email.into());
        Ok(())
    }

    async fn update_profile(&self, display_name: &str, photo_url: Option<&str>) -> Result<Option<AuthUser>, AuthError> {
        self.profile_updates
            .lock()
            .unwrap()
            .push((display_name.into(), photo_url.map(str::to_string)));
        match self.next_user.lock().unwrap().take() {
            Some(Ok(user)) => Ok(Some(user)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }
}
