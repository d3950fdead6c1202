//! Session state for the interactive login flow.
//!
//! The adapter owns no persistence. Sessions and pending login states live in
//! a [`SessionStore`] supplied by the host; [`MemorySessionStore`] is the
//! default in-process implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum_extra::headers::{Cookie, HeaderMapExt};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::types::Identity;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "authentik_session";
/// Session lifetime: 24 hours.
pub const SESSION_LIFETIME: Duration = Duration::from_secs(24 * 3600);
/// Pending login state lifetime: 10 minutes.
const LOGIN_STATE_LIFETIME: Duration = Duration::from_secs(600);
/// Cleanup interval: 5 minutes.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Session id carried by the request's session cookie.
#[must_use]
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Cookie>()
        .and_then(|cookie| cookie.get(SESSION_COOKIE).map(str::to_owned))
}

/// Storage for authenticated sessions and in-flight login states.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist an identity and return the new session id.
    async fn create(&self, identity: Identity) -> String;

    /// Look up the identity for a session id.
    async fn get(&self, session_id: &str) -> Option<Identity>;

    /// Remove a session. Returns whether it existed.
    async fn remove(&self, session_id: &str) -> bool;

    /// Remember a login `state` value until the callback arrives.
    async fn insert_login_state(&self, state: String);

    /// Consume a login `state`. Returns false if unknown or expired.
    async fn take_login_state(&self, state: &str) -> bool;

    /// Drop expired sessions and login states.
    async fn purge_expired(&self) {}
}

/// Periodically purge expired entries from `store`.
pub fn spawn_cleanup(store: Arc<dyn SessionStore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            store.purge_expired().await;
        }
    })
}

struct Session {
    identity: Identity,
    created_at: Instant,
}

impl Session {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > SESSION_LIFETIME
    }
}

/// In-memory session store.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    login_states: Arc<RwLock<HashMap<String, Instant>>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a random session id using two UUIDs (256 bits).
    fn generate_id() -> String {
        format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, identity: Identity) -> String {
        let id = Self::generate_id();
        tracing::info!(user = %identity.id, "Session created");
        self.sessions
            .write()
            .await
            .insert(id.clone(), Session { identity, created_at: Instant::now() });
        id
    }

    async fn get(&self, session_id: &str) -> Option<Identity> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(session_id)?;
        if session.is_expired() {
            return None;
        }
        Some(session.identity.clone())
    }

    async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    async fn insert_login_state(&self, state: String) {
        self.login_states.write().await.insert(state, Instant::now());
    }

    async fn take_login_state(&self, state: &str) -> bool {
        self.login_states
            .write()
            .await
            .remove(state)
            .is_some_and(|created| created.elapsed() <= LOGIN_STATE_LIFETIME)
    }

    async fn purge_expired(&self) {
        {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, s| !s.is_expired());
            let removed = before - sessions.len();
            if removed > 0 {
                tracing::debug!(count = removed, "Cleaned up expired sessions");
            }
        }

        self.login_states
            .write()
            .await
            .retain(|_, created| created.elapsed() <= LOGIN_STATE_LIFETIME);
    }
}

impl std::fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySessionStore").finish()
    }
}
