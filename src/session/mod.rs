//! Server-side HTTP sessions.
//!
//! Sessions live in memory, keyed by an opaque random id carried in the
//! `rememberme_session` cookie. They expire after an idle timeout. Every
//! lifecycle transition is reported to the registered [`SessionListener`]s.

pub mod listener;

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::remember_me::token::now_unix;
use crate::users::Principal;

pub use listener::{SessionEvent, SessionListener, TracingSessionListener};

pub const SESSION_COOKIE_NAME: &str = "rememberme_session";

const SESSION_ID_BYTES: usize = 32;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 30 * 60;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    idle_timeout_seconds: i64,
    cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            idle_timeout_seconds: DEFAULT_SESSION_TTL_SECONDS,
            cookie_secure: true,
        }
    }

    #[must_use]
    pub fn with_idle_timeout_seconds(mut self, seconds: i64) -> Self {
        self.idle_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn idle_timeout_seconds(&self) -> i64 {
        self.idle_timeout_seconds
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}

#[derive(Clone, Debug)]
pub struct Session {
    pub id: String,
    pub principal: Principal,
    pub created_at_unix: i64,
    pub last_accessed_unix: i64,
}

impl Session {
    fn is_expired(&self, now_unix: i64, idle_timeout_seconds: i64) -> bool {
        self.last_accessed_unix.saturating_add(idle_timeout_seconds) < now_unix
    }
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    listeners: Vec<Arc<dyn SessionListener>>,
    config: SessionConfig,
}

impl SessionStore {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            listeners: Vec::new(),
            config,
        }
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a session for an authenticated principal.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS random source fails.
    pub async fn create(&self, principal: Principal) -> Result<Session, rand::Error> {
        let id = generate_session_id()?;
        let now = now_unix();
        let session = Session {
            id: id.clone(),
            principal,
            created_at_unix: now,
            last_accessed_unix: now,
        };
        self.sessions.lock().await.insert(id, session.clone());
        self.notify(&SessionEvent::Created {
            session_id: &session.id,
            username: &session.principal.username,
        });
        Ok(session)
    }

    /// Look up a live session and refresh its idle timer.
    pub async fn get(&self, id: &str) -> Option<Session> {
        let now = now_unix();
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(id)?;
        if !session.is_expired(now, self.config.idle_timeout_seconds) {
            session.last_accessed_unix = now;
            return Some(session.clone());
        }
        let expired = sessions.remove(id);
        drop(sessions);

        if let Some(session) = expired {
            self.notify(&SessionEvent::Expired {
                session_id: &session.id,
                username: &session.principal.username,
            });
        }
        None
    }

    /// Remove a session; returns whether one existed.
    pub async fn destroy(&self, id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(id);
        match removed {
            Some(session) => {
                self.notify(&SessionEvent::Destroyed {
                    session_id: &session.id,
                    username: &session.principal.username,
                });
                true
            }
            None => false,
        }
    }

    /// Move a session to a fresh id, e.g. after a privilege change.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS random source fails.
    pub async fn change_id(&self, id: &str) -> Result<Option<Session>, rand::Error> {
        self.rotate(id, None).await
    }

    /// Move a live session to a fresh id and bind it to `principal`. Used on
    /// login so an id known before authentication never carries the login.
    /// Returns `None` if `id` is unknown or idle past its timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS random source fails.
    pub async fn renew(
        &self,
        id: &str,
        principal: Principal,
    ) -> Result<Option<Session>, rand::Error> {
        self.rotate(id, Some(principal)).await
    }

    async fn rotate(
        &self,
        id: &str,
        principal: Option<Principal>,
    ) -> Result<Option<Session>, rand::Error> {
        let new_id = generate_session_id()?;
        let now = now_unix();
        let mut sessions = self.sessions.lock().await;
        let Some(mut session) = sessions.remove(id) else {
            return Ok(None);
        };
        if session.is_expired(now, self.config.idle_timeout_seconds) {
            drop(sessions);
            self.notify(&SessionEvent::Expired {
                session_id: &session.id,
                username: &session.principal.username,
            });
            return Ok(None);
        }
        session.id = new_id.clone();
        session.last_accessed_unix = now;
        if let Some(principal) = principal {
            session.principal = principal;
        }
        sessions.insert(new_id, session.clone());
        drop(sessions);

        self.notify(&SessionEvent::IdChanged {
            old_id: id,
            new_id: &session.id,
            username: &session.principal.username,
        });
        Ok(Some(session))
    }

    /// Drop idle sessions; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = now_unix();
        let timeout = self.config.idle_timeout_seconds;
        let expired: Vec<Session> = {
            let mut sessions = self.sessions.lock().await;
            let ids: Vec<String> = sessions
                .values()
                .filter(|session| session.is_expired(now, timeout))
                .map(|session| session.id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &expired {
            self.notify(&SessionEvent::Expired {
                session_id: &session.id,
                username: &session.principal.username,
            });
        }
        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    fn notify(&self, event: &SessionEvent<'_>) {
        for listener in &self.listeners {
            listener.on_event(event);
        }
    }

    #[cfg(test)]
    async fn backdate(&self, id: &str, seconds: i64) {
        if let Some(session) = self.sessions.lock().await.get_mut(id) {
            session.last_accessed_unix -= seconds;
        }
    }
}

fn generate_session_id() -> Result<String, rand::Error> {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingListener {
        events: StdMutex<Vec<String>>,
    }

    impl RecordingListener {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl SessionListener for RecordingListener {
        fn on_event(&self, event: &SessionEvent<'_>) {
            let label = match event {
                SessionEvent::Created { username, .. } => format!("created:{username}"),
                SessionEvent::Destroyed { username, .. } => format!("destroyed:{username}"),
                SessionEvent::IdChanged { username, .. } => format!("id_changed:{username}"),
                SessionEvent::Expired { username, .. } => format!("expired:{username}"),
            };
            self.events.lock().unwrap().push(label);
        }
    }

    fn principal(name: &str) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            username: name.to_string(),
            roles: Vec::new(),
            enabled: true,
        }
    }

    fn store_with(listener: &Arc<RecordingListener>, ttl: i64) -> SessionStore {
        SessionStore::new(SessionConfig::new().with_idle_timeout_seconds(ttl))
            .with_listener(listener.clone())
    }

    #[tokio::test]
    async fn create_get_destroy() {
        let listener = Arc::new(RecordingListener::default());
        let store = store_with(&listener, 60);

        let session = store.create(principal("alice")).await.unwrap();
        let loaded = store.get(&session.id).await.unwrap();
        assert_eq!(loaded.principal.username, "alice");

        assert!(store.destroy(&session.id).await);
        assert!(!store.destroy(&session.id).await);
        assert!(store.get(&session.id).await.is_none());
        assert_eq!(listener.events(), vec!["created:alice", "destroyed:alice"]);
    }

    #[tokio::test]
    async fn change_id_moves_session() {
        let listener = Arc::new(RecordingListener::default());
        let store = store_with(&listener, 60);

        let session = store.create(principal("bob")).await.unwrap();
        let moved = store.change_id(&session.id).await.unwrap().unwrap();
        assert_ne!(moved.id, session.id);
        assert!(store.get(&session.id).await.is_none());
        assert!(store.get(&moved.id).await.is_some());
        assert!(store.change_id("missing").await.unwrap().is_none());
        assert_eq!(listener.events(), vec!["created:bob", "id_changed:bob"]);
    }

    #[tokio::test]
    async fn renew_rebinds_principal() {
        let listener = Arc::new(RecordingListener::default());
        let store = store_with(&listener, 60);

        let session = store.create(principal("bob")).await.unwrap();
        let renewed = store
            .renew(&session.id, principal("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(renewed.id, session.id);
        assert_eq!(renewed.created_at_unix, session.created_at_unix);
        let loaded = store.get(&renewed.id).await.unwrap();
        assert_eq!(loaded.principal.username, "alice");
        assert_eq!(store.len().await, 1);
        assert_eq!(listener.events(), vec!["created:bob", "id_changed:alice"]);
    }

    #[tokio::test]
    async fn renew_skips_idle_sessions() {
        let listener = Arc::new(RecordingListener::default());
        let store = store_with(&listener, 60);

        let session = store.create(principal("frank")).await.unwrap();
        store.backdate(&session.id, 120).await;

        assert!(store
            .renew(&session.id, principal("frank"))
            .await
            .unwrap()
            .is_none());
        assert!(store.is_empty().await);
        assert_eq!(listener.events(), vec!["created:frank", "expired:frank"]);
    }

    #[tokio::test]
    async fn idle_sessions_expire_on_access() {
        let listener = Arc::new(RecordingListener::default());
        let store = store_with(&listener, 60);

        let session = store.create(principal("carol")).await.unwrap();
        store.backdate(&session.id, 120).await;

        assert!(store.get(&session.id).await.is_none());
        assert!(store.is_empty().await);
        assert_eq!(listener.events(), vec!["created:carol", "expired:carol"]);
    }

    #[tokio::test]
    async fn purge_removes_only_idle_sessions() {
        let listener = Arc::new(RecordingListener::default());
        let store = store_with(&listener, 60);

        let stale = store.create(principal("dave")).await.unwrap();
        store.create(principal("erin")).await.unwrap();
        store.backdate(&stale.id, 120).await;

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(listener.events().contains(&"expired:dave".to_string()));
    }

    #[test]
    fn session_ids_are_unique_and_url_safe() {
        let first = generate_session_id().unwrap();
        let second = generate_session_id().unwrap();
        assert_ne!(first, second);
        assert_eq!(first.len(), 43);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
