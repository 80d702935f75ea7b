//! Process-local account store
//!
//! Rate windows for the memory backend are kept by [`crate::actor`]; this
//! module only covers accounts and sessions. Expired sessions are dropped
//! lazily on lookup and swept whenever a new session is created.

use super::AccountStore;
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

#[derive(Default)]
struct Inner {
    // login -> password hash
    users: HashMap<String, String>,
    // session id -> (login, expiry)
    sessions: HashMap<String, (String, SystemTime)>,
    // login -> current session id
    current: HashMap<String, String>,
}

/// In-memory [`AccountStore`]
#[derive(Default)]
pub struct MemoryAccountStore {
    inner: Mutex<Inner>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn replace_session_at(
        &self,
        login: &str,
        session_id: &str,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<(), StoreError> {
        let expiry = now.checked_add(ttl).ok_or_else(|| {
            StoreError::Protocol(format!("session lifetime {ttl:?} overflows the clock"))
        })?;

        let mut inner = self.inner.lock();

        inner.sessions.retain(|_, (_, expiry)| *expiry > now);

        if let Some(previous) = inner.current.remove(login) {
            inner.sessions.remove(&previous);
        }
        inner
            .sessions
            .insert(session_id.to_string(), (login.to_string(), expiry));
        inner
            .current
            .insert(login.to_string(), session_id.to_string());
        Ok(())
    }

    fn session_login_at(&self, session_id: &str, now: SystemTime) -> Option<String> {
        let mut inner = self.inner.lock();

        let entry = inner.sessions.get(session_id).cloned();
        match entry {
            Some((login, expiry)) if expiry > now => Some(login),
            Some(_) => {
                inner.sessions.remove(session_id);
                None
            }
            None => None,
        }
    }

    #[cfg(test)]
    fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create_account(&self, login: &str, password_hash: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        if inner.users.contains_key(login) {
            return Ok(false);
        }
        inner
            .users
            .insert(login.to_string(), password_hash.to_string());
        Ok(true)
    }

    async fn password_hash(&self, login: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().users.get(login).cloned())
    }

    async fn replace_session(
        &self,
        login: &str,
        session_id: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.replace_session_at(login, session_id, ttl, SystemTime::now())
    }

    async fn session_login(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.session_login_at(session_id, SystemTime::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_account_once() {
        let store = MemoryAccountStore::new();

        assert!(store.create_account("alice", "h1").await.unwrap());
        assert!(!store.create_account("alice", "h2").await.unwrap());
        assert_eq!(
            store.password_hash("alice").await.unwrap().as_deref(),
            Some("h1")
        );
        assert!(store.password_hash("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_new_session_replaces_previous() {
        let store = MemoryAccountStore::new();
        let ttl = Duration::from_secs(1800);

        store.replace_session("alice", "s1", ttl).await.unwrap();
        store.replace_session("alice", "s2", ttl).await.unwrap();

        assert!(store.session_login("s1").await.unwrap().is_none());
        assert_eq!(
            store.session_login("s2").await.unwrap().as_deref(),
            Some("alice")
        );
    }

    #[test]
    fn test_sessions_expire() {
        let store = MemoryAccountStore::new();
        let t0 = SystemTime::now();

        store
            .replace_session_at("alice", "s1", Duration::from_secs(1800), t0)
            .unwrap();
        assert!(
            store
                .session_login_at("s1", t0 + Duration::from_secs(1799))
                .is_some()
        );
        assert!(
            store
                .session_login_at("s1", t0 + Duration::from_secs(1800))
                .is_none()
        );
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn test_expired_sessions_swept_on_create() {
        let store = MemoryAccountStore::new();
        let t0 = SystemTime::now();

        store
            .replace_session_at("alice", "s1", Duration::from_secs(10), t0)
            .unwrap();
        store
            .replace_session_at("bob", "s2", Duration::from_secs(10), t0)
            .unwrap();
        store
            .replace_session_at(
                "carol",
                "s3",
                Duration::from_secs(10),
                t0 + Duration::from_secs(11),
            )
            .unwrap();

        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_session_lifetime_is_an_error() {
        let store = MemoryAccountStore::new();

        let result = store.replace_session("alice", "s1", Duration::MAX).await;
        assert!(matches!(result, Err(StoreError::Protocol(_))));
        assert_eq!(store.session_count(), 0);
    }
}
