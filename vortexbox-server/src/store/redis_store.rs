//! Redis backend
//!
//! # Key Layout
//!
//! | Key                              | Type   | Purpose                               |
//! |----------------------------------|--------|---------------------------------------|
//! | `{prefix}:rl:{identity}`         | string | Request count of the current window   |
//! | `{prefix}:users`                 | hash   | login -> salted password hash         |
//! | `{prefix}:session:{id}`          | string | Session id -> login, expires with TTL |
//! | `{prefix}:user-session:{login}`  | string | Login -> its current session id       |
//!
//! Window keys carry a millisecond expiry equal to the window length and
//! vanish on their own; nothing here ever scans or sweeps.

use super::{AccountStore, CounterStore};
use crate::error::StoreError;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::time::{Duration, SystemTime};
use tokio::sync::OnceCell;
use vortexbox_limiter::WindowState;

/// Count, and start the expiry clock on the first hit of a window.
///
/// A key that somehow lost its TTL (PTTL -1) gets one again instead of
/// locking its client out forever.
const INCREMENT_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if count == 1 or ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
  ttl = tonumber(ARGV[1])
end
return {count, ttl}
";

/// Point the login at a new session and drop the one it replaces.
const REPLACE_SESSION_SCRIPT: &str = r"
local previous = redis.call('GET', KEYS[2])
if previous then
  redis.call('DEL', ARGV[3] .. previous)
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
redis.call('SET', KEYS[2], ARGV[4], 'EX', ARGV[2])
return 1
";

/// Counter, account and session store on a Redis instance
///
/// One multiplexed connection is shared by all requests. It is opened on
/// first use and re-opened by the connection manager after failures. Every
/// operation is bounded by `timeout`.
pub struct RedisBackend {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    prefix: String,
    timeout: Duration,
    increment: redis::Script,
    replace_session: redis::Script,
}

impl RedisBackend {
    /// Create a backend for `url`
    ///
    /// No connection is made yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Protocol`] if the URL is not a valid Redis URL.
    pub fn new(url: &str, prefix: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Protocol(format!("invalid Redis URL {url}: {e}")))?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
            prefix: prefix.to_string(),
            timeout,
            increment: redis::Script::new(INCREMENT_SCRIPT),
            replace_session: redis::Script::new(REPLACE_SESSION_SCRIPT),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                tracing::debug!("Connecting to Redis");
                ConnectionManager::new(self.client.clone()).await
            })
            .await?;

        Ok(manager.clone())
    }

    /// Run `op` against a live connection, bounded by the store timeout
    async fn run<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempt = async {
            let conn = self.connection().await?;
            op(conn).await
        };

        tokio::time::timeout(self.timeout, attempt)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }

    fn users_key(&self) -> String {
        format!("{}:users", self.prefix)
    }

    fn session_prefix(&self) -> String {
        format!("{}:session:", self.prefix)
    }

    fn user_session_key(&self, login: &str) -> String {
        format!("{}:user-session:{login}", self.prefix)
    }
}

/// Redis expiries are signed 64-bit
fn redis_expiry(value: u128, what: &str) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::Protocol(format!("{what} of {value} is too large for Redis")))
}

#[async_trait]
impl CounterStore for RedisBackend {
    /// Redis decides window membership with its own clock; `now` is unused.
    async fn increment(
        &self,
        key: &str,
        period: Duration,
        _now: SystemTime,
    ) -> Result<WindowState, StoreError> {
        let period_ms = redis_expiry(period.as_millis(), "window period")?.max(1);

        self.run(|mut conn| async move {
            let (count, ttl_ms): (i64, i64) = self
                .increment
                .key(key)
                .arg(period_ms)
                .invoke_async(&mut conn)
                .await?;

            if count < 1 {
                return Err(StoreError::Protocol(format!(
                    "window counter for {key} is {count}"
                )));
            }

            Ok(WindowState {
                count: count as u64,
                ttl: Duration::from_millis(ttl_ms.max(0) as u64),
            })
        })
        .await
    }
}

#[async_trait]
impl AccountStore for RedisBackend {
    async fn create_account(&self, login: &str, password_hash: &str) -> Result<bool, StoreError> {
        let users = self.users_key();
        self.run(|mut conn| async move {
            let created: bool = conn.hset_nx(&users, login, password_hash).await?;
            Ok(created)
        })
        .await
    }

    async fn password_hash(&self, login: &str) -> Result<Option<String>, StoreError> {
        let users = self.users_key();
        self.run(|mut conn| async move {
            let hash: Option<String> = conn.hget(&users, login).await?;
            Ok(hash)
        })
        .await
    }

    async fn replace_session(
        &self,
        login: &str,
        session_id: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let session_prefix = self.session_prefix();
        let session_key = format!("{session_prefix}{session_id}");
        let pointer_key = self.user_session_key(login);
        let ttl_secs = redis_expiry(u128::from(ttl.as_secs()), "session lifetime")?.max(1);

        self.run(|mut conn| async move {
            let _: i64 = self
                .replace_session
                .key(&session_key)
                .key(&pointer_key)
                .arg(login)
                .arg(ttl_secs)
                .arg(&session_prefix)
                .arg(session_id)
                .invoke_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn session_login(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        let session_key = format!("{}{session_id}", self.session_prefix());
        self.run(|mut conn| async move {
            let login: Option<String> = conn.get(&session_key).await?;
            Ok(login)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_rejected() {
        assert!(RedisBackend::new("not a url", "vb", Duration::from_millis(100)).is_err());
        assert!(
            RedisBackend::new("redis://127.0.0.1:6379/", "vb", Duration::from_millis(100)).is_ok()
        );
    }

    #[test]
    fn test_expiry_range() {
        assert_eq!(redis_expiry(60_000, "window period").unwrap(), 60_000);
        assert!(redis_expiry(Duration::MAX.as_millis(), "window period").is_err());
    }

    #[tokio::test]
    async fn test_oversized_period_rejected_before_connecting() {
        // Nothing listens here; the range check must fail first
        let backend =
            RedisBackend::new("redis://127.0.0.1:1/", "vb", Duration::from_millis(100)).unwrap();

        let err = backend
            .increment("vb:rl:ip:10.0.0.1", Duration::MAX, SystemTime::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Protocol(_)));
    }

    #[test]
    fn test_key_layout() {
        let backend =
            RedisBackend::new("redis://127.0.0.1:6379/", "vb", Duration::from_millis(100))
                .unwrap();
        assert_eq!(backend.users_key(), "vb:users");
        assert_eq!(backend.session_prefix(), "vb:session:");
        assert_eq!(backend.user_session_key("alice"), "vb:user-session:alice");
    }

    #[tokio::test]
    async fn test_unreachable_store_reports_error() {
        // Nothing listens on port 1
        let backend =
            RedisBackend::new("redis://127.0.0.1:1/", "vb", Duration::from_millis(200)).unwrap();

        let result = backend
            .increment("vb:rl:ip:127.0.0.1", Duration::from_secs(60), SystemTime::now())
            .await;
        assert!(matches!(
            result,
            Err(StoreError::Unavailable(_)) | Err(StoreError::Timeout(_))
        ));
    }
}
