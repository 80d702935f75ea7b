//! Shared store backends
//!
//! All mutable state that has to be consistent across server processes
//! (rate windows, accounts and sessions) lives behind the two traits in this
//! module. The server never locks around rate limiting itself; atomicity is
//! the backend's job.
//!
//! # Backends
//!
//! ## Redis
//! - Shared by every server process pointing at the same instance
//! - Window increments run as one Lua script (`INCR` + `PEXPIRE` + `PTTL`)
//! - Connects lazily and reconnects on its own, so an outage is a degraded
//!   condition rather than a startup failure
//!
//! ## Memory
//! - Process-local; windows are kept by a single actor task
//! - Best for: development, tests and single-instance deployments

pub mod memory;
pub mod redis_store;

use crate::actor::CounterActor;
use crate::config::{Config, StoreBackend};
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use vortexbox_limiter::{PeriodicStore, WindowState};

/// Atomic fixed-window counter
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count one request against `key`, opening a window of `period` if
    /// none is live
    ///
    /// The increment and the expiry must be applied as one indivisible
    /// operation. `now` is only a hint: backends with their own clock use
    /// that clock to decide window membership.
    async fn increment(
        &self,
        key: &str,
        period: Duration,
        now: SystemTime,
    ) -> Result<WindowState, StoreError>;
}

/// Account and session persistence
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Store a new account; returns `false` if the login is taken
    async fn create_account(&self, login: &str, password_hash: &str) -> Result<bool, StoreError>;

    /// Stored password hash for `login`
    async fn password_hash(&self, login: &str) -> Result<Option<String>, StoreError>;

    /// Store a session for `login`, dropping the login's previous session
    async fn replace_session(
        &self,
        login: &str,
        session_id: &str,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Login owning a live session
    async fn session_login(&self, session_id: &str) -> Result<Option<String>, StoreError>;
}

/// The store backends a server instance runs on
#[derive(Clone)]
pub struct Backends {
    pub counters: Arc<dyn CounterStore>,
    pub accounts: Arc<dyn AccountStore>,
}

/// Create the configured backends
///
/// Must be called from within a Tokio runtime: the memory backend spawns its
/// counter actor here.
///
/// # Errors
///
/// Returns an error if the Redis URL cannot be parsed. An unreachable Redis
/// is not an error at this point.
pub fn create_backends(config: &Config) -> Result<Backends, StoreError> {
    match config.store.backend {
        StoreBackend::Redis => {
            let backend = Arc::new(redis_store::RedisBackend::new(
                &config.store.redis_url,
                &config.store.key_prefix,
                config.store.timeout,
            )?);
            Ok(Backends {
                counters: backend.clone(),
                accounts: backend,
            })
        }
        StoreBackend::Memory => {
            let store = PeriodicStore::builder()
                .capacity(config.store.capacity)
                .cleanup_interval(config.store.cleanup_interval)
                .build();
            Ok(Backends {
                counters: Arc::new(CounterActor::spawn(config.buffer_size, store)),
                accounts: Arc::new(memory::MemoryAccountStore::new()),
            })
        }
    }
}
