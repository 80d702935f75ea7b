//! Fixed-window rate limiter
//!
//! This module provides [`FixedWindowLimiter`], which counts requests per key
//! in discrete, non-overlapping windows. Each check is a single
//! increment-with-expiry against the [`Store`], so the limiter itself keeps no
//! state beyond the store it owns.

use super::{Decision, LimitError, Quota, WindowState, store::Store};
use std::time::{Duration, SystemTime};

/// Fixed-window counter limiter
///
/// # Example
///
/// ```
/// use vortexbox_limiter::{FixedWindowLimiter, PeriodicStore, Quota};
/// use std::time::SystemTime;
///
/// let mut limiter = FixedWindowLimiter::new(PeriodicStore::new());
/// let quota = Quota::per_minute(100).unwrap();
///
/// let decision = limiter.admit("ip:10.0.0.1", quota, SystemTime::now()).unwrap();
/// assert!(decision.is_allowed());
/// ```
pub struct FixedWindowLimiter<S: Store> {
    store: S,
}

impl<S: Store> FixedWindowLimiter<S> {
    /// Create a new limiter over the given store
    pub fn new(store: S) -> Self {
        FixedWindowLimiter { store }
    }

    /// Count one request for `key` and decide whether it is admitted
    ///
    /// The increment happens whether or not the request is admitted, so a
    /// client that keeps hammering a closed window does not shorten it.
    ///
    /// # Errors
    ///
    /// - [`LimitError::Store`]: If the store fails to apply the increment
    ///
    /// # Example
    ///
    /// ```
    /// use vortexbox_limiter::{Decision, FixedWindowLimiter, PeriodicStore, Quota};
    /// use std::time::{Duration, SystemTime};
    ///
    /// let mut limiter = FixedWindowLimiter::new(PeriodicStore::new());
    /// let quota = Quota::new(1, Duration::from_secs(60)).unwrap();
    /// let now = SystemTime::now();
    ///
    /// assert!(limiter.admit("client", quota, now).unwrap().is_allowed());
    /// match limiter.admit("client", quota, now).unwrap() {
    ///     Decision::Deny { retry_after } => assert_eq!(retry_after, Duration::from_secs(60)),
    ///     Decision::Allow { .. } => unreachable!(),
    /// }
    /// ```
    pub fn admit(
        &mut self,
        key: &str,
        quota: Quota,
        now: SystemTime,
    ) -> Result<Decision, LimitError> {
        let state = self.count(key, quota.period(), now)?;
        Ok(quota.decide(state))
    }

    /// Count one request for `key` without deciding
    ///
    /// For callers that apply the quota themselves, e.g. after the state has
    /// crossed a task boundary.
    ///
    /// # Errors
    ///
    /// - [`LimitError::Store`]: If the store fails to apply the increment
    pub fn count(
        &mut self,
        key: &str,
        period: Duration,
        now: SystemTime,
    ) -> Result<WindowState, LimitError> {
        self.store
            .increment(key, period, now)
            .map_err(LimitError::Store)
    }
}
