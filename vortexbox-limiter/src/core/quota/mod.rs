//! Quota and decision types for the fixed-window counter
//!
//! A [`Quota`] says how many requests a key may make per window. The store
//! reports where a key stands inside its current window as a
//! [`WindowState`], and [`Quota::decide`] turns that into a [`Decision`].

use super::LimitError;
use std::time::Duration;


/// Request allowance for a single key
///
/// # Examples
///
/// ```
/// use vortexbox_limiter::Quota;
/// use std::time::Duration;
///
/// // 60 requests per minute
/// let quota = Quota::new(60, Duration::from_secs(60)).unwrap();
/// assert_eq!(quota.limit(), 60);
///
/// // Same thing, spelled differently
/// let quota = Quota::per_minute(60).unwrap();
/// assert_eq!(quota.period(), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    limit: u64,
    period: Duration,
}

impl Quota {
    /// Creates a quota of `limit` requests per `period`
    ///
    /// # Errors
    ///
    /// Returns [`LimitError::InvalidQuota`] if `limit` is zero or `period`
    /// is shorter than one millisecond (the store's expiry resolution).
    pub fn new(limit: u64, period: Duration) -> Result<Self, LimitError> {
        if limit == 0 || period < Duration::from_millis(1) {
            return Err(LimitError::InvalidQuota);
        }
        Ok(Quota { limit, period })
    }

    /// Creates a quota of `n` requests per second
    pub fn per_second(n: u64) -> Result<Self, LimitError> {
        Self::new(n, Duration::from_secs(1))
    }

    /// Creates a quota of `n` requests per minute
    pub fn per_minute(n: u64) -> Result<Self, LimitError> {
        Self::new(n, Duration::from_secs(60))
    }

    /// Creates a quota of `n` requests per hour
    pub fn per_hour(n: u64) -> Result<Self, LimitError> {
        Self::new(n, Duration::from_secs(3600))
    }

    /// Maximum number of requests admitted per window
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Length of one window
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Decide whether the request that produced `state` is admitted
    ///
    /// `state.count` already includes the request being decided, so the
    /// request is allowed while the count stays within the limit. A denied
    /// request has to wait until the window expires.
    ///
    /// # Example
    ///
    /// ```
    /// use vortexbox_limiter::{Decision, Quota, WindowState};
    /// use std::time::Duration;
    ///
    /// let quota = Quota::per_minute(5).unwrap();
    ///
    /// let state = WindowState { count: 5, ttl: Duration::from_secs(60) };
    /// assert_eq!(quota.decide(state), Decision::Allow { remaining: 0 });
    ///
    /// let state = WindowState { count: 6, ttl: Duration::from_secs(59) };
    /// assert_eq!(
    ///     quota.decide(state),
    ///     Decision::Deny { retry_after: Duration::from_secs(59) }
    /// );
    /// ```
    pub fn decide(&self, state: WindowState) -> Decision {
        if state.count > self.limit {
            // A store that lost the expiry reports no TTL; a full period is
            // the only safe wait in that case.
            let retry_after = if state.ttl.is_zero() {
                self.period
            } else {
                state.ttl.min(self.period)
            };
            Decision::Deny { retry_after }
        } else {
            Decision::Allow {
                remaining: self.limit - state.count,
            }
        }
    }
}

/// Where a key stands inside its current window, right after an increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Requests counted in the current window, including the latest one
    pub count: u64,
    /// Time until the window expires
    pub ttl: Duration,
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed; `remaining` more fit in this window
    Allow { remaining: u64 },
    /// The request is rejected until the window resets
    Deny { retry_after: Duration },
}

impl Decision {
    /// Whether the request may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    /// Time to wait before retrying, zero when allowed
    pub fn retry_after(&self) -> Duration {
        match self {
            Decision::Allow { .. } => Duration::ZERO,
            Decision::Deny { retry_after } => *retry_after,
        }
    }

    /// `retry_after` rounded up to whole seconds, at least one for denials
    ///
    /// This is the value a `Retry-After` header carries.
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            Decision::Allow { .. } => 0,
            Decision::Deny { retry_after } => {
                let secs = retry_after.as_secs();
                let secs = if retry_after.subsec_nanos() > 0 {
                    secs + 1
                } else {
                    secs
                };
                secs.max(1)
            }
        }
    }
}
