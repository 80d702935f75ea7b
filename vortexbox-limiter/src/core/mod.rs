//! Core components of the vortexbox fixed-window limiter
//!
//! This module contains the fundamental building blocks:
//! - [`quota`]: Quotas, window state and admission decisions
//! - [`rate_limiter`]: The fixed-window limiter over a [`Store`]
//! - [`store`]: Storage backends for window counters

pub mod quota;
pub mod rate_limiter;
pub mod store;

pub use quota::{Decision, Quota, WindowState};
pub use rate_limiter::FixedWindowLimiter;
pub use store::{PeriodicStore, PeriodicStoreBuilder, Store};

use std::error::Error;
use std::fmt;

/// Errors that can occur during admission checks
///
/// # Variants
///
/// - [`InvalidQuota`](LimitError::InvalidQuota): The limit was zero or the period too short
/// - [`Store`](LimitError::Store): The counter store failed to apply an increment
///
/// # Example
///
/// ```
/// use vortexbox_limiter::{LimitError, Quota};
/// use std::time::Duration;
///
/// match Quota::new(0, Duration::from_secs(60)) {
///     Err(LimitError::InvalidQuota) => println!("a zero limit admits nothing"),
///     _ => {}
/// }
/// ```
#[derive(Debug)]
pub enum LimitError {
    /// Quota parameters are invalid (limit == 0 or period < 1ms)
    InvalidQuota,
    /// The store could not apply the increment
    Store(String),
}

impl fmt::Display for LimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitError::InvalidQuota => write!(f, "invalid quota parameters"),
            LimitError::Store(msg) => write!(f, "store error: {msg}"),
        }
    }
}

impl Error for LimitError {}
