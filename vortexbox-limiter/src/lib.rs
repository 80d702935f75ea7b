//! # VortexBox Limiter
//!
//! Fixed-window request counting for VortexBox admission control.
//!
//! ## Overview
//!
//! A fixed-window counter splits time into non-overlapping windows per key.
//! The first request of a window opens it with an expiry of one period; every
//! request increments the count; once the count passes the limit, requests
//! are denied until the window expires. This gives:
//! - **O(1) work per request**: one increment, one comparison
//! - **Bounded memory**: one counter per active key, dropped on expiry
//! - **A trivially shareable state**: the same increment-with-expiry maps
//!   onto a single atomic Redis script, so many server processes can share
//!   one window
//!
//! ## Quick Start
//!
//! ```
//! use vortexbox_limiter::{Decision, FixedWindowLimiter, PeriodicStore, Quota};
//! use std::time::SystemTime;
//!
//! let mut limiter = FixedWindowLimiter::new(PeriodicStore::new());
//!
//! // 60 requests per minute per client
//! let quota = Quota::per_minute(60).unwrap();
//!
//! match limiter.admit("ip:192.0.2.7", quota, SystemTime::now()).unwrap() {
//!     Decision::Allow { remaining } => println!("Allowed, {remaining} left"),
//!     Decision::Deny { retry_after } => println!("Retry in {retry_after:?}"),
//! }
//! ```
//!
//! ## Stores
//!
//! [`PeriodicStore`] keeps windows in a hash map and sweeps expired ones at a
//! fixed interval:
//!
//! ```
//! use vortexbox_limiter::PeriodicStore;
//!
//! let store = PeriodicStore::builder()
//!     .capacity(100_000)
//!     .cleanup_interval(std::time::Duration::from_secs(60))
//!     .build();
//! ```
//!
//! Other backends implement [`Store`]; a network store only has to provide
//! an atomic increment that sets the expiry on the first hit.
//!
//! ## Thread Safety
//!
//! The limiter itself is not thread-safe. For concurrent access, give it a
//! single owner (an actor task) or wrap it in a mutex.
//!
//! ## Features
//!
//! - `ahash` (default): Use AHash for faster hashing

pub mod core;

pub use core::{
    Decision, FixedWindowLimiter, LimitError, PeriodicStore, PeriodicStoreBuilder, Quota, Store,
    WindowState,
};

// Re-export the store module so benchmarks can access it
pub use crate::core::store;
