use super::Store;
use crate::core::WindowState;
use std::time::{Duration, SystemTime};

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

// Configuration constants
const DEFAULT_CAPACITY: usize = 1000;
const CAPACITY_OVERHEAD_FACTOR: f64 = 1.3;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// In-memory window table with fixed-interval sweeping
///
/// Each key maps to its request count and the instant its window expires.
/// Expired windows are reopened lazily on the next increment and physically
/// removed by a sweep that runs at most once per cleanup interval, so idle
/// clients do not accumulate forever.
///
/// The store is single-owner (`&mut self`); sharing it between tasks is the
/// caller's job, e.g. by putting it behind one actor.
///
/// # Example
///
/// ```
/// use vortexbox_limiter::{FixedWindowLimiter, PeriodicStore};
///
/// // Sweep expired windows every 5 minutes
/// let store = PeriodicStore::builder()
///     .cleanup_interval(std::time::Duration::from_secs(300))
///     .build();
/// let mut limiter = FixedWindowLimiter::new(store);
/// ```
pub struct PeriodicStore {
    data: HashMap<String, (u64, SystemTime)>,
    // Track when next cleanup is needed; `None` once the interval runs past
    // the end of the clock
    next_cleanup: Option<SystemTime>,
    // Cleanup interval
    cleanup_interval: Duration,
    // Track number of expired entries
    expired_count: usize,
}

/// Builder for configuring a PeriodicStore
///
/// Provides a fluent interface for customizing the periodic store's behavior.
///
/// # Example
///
/// ```
/// use vortexbox_limiter::PeriodicStore;
/// use std::time::Duration;
///
/// let store = PeriodicStore::builder()
///     .capacity(100_000)
///     .cleanup_interval(Duration::from_secs(120))
///     .build();
/// ```
pub struct PeriodicStoreBuilder {
    capacity: usize,
    cleanup_interval: Duration,
}

impl PeriodicStore {
    /// Create a new PeriodicStore with default configuration
    ///
    /// Uses a default capacity of 1000 entries and cleanup interval of 60 seconds.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new PeriodicStore with specified capacity
    ///
    /// The store will allocate 30% more space to reduce hash collisions.
    ///
    /// # Parameters
    ///
    /// - `capacity`: Expected number of unique keys to track
    pub fn with_capacity(capacity: usize) -> Self {
        PeriodicStore {
            // Pre-allocate with overhead to avoid rehashing
            data: HashMap::with_capacity((capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize),
            next_cleanup: SystemTime::now()
                .checked_add(Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS)),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            expired_count: 0,
        }
    }

    /// Create a new builder for configuring a PeriodicStore
    ///
    /// Provides fine-grained control over store configuration.
    pub fn builder() -> PeriodicStoreBuilder {
        PeriodicStoreBuilder {
            capacity: DEFAULT_CAPACITY,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }

    fn with_config(capacity: usize, cleanup_interval: Duration) -> Self {
        PeriodicStore {
            data: HashMap::with_capacity((capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize),
            next_cleanup: SystemTime::now().checked_add(cleanup_interval),
            cleanup_interval,
            expired_count: 0,
        }
    }

    /// Number of tracked keys, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether no keys are tracked
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of windows removed by the last sweep
    pub fn expired_count(&self) -> usize {
        self.expired_count
    }

    fn maybe_clean_expired(&mut self, now: SystemTime) {
        // Clean periodically based on time
        if self.next_cleanup.is_some_and(|at| now >= at) {
            let before_count = self.data.len();
            self.data.retain(|_, (_, expiry)| *expiry > now);
            self.expired_count = before_count.saturating_sub(self.data.len());
            self.next_cleanup = now.checked_add(self.cleanup_interval);
        }
    }
}

impl Default for PeriodicStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for PeriodicStore {
    fn increment(
        &mut self,
        key: &str,
        period: Duration,
        now: SystemTime,
    ) -> Result<WindowState, String> {
        // Only clean periodically, not on every operation
        self.maybe_clean_expired(now);

        let expiry = now
            .checked_add(period)
            .ok_or_else(|| format!("window period {period:?} overflows the clock"))?;

        match self.data.get_mut(key) {
            Some((count, current)) if *current > now => {
                *count = count.saturating_add(1);
                Ok(WindowState {
                    count: *count,
                    ttl: current.duration_since(now).unwrap_or(Duration::ZERO),
                })
            }
            Some(entry) => {
                // Window expired but not swept yet - reopen it in place
                *entry = (1, expiry);
                Ok(WindowState {
                    count: 1,
                    ttl: period,
                })
            }
            None => {
                self.data.insert(key.to_string(), (1, expiry));
                Ok(WindowState {
                    count: 1,
                    ttl: period,
                })
            }
        }
    }
}

impl Default for PeriodicStoreBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }
}

impl PeriodicStoreBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expected capacity (number of unique keys)
    ///
    /// The store will allocate 30% more space to reduce hash collisions.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the interval between cleanup operations
    ///
    /// Expired entries will be removed every `interval` duration.
    /// Shorter intervals mean more consistent memory usage but higher CPU overhead.
    ///
    /// # Example
    ///
    /// ```
    /// use vortexbox_limiter::PeriodicStore;
    /// use std::time::Duration;
    ///
    /// let store = PeriodicStore::builder()
    ///     .cleanup_interval(Duration::from_secs(300)) // Clean every 5 minutes
    ///     .build();
    /// ```
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Build the PeriodicStore with the configured settings
    pub fn build(self) -> PeriodicStore {
        PeriodicStore::with_config(self.capacity, self.cleanup_interval)
    }
}
