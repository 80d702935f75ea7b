use super::WindowState;
use std::time::{Duration, SystemTime};

mod periodic;

pub use periodic::{PeriodicStore, PeriodicStoreBuilder};


/// Store trait for fixed-window counters (the INCR + EXPIRE pair of a Redis
/// rate limiter, as one call)
pub trait Store {
    /// Count one request against `key`
    ///
    /// If `key` has no live window at `now`, a new one is opened with a count
    /// of 1 that expires after `period`. Otherwise the count is incremented
    /// and the expiry is left untouched. Returns the state after the
    /// increment, or an error if `now + period` is not representable.
    fn increment(
        &mut self,
        key: &str,
        period: Duration,
        now: SystemTime,
    ) -> Result<WindowState, String>;
}
