//! Load timeout policy.

use std::time::Duration;

use crate::config::CacheConfig;

/// What happens to a URL load that runs for too long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// No bound; the load runs until the fetcher returns.
    None,
    /// Abort the load after the duration and fail its record.
    Cancel(Duration),
    /// Log a warning once the load has exceeded the duration, but let it finish.
    Warn(Duration),
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::Cancel(CacheConfig::DEFAULT_LOAD_TIMEOUT)
    }
}

impl From<Option<Duration>> for TimeoutPolicy {
    fn from(timeout: Option<Duration>) -> Self {
        timeout.map_or(Self::None, Self::Cancel)
    }
}
