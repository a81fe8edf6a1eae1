//! Cache settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Settings of a [`BlueprintCache`](crate::BlueprintCache).
///
/// Durations (de)serialize in humantime form (`"30s"`, `"500ms"`, `"1m"`).
/// Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Idle time after which a URL record is evicted.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Pause between two cleanup sweeps.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Bound on one URL load; `None` lets loads run until they finish.
    #[serde(with = "humantime_serde")]
    pub load_timeout: Option<Duration>,
    /// Maximum number of embedded records kept at once.
    pub embedded_capacity: u64,
}

impl CacheConfig {
    /// Default idle TTL of URL records.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(30);
    /// Default pause between sweeps.
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);
    /// Default bound on one URL load.
    pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default embedded cache capacity.
    pub const DEFAULT_EMBEDDED_CAPACITY: u64 = 1024;

    /// Create a new builder for CacheConfig.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Checks the settings.
    ///
    /// The TTL must exceed the sweep interval, so a record left untouched
    /// across two consecutive sweeps is reliably collected by the second.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.sweep_interval.is_zero() {
            return Err(CacheError::Config(
                "sweep_interval must be greater than zero".to_string(),
            ));
        }
        if self.ttl <= self.sweep_interval {
            return Err(CacheError::Config(format!(
                "ttl ({:?}) must exceed sweep_interval ({:?})",
                self.ttl, self.sweep_interval
            )));
        }
        if self.load_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(CacheError::Config(
                "load_timeout must be greater than zero".to_string(),
            ));
        }
        if self.embedded_capacity == 0 {
            return Err(CacheError::Config(
                "embedded_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Self::DEFAULT_TTL,
            sweep_interval: Self::DEFAULT_SWEEP_INTERVAL,
            load_timeout: Some(Self::DEFAULT_LOAD_TIMEOUT),
            embedded_capacity: Self::DEFAULT_EMBEDDED_CAPACITY,
        }
    }
}

/// Builder for CacheConfig.
#[derive(Debug, Clone, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Set the idle TTL of URL records.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// Set the pause between sweeps.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Bound every URL load by `timeout`.
    pub fn load_timeout(mut self, timeout: Duration) -> Self {
        self.config.load_timeout = Some(timeout);
        self
    }

    /// Let URL loads run without a bound.
    pub fn no_load_timeout(mut self) -> Self {
        self.config.load_timeout = None;
        self
    }

    /// Set the embedded cache capacity.
    pub fn embedded_capacity(mut self, capacity: u64) -> Self {
        self.config.embedded_capacity = capacity;
        self
    }

    /// Validate and build the CacheConfig.
    pub fn build(self) -> Result<CacheConfig, CacheError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
