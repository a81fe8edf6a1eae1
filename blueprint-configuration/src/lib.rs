//! YAML configuration for the blueprint payload cache.
//!
//! ```yaml
//! cache:
//!   ttl: 30s
//!   sweep_interval: 5s
//!   load_timeout: 30s
//!   embedded_capacity: 1024
//! downloads:
//!   mode: AllowList
//!   hosts:
//!     - blueprints.example.com
//!     - "*.cdn.example.com"
//! ```
//!
//! Every section and field is optional; missing ones take their defaults,
//! which leave remote downloads disabled.

use std::path::Path;

use blueprint::{BlueprintCache, BlueprintCacheBuilder, CacheConfig};
use serde::{Deserialize, Serialize};

pub mod downloads;
pub mod error;

pub use downloads::{DownloadMode, DownloadRules, DownloadsConfig};
pub use error::ConfigError;

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct BlueprintConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub downloads: DownloadsConfig,
}

impl BlueprintConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_saphyr::from_str(yaml)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Validates the settings and compiles the download rules.
    pub fn into_parts(self) -> Result<(CacheConfig, DownloadRules), ConfigError> {
        self.cache.validate()?;
        let rules = self.downloads.into_rules()?;
        Ok((self.cache, rules))
    }

    /// A cache builder with this configuration's settings and download
    /// rules applied. Fetcher, decoder and runtime are left to the caller.
    pub fn into_builder(self) -> Result<BlueprintCacheBuilder, ConfigError> {
        let (config, rules) = self.into_parts()?;
        Ok(BlueprintCache::builder().config(config).policy(rules))
    }
}
