use blueprint::CacheError;
use thiserror::Error;

/// Error loading or applying blueprint configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid host pattern '{pattern}': {reason}")]
    InvalidHostPattern {
        pattern: String,
        reason: &'static str,
    },

    #[error("invalid regex pattern '{pattern}': {error}")]
    InvalidRegex {
        pattern: String,
        #[source]
        error: regex::Error,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),
}
