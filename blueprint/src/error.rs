use std::time::Duration;

use blueprint_core::{DecodeError, FetchError};
use thiserror::Error;

/// Error building a [`BlueprintCache`](crate::BlueprintCache).
///
/// Resolution itself never fails with an error: denied or failed sources
/// surface as an absent record or a record in `Error` state.
#[derive(Debug, Error)]
pub enum CacheError {
    /// `build()` was called outside a tokio runtime and no handle was given.
    #[error("no tokio runtime available; call build() inside a runtime or pass runtime()")]
    NoRuntime,
    /// Rejected cache settings.
    #[error("invalid cache configuration: {0}")]
    Config(String),
}

/// Why an asynchronous URL load failed. Recorded as the record's error reason.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Transport failure.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// Fetched bytes could not be decoded.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    /// The load did not settle within the timeout.
    #[error("load timed out after {0:?}")]
    TimedOut(Duration),
    /// The load was cancelled by shutdown or by a newer load of the same URL.
    #[error("load cancelled: {0}")]
    Cancelled(&'static str),
}
