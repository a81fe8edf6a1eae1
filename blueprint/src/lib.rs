#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Cache settings.
///
/// [`CacheConfig`] holds the URL record TTL, the sweep interval, the load
/// timeout and the embedded cache capacity, with humantime serialization and
/// a validating builder.
pub mod config;

/// Records for payloads embedded in their owner's tag.
///
/// Keyed by owner identity; entries die with their owner.
pub mod embedded;

/// Error types.
///
/// - [`CacheError`] for building a cache
/// - [`LoadError`] for why a URL record ended in `Error`
pub mod error;

/// Built-in fetchers for `file://` URLs and scheme routing.
pub mod fetch;

/// Background loading of URL records.
///
/// The [`LoadManager`](load::LoadManager) runs one task per registered URL
/// record, bounded by a [`TimeoutPolicy`](load::TimeoutPolicy).
pub mod load;

/// Metrics collection for cache observability.
///
/// When the `metrics` feature is enabled, this module provides counters for
/// hits, misses, denials, load outcomes and evictions, a gauge of active
/// loads and a histogram of load duration.
pub mod metrics;

mod service;

/// URL record registry with single-flight registration.
pub mod url_cache;

/// Periodic eviction of expired URL records.
pub mod worker;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use embedded::EmbeddedCache;
pub use error::{CacheError, LoadError};
pub use fetch::{FileFetcher, SchemeFetcher};
pub use load::{LoadManager, TimeoutPolicy};
pub use service::{BlueprintCache, BlueprintCacheBuilder, CacheStats};
pub use url_cache::{Lookup, UrlCache};
pub use worker::{CleanupWorker, Sweep, WorkerHandle};

#[cfg(feature = "zlib")]
pub use blueprint_core::ZlibDecoder;
pub use blueprint_core::{
    AllowAll, BlueprintTag, DecodeError, DenyAll, DownloadPolicy, DownloadPolicyExt, FetchError,
    Fetcher, LoadState, Payload, PayloadDecoder, PayloadRecord, RawDecoder, Source, TagHolder,
    is_local, policy_fn,
};
