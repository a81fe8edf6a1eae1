#![warn(missing_docs)]
//! # blueprint-core
//!
//! Core traits and types for the blueprint payload cache.
//!
//! A blueprint payload is referenced either by bytes embedded in a persisted
//! tag or by a URL. This crate defines the pieces the cache service in the
//! `blueprint` crate is assembled from:
//!
//! - **Track** the load of one payload source ([`PayloadRecord`], [`LoadState`])
//! - **Decide** whether a URL may be downloaded ([`DownloadPolicy`])
//! - **Fetch** the raw bytes behind a URL ([`Fetcher`])
//! - **Decode** raw bytes into a usable payload ([`PayloadDecoder`])
//! - **Describe** where a payload comes from ([`BlueprintTag`], [`Source`], [`TagHolder`])
//!
//! ## Feature Flags
//!
//! - `zlib` (default) - Enable [`ZlibDecoder`]
//!

pub mod decode;
pub mod fetch;
pub mod policy;
pub mod record;
pub mod source;
pub mod state;

#[cfg(feature = "zlib")]
pub use decode::ZlibDecoder;
pub use decode::{DecodeError, PayloadDecoder, RawDecoder};
pub use fetch::{FetchError, Fetcher};
pub use policy::{
    AllowAll, DenyAll, DownloadPolicy, DownloadPolicyExt, FnPolicy, LOCAL_SCHEME, is_local,
    policy_fn,
};
pub use record::PayloadRecord;
pub use source::{BlueprintTag, Source, TagHolder};
pub use state::LoadState;

#[doc(hidden)]
pub use smol_str::SmolStr;

/// Loaded payload bytes.
/// Using `Bytes` makes handing the payload to many readers a reference-count bump.
pub type Payload = bytes::Bytes;
