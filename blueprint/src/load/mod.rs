//! Background loading of URL records.
//!
//! A record registered by [`UrlCache`](crate::UrlCache) starts out `Pending`.
//! The [`LoadManager`] drives it from there: it spawns one task per record on
//! the cache's runtime, bounds the task according to a [`TimeoutPolicy`], and
//! always leaves the record `Ready` or `Error`.
//!
//! # Example
//!
//! ```ignore
//! use blueprint::load::{LoadManager, TimeoutPolicy};
//!
//! let manager = LoadManager::new(fetcher, decoder, TimeoutPolicy::default(), handle);
//! manager.spawn(record.clone());
//! record.wait_settled().await;
//! ```

mod manager;
mod policy;

pub use manager::LoadManager;
pub use policy::TimeoutPolicy;
