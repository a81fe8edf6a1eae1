//! Download permission gate.
//!
//! [`DownloadPolicy`] is the seam to the host's configuration: it answers
//! whether a remote URL may be fetched. Local resources (URLs starting with
//! [`LOCAL_SCHEME`]) are always permitted; that rule lives in
//! [`DownloadPolicyExt::allowed`] so no policy implementation can override it.
//!
//! ```
//! use blueprint_core::{DenyAll, DownloadPolicyExt, policy_fn};
//!
//! assert!(DenyAll.allowed("file:///tmp/house.bp"));
//! assert!(!DenyAll.allowed("https://example.com/house.bp"));
//!
//! let trusted = policy_fn(|url: &str| url.starts_with("https://trusted.example/"));
//! assert!(trusted.allowed("https://trusted.example/house.bp"));
//! ```

use std::fmt;
use std::sync::Arc;

/// URL prefix identifying local resources.
pub const LOCAL_SCHEME: &str = "file://";

/// Returns `true` if `url` names a local resource.
#[inline]
pub fn is_local(url: &str) -> bool {
    url.starts_with(LOCAL_SCHEME)
}

/// Decides whether a remote URL may be downloaded.
///
/// Implementations must be cheap, side-effect free and safe to call from any
/// thread: the URL cache consults them while holding its per-key lock.
pub trait DownloadPolicy: Send + Sync {
    /// The host configuration's per-URL decision.
    fn can_download(&self, url: &str) -> bool;
}

/// Extension methods for [`DownloadPolicy`].
pub trait DownloadPolicyExt: DownloadPolicy {
    /// `true` for local resources, otherwise [`DownloadPolicy::can_download`].
    fn allowed(&self, url: &str) -> bool {
        is_local(url) || self.can_download(url)
    }
}

impl<T> DownloadPolicyExt for T where T: DownloadPolicy + ?Sized {}

impl<T> DownloadPolicy for Arc<T>
where
    T: DownloadPolicy + ?Sized,
{
    fn can_download(&self, url: &str) -> bool {
        self.as_ref().can_download(url)
    }
}

impl<T> DownloadPolicy for Box<T>
where
    T: DownloadPolicy + ?Sized,
{
    fn can_download(&self, url: &str) -> bool {
        self.as_ref().can_download(url)
    }
}

impl<T> DownloadPolicy for &T
where
    T: DownloadPolicy + ?Sized,
{
    fn can_download(&self, url: &str) -> bool {
        (**self).can_download(url)
    }
}

/// Permits every URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl DownloadPolicy for AllowAll {
    fn can_download(&self, _url: &str) -> bool {
        true
    }
}

/// Denies every remote URL. Local resources stay allowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl DownloadPolicy for DenyAll {
    fn can_download(&self, _url: &str) -> bool {
        false
    }
}

/// Policy backed by a closure. Built with [`policy_fn`].
#[derive(Clone)]
pub struct FnPolicy<F> {
    check: F,
}

/// Wraps a closure as a [`DownloadPolicy`].
pub fn policy_fn<F>(check: F) -> FnPolicy<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    FnPolicy { check }
}

impl<F> DownloadPolicy for FnPolicy<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn can_download(&self, url: &str) -> bool {
        (self.check)(url)
    }
}

impl<F> fmt::Debug for FnPolicy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPolicy").finish_non_exhaustive()
    }
}
