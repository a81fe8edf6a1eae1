//! Built-in fetchers.
//!
//! [`FileFetcher`] reads `file://` URLs from disk. [`SchemeFetcher`] routes
//! local URLs to it and everything else to an optional remote fetcher
//! supplied by the host; without one, remote URLs fail with
//! [`FetchError::UnsupportedScheme`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use blueprint_core::{FetchError, Fetcher, Payload, is_local};
use bytes::Bytes;
use smol_str::SmolStr;
use tracing::trace;
use url::Url;

/// Reads `file://` URLs.
///
/// Accepts absolute paths with an empty or `localhost` host
/// (`file:///abs/path`, `file://localhost/abs/path`). Percent-encoded
/// characters are decoded. Any other host is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl FileFetcher {
    /// Path named by a `file://` URL.
    pub fn path(url: &str) -> Result<PathBuf, FetchError> {
        let invalid = |reason: &str| FetchError::InvalidUrl {
            url: SmolStr::new(url),
            reason: SmolStr::new(reason),
        };
        if !is_local(url) {
            return Err(invalid("not a file:// url"));
        }
        let parsed = Url::parse(url).map_err(|error| invalid(&error.to_string()))?;
        let has_file_name = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .is_some_and(|name| !name.is_empty());
        if !has_file_name {
            return Err(invalid("missing path"));
        }
        parsed
            .to_file_path()
            .map_err(|()| invalid("not a path on this host"))
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self, url: &str) -> Result<Payload, FetchError> {
        let path = Self::path(url)?;
        trace!(path = %path.display(), "reading blueprint file");
        let raw = tokio::fs::read(&path).await?;
        Ok(Bytes::from(raw))
    }
}

/// Routes URLs to a fetcher by scheme.
#[derive(Clone, Default)]
pub struct SchemeFetcher {
    local: FileFetcher,
    remote: Option<Arc<dyn Fetcher>>,
}

impl SchemeFetcher {
    /// Fetcher serving `file://` URLs only.
    pub fn local_only() -> Self {
        Self::default()
    }

    /// Serve non-local URLs with `remote`.
    pub fn with_remote(mut self, remote: impl Fetcher + 'static) -> Self {
        self.remote = Some(Arc::new(remote));
        self
    }

    /// `true` if remote URLs have a transport.
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }
}

#[async_trait]
impl Fetcher for SchemeFetcher {
    async fn fetch(&self, url: &str) -> Result<Payload, FetchError> {
        if is_local(url) {
            return self.local.fetch(url).await;
        }
        match &self.remote {
            Some(remote) => remote.fetch(url).await,
            None => {
                let scheme = url.split_once("://").map_or(url, |(scheme, _)| scheme);
                Err(FetchError::UnsupportedScheme(SmolStr::new(scheme)))
            }
        }
    }
}

impl std::fmt::Debug for SchemeFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemeFetcher")
            .field("remote", &self.remote.is_some())
            .finish()
    }
}
