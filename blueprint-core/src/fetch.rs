//! Transport seam for URL sources.

use std::sync::Arc;

use async_trait::async_trait;
use smol_str::SmolStr;
use thiserror::Error;

use crate::Payload;

/// Failure to obtain the raw bytes behind a URL.
#[derive(Debug, Error)]
pub enum FetchError {
    /// No transport handles this URL's scheme.
    #[error("no transport for url scheme `{0}`")]
    UnsupportedScheme(SmolStr),
    /// The URL could not be turned into a request.
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl {
        /// Offending URL.
        url: SmolStr,
        /// What is wrong with it.
        reason: SmolStr,
    },
    /// Local file access failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Error raised by a host-supplied transport.
    #[error(transparent)]
    Transport(Box<dyn std::error::Error + Send + Sync>),
}

impl FetchError {
    /// Wraps any transport error.
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(error))
    }
}

/// Fetches the raw bytes behind a URL.
///
/// Called from a background load task, never while a cache lock is held.
/// Implementations do not need their own timeout: the load manager bounds
/// every fetch.
///
/// # Examples
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use blueprint_core::{FetchError, Fetcher, Payload};
///
/// struct HttpFetcher {
///     client: reqwest::Client,
/// }
///
/// #[async_trait]
/// impl Fetcher for HttpFetcher {
///     async fn fetch(&self, url: &str) -> Result<Payload, FetchError> {
///         let response = self.client.get(url).send().await.map_err(FetchError::transport)?;
///         response.bytes().await.map_err(FetchError::transport)
///     }
/// }
/// ```
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the raw, still encoded bytes at `url`.
    async fn fetch(&self, url: &str) -> Result<Payload, FetchError>;
}

#[async_trait]
impl<T> Fetcher for Arc<T>
where
    T: Fetcher + ?Sized,
{
    async fn fetch(&self, url: &str) -> Result<Payload, FetchError> {
        self.as_ref().fetch(url).await
    }
}

#[async_trait]
impl<T> Fetcher for Box<T>
where
    T: Fetcher + ?Sized,
{
    async fn fetch(&self, url: &str) -> Result<Payload, FetchError> {
        self.as_ref().fetch(url).await
    }
}
