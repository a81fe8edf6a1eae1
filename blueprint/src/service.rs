//! The cache service tying URL records, embedded records, loads and the
//! cleanup worker together.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use blueprint_core::{
    DenyAll, DownloadPolicy, Fetcher, PayloadDecoder, PayloadRecord, RawDecoder, Source,
    TagHolder,
};
use bytes::Bytes;
use tokio::runtime::Handle;
use tracing::debug;

use crate::config::CacheConfig;
use crate::embedded::EmbeddedCache;
use crate::error::CacheError;
use crate::fetch::SchemeFetcher;
use crate::load::{LoadManager, TimeoutPolicy};
use crate::url_cache::{Lookup, UrlCache};
use crate::worker::{CleanupWorker, Sweep, WorkerHandle};

/// What the cleanup worker sweeps on each pass.
///
/// Holds the parts it cleans, not the service, so the worker never keeps the
/// service alive.
struct Housekeeping {
    urls: Arc<UrlCache>,
    embedded: Arc<EmbeddedCache>,
    loads: LoadManager,
}

impl Sweep for Housekeeping {
    fn sweep_expired(&self) -> usize {
        let evicted = self.urls.sweep_expired();
        let orphans = self.embedded.purge_orphans();
        if orphans > 0 {
            debug!(orphans, "purged embedded blueprint records of dropped owners");
        }
        self.loads.cleanup_finished();
        evicted
    }
}

struct Inner {
    urls: Arc<UrlCache>,
    embedded: Arc<EmbeddedCache>,
    loads: LoadManager,
    worker: OnceLock<WorkerHandle>,
    config: CacheConfig,
    runtime: Handle,
    closed: AtomicBool,
}

impl Inner {
    fn stop(&self) {
        if let Some(worker) = self.worker.get() {
            worker.stop();
        }
        self.loads.cancel_all();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Shared cache of blueprint payload records.
///
/// Cloning is cheap and every clone shares the same records, loads and
/// cleanup worker. The worker is started by the first URL resolution that
/// registers a record, and runs until [`shutdown`] or until the last clone is
/// dropped.
///
/// ```no_run
/// use std::sync::Arc;
///
/// use blueprint::{BlueprintCache, BlueprintTag, policy_fn};
///
/// # async fn example() -> Result<(), blueprint::CacheError> {
/// let cache = BlueprintCache::builder()
///     .policy(policy_fn(|url: &str| url.starts_with("https://trusted.example/")))
///     .build()?;
///
/// let item = Arc::new(BlueprintTag::remote((4, 2, 4), "file:///srv/blueprints/house.bp"));
/// if let Some(record) = cache.resolve_source(&item) {
///     record.wait_settled().await;
/// }
/// assert!(cache.is_written(&item));
/// # Ok(())
/// # }
/// ```
///
/// [`shutdown`]: BlueprintCache::shutdown
#[derive(Clone)]
pub struct BlueprintCache {
    inner: Arc<Inner>,
}

impl BlueprintCache {
    /// Create a new builder.
    pub fn builder() -> BlueprintCacheBuilder {
        BlueprintCacheBuilder::default()
    }

    /// Record for a URL source, or `None` if the policy denies the URL or the
    /// cache was shut down.
    ///
    /// A new record starts `Pending` and is loaded in the background; an
    /// existing one is returned as is, whatever its state.
    pub fn resolve_url(&self, url: &str) -> Option<Arc<PayloadRecord>> {
        if self.inner.closed.load(Ordering::SeqCst) {
            debug!(url, "blueprint cache is shut down, not resolving");
            return None;
        }
        match self.inner.urls.resolve(url) {
            Lookup::Cached(record) => Some(record),
            Lookup::Created(record) => {
                self.ensure_worker();
                self.inner.loads.spawn(Arc::clone(&record));
                // A shutdown racing this call may have missed the worker or
                // the load registered above.
                if self.inner.closed.load(Ordering::SeqCst) {
                    self.inner.stop();
                }
                Some(record)
            }
            Lookup::Denied => None,
        }
    }

    /// Record for bytes embedded in `owner`, decoded synchronously on first
    /// resolution.
    pub fn resolve_embedded<O>(&self, owner: &Arc<O>, raw: Bytes) -> Arc<PayloadRecord>
    where
        O: Send + Sync + 'static,
    {
        self.inner.embedded.resolve(owner, raw)
    }

    /// Record for the payload `holder`'s tag points at.
    ///
    /// Embedded data wins over a URL. `None` if there is no tag, the tag has
    /// no source, or the URL is denied.
    pub fn resolve_source<H>(&self, holder: &Arc<H>) -> Option<Arc<PayloadRecord>>
    where
        H: TagHolder,
    {
        match holder.tag()?.source()? {
            Source::Embedded(data) => Some(self.resolve_embedded(holder, data.clone())),
            Source::Url(url) => self.resolve_url(url),
        }
    }

    /// `true` if `holder` carries a complete blueprint: all three dimensions
    /// and a source whose record is usable.
    ///
    /// A URL record still loading counts as written; embedded bytes that fail
    /// to decode do not.
    pub fn is_written<H>(&self, holder: &Arc<H>) -> bool
    where
        H: TagHolder,
    {
        let Some(tag) = holder.tag() else {
            return false;
        };
        tag.has_dimensions()
            && self
                .resolve_source(holder)
                .is_some_and(|record| record.is_usable())
    }

    /// Forget the record owned by `owner`, e.g. after its embedded bytes
    /// changed.
    pub fn release<O>(&self, owner: &Arc<O>) -> Option<Arc<PayloadRecord>>
    where
        O: Send + Sync + 'static,
    {
        self.inner.embedded.release(owner)
    }

    /// Forget the record for `url` and cancel its load; the next resolution
    /// fetches again.
    pub fn invalidate(&self, url: &str) -> Option<Arc<PayloadRecord>> {
        self.inner.loads.cancel(url);
        self.inner.urls.remove(url)
    }

    fn ensure_worker(&self) {
        self.inner.worker.get_or_init(|| {
            let housekeeping = Housekeeping {
                urls: Arc::clone(&self.inner.urls),
                embedded: Arc::clone(&self.inner.embedded),
                loads: self.inner.loads.clone(),
            };
            CleanupWorker::new(Arc::new(housekeeping), self.inner.config.sweep_interval)
                .start(&self.inner.runtime)
        });
    }

    /// `true` while the cleanup worker runs.
    pub fn worker_running(&self) -> bool {
        self.inner
            .worker
            .get()
            .is_some_and(WorkerHandle::is_running)
    }

    /// Snapshot of the cache's size.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            url_records: self.inner.urls.len(),
            embedded_records: self.inner.embedded.len(),
            active_loads: self.inner.loads.active_count(),
            worker_running: self.worker_running(),
        }
    }

    /// Stop the cleanup worker and cancel every load.
    ///
    /// Records of cancelled loads end in `Error`. Later URL resolutions
    /// return `None`; embedded resolutions keep working.
    pub fn shutdown(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!("shutting down blueprint cache");
        }
        self.inner.stop();
    }

    /// `true` once [`shutdown`](BlueprintCache::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// URL records.
    pub fn urls(&self) -> &UrlCache {
        &self.inner.urls
    }

    /// Embedded records.
    pub fn embedded(&self) -> &EmbeddedCache {
        &self.inner.embedded
    }

    /// Background loads.
    pub fn loads(&self) -> &LoadManager {
        &self.inner.loads
    }

    /// Settings the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }
}

impl fmt::Debug for BlueprintCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlueprintCache")
            .field("urls", &self.inner.urls)
            .field("embedded", &self.inner.embedded)
            .field("loads", &self.inner.loads)
            .field("worker_running", &self.worker_running())
            .field("closed", &self.is_shut_down())
            .finish()
    }
}

/// Point-in-time counters returned by [`BlueprintCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Registered URL records, expired ones included until swept.
    pub url_records: usize,
    /// Embedded records.
    pub embedded_records: usize,
    /// URL loads still running.
    pub active_loads: usize,
    /// Whether the cleanup worker runs.
    pub worker_running: bool,
}

/// Builder for [`BlueprintCache`].
pub struct BlueprintCacheBuilder {
    policy: Arc<dyn DownloadPolicy>,
    fetcher: Option<Arc<dyn Fetcher>>,
    remote: Option<Arc<dyn Fetcher>>,
    decoder: Arc<dyn PayloadDecoder>,
    config: CacheConfig,
    timeout_policy: Option<TimeoutPolicy>,
    runtime: Option<Handle>,
}

impl Default for BlueprintCacheBuilder {
    fn default() -> Self {
        Self {
            policy: Arc::new(DenyAll),
            fetcher: None,
            remote: None,
            decoder: Arc::new(RawDecoder),
            config: CacheConfig::default(),
            timeout_policy: None,
            runtime: None,
        }
    }
}

impl BlueprintCacheBuilder {
    /// Set the download policy. Defaults to [`DenyAll`]: only `file://` URLs
    /// are loaded.
    pub fn policy(mut self, policy: impl DownloadPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Replace the fetcher used for every URL.
    ///
    /// By default `file://` URLs are read from disk and other URLs go to the
    /// [`remote`](BlueprintCacheBuilder::remote) fetcher, if any.
    pub fn fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Set the fetcher for non-`file://` URLs.
    pub fn remote(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.remote = Some(Arc::new(fetcher));
        self
    }

    /// Set the decoder applied to fetched and embedded bytes. Defaults to
    /// [`RawDecoder`].
    pub fn decoder(mut self, decoder: impl PayloadDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Set the cache settings.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the timeout policy derived from
    /// [`CacheConfig::load_timeout`].
    pub fn timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = Some(policy);
        self
    }

    /// Run loads and the cleanup worker on `runtime` instead of the runtime
    /// `build()` is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the cache.
    pub fn build(self) -> Result<BlueprintCache, CacheError> {
        self.config.validate()?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| CacheError::NoRuntime)?,
        };
        let fetcher: Arc<dyn Fetcher> = match (self.fetcher, self.remote) {
            (Some(fetcher), _) => fetcher,
            (None, Some(remote)) => Arc::new(SchemeFetcher::local_only().with_remote(remote)),
            (None, None) => Arc::new(SchemeFetcher::local_only()),
        };
        let timeout_policy = self
            .timeout_policy
            .unwrap_or_else(|| TimeoutPolicy::from(self.config.load_timeout));

        let loads = LoadManager::new(
            fetcher,
            Arc::clone(&self.decoder),
            timeout_policy,
            runtime.clone(),
        );

        Ok(BlueprintCache {
            inner: Arc::new(Inner {
                urls: Arc::new(UrlCache::new(self.policy, self.config.ttl)),
                embedded: Arc::new(EmbeddedCache::new(
                    self.decoder,
                    self.config.embedded_capacity,
                )),
                loads,
                worker: OnceLock::new(),
                config: self.config,
                runtime,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

impl fmt::Debug for BlueprintCacheBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlueprintCacheBuilder")
            .field("config", &self.config)
            .field("custom_fetcher", &self.fetcher.is_some())
            .field("remote", &self.remote.is_some())
            .field("timeout_policy", &self.timeout_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use blueprint_core::{AllowAll, BlueprintTag};

    use super::*;

    #[test]
    fn test_build_outside_runtime_fails() {
        let err = BlueprintCache::builder().build().unwrap_err();
        assert!(matches!(err, CacheError::NoRuntime));
    }

    #[test]
    fn test_build_with_explicit_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let cache = BlueprintCache::builder()
            .runtime(runtime.handle().clone())
            .build()
            .unwrap();
        assert!(!cache.worker_running());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = CacheConfig {
            ttl: Duration::from_secs(1),
            ..CacheConfig::default()
        };
        let err = BlueprintCache::builder().config(config).build().unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[tokio::test]
    async fn test_worker_starts_on_first_url_record() {
        let cache = BlueprintCache::builder().policy(AllowAll).build().unwrap();
        let holder = Arc::new(BlueprintTag::embedded((1, 1, 1), &b"abc"[..]));
        cache.resolve_source(&holder);
        assert!(!cache.worker_running(), "embedded data needs no worker");

        cache.resolve_url("https://example.com/a.bp");
        assert!(cache.worker_running());
    }

    #[tokio::test]
    async fn test_denied_url_does_not_start_worker() {
        let cache = BlueprintCache::builder().build().unwrap();
        assert!(cache.resolve_url("https://example.com/a.bp").is_none());
        assert!(!cache.worker_running());
        assert_eq!(cache.stats().url_records, 0);
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let cache = BlueprintCache::builder().policy(AllowAll).build().unwrap();
        let other = cache.clone();
        let a = cache.resolve_url("https://example.com/a.bp").unwrap();
        let b = other.resolve_url("https://example.com/a.bp").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_tag_without_source_is_not_written() {
        let cache = BlueprintCache::builder().build().unwrap();
        let holder = Arc::new(BlueprintTag {
            x_size: Some(1),
            y_size: Some(1),
            z_size: Some(1),
            ..BlueprintTag::default()
        });
        assert!(cache.resolve_source(&holder).is_none());
        assert!(!cache.is_written(&holder));

        let untagged: Arc<Option<BlueprintTag>> = Arc::new(None);
        assert!(!cache.is_written(&untagged));
    }
}
