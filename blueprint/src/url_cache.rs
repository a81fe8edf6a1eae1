//! Registry of URL records, shared by every consumer of the same URL.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use blueprint_core::{DownloadPolicy, DownloadPolicyExt, PayloadRecord};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use smol_str::SmolStr;
use tracing::debug;

#[cfg(feature = "metrics")]
use crate::metrics::{CACHE_DENIED_COUNTER, CACHE_HIT_COUNTER, CACHE_MISS_COUNTER};

/// Outcome of [`UrlCache::resolve`].
#[derive(Debug, Clone)]
pub enum Lookup {
    /// A live record already existed; its expiry clock was reset.
    Cached(Arc<PayloadRecord>),
    /// A fresh `Pending` record was registered; it still has to be loaded.
    Created(Arc<PayloadRecord>),
    /// The download policy refused the URL. Nothing was registered.
    Denied,
}

impl Lookup {
    /// The resolved record, if any.
    pub fn record(&self) -> Option<&Arc<PayloadRecord>> {
        match self {
            Lookup::Cached(record) | Lookup::Created(record) => Some(record),
            Lookup::Denied => None,
        }
    }

    /// Consumes the lookup and returns the record, if any.
    pub fn into_record(self) -> Option<Arc<PayloadRecord>> {
        match self {
            Lookup::Cached(record) | Lookup::Created(record) => Some(record),
            Lookup::Denied => None,
        }
    }

    /// `true` if this lookup registered a new record.
    pub fn is_created(&self) -> bool {
        matches!(self, Lookup::Created(_))
    }
}

/// URL → record map with single-flight registration.
///
/// Each URL maps to at most one live record. The check/materialize/register
/// sequence runs under the map's per-key entry lock, and [`sweep_expired`]
/// removes entries under the same locks, so a concurrent sweep never sees a
/// half-registered record and two callers never register two records for one
/// URL. Loading is not done here: the caller starts the load for a
/// [`Lookup::Created`] record after the lock is released.
///
/// Denied URLs are never cached; the policy is consulted again on every
/// resolution of an absent URL.
///
/// [`sweep_expired`]: UrlCache::sweep_expired
pub struct UrlCache {
    entries: DashMap<SmolStr, Arc<PayloadRecord>>,
    policy: Arc<dyn DownloadPolicy>,
    ttl: Duration,
}

impl UrlCache {
    /// Creates an empty cache whose records expire after `ttl` without a hit.
    pub fn new(policy: Arc<dyn DownloadPolicy>, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
            ttl,
        }
    }

    /// Idle TTL given to new records.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the live record for `url`, or registers a new `Pending` one if
    /// the policy allows the URL.
    ///
    /// An expired record that the sweep has not collected yet is treated as
    /// absent and replaced.
    pub fn resolve(&self, url: &str) -> Lookup {
        match self.entries.entry(SmolStr::new(url)) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired() {
                    let record = occupied.get();
                    record.touch();
                    debug!(url, state = %record.state(), "blueprint url cache hit");
                    #[cfg(feature = "metrics")]
                    metrics::counter!(*CACHE_HIT_COUNTER).increment(1);
                    return Lookup::Cached(Arc::clone(record));
                }

                if !self.policy.allowed(url) {
                    occupied.remove();
                    return self.denied(url);
                }
                let record = self.materialize(url);
                occupied.insert(Arc::clone(&record));
                Lookup::Created(record)
            }
            Entry::Vacant(vacant) => {
                if !self.policy.allowed(url) {
                    return self.denied(url);
                }
                let record = self.materialize(url);
                vacant.insert(Arc::clone(&record));
                Lookup::Created(record)
            }
        }
    }

    fn materialize(&self, url: &str) -> Arc<PayloadRecord> {
        debug!(url, "blueprint url cache miss, registering record");
        #[cfg(feature = "metrics")]
        metrics::counter!(*CACHE_MISS_COUNTER).increment(1);
        Arc::new(PayloadRecord::for_url(url, self.ttl))
    }

    fn denied(&self, url: &str) -> Lookup {
        debug!(url, "blueprint download denied by policy");
        #[cfg(feature = "metrics")]
        metrics::counter!(*CACHE_DENIED_COUNTER).increment(1);
        Lookup::Denied
    }

    /// Returns the record registered for `url` without touching it.
    pub fn get(&self, url: &str) -> Option<Arc<PayloadRecord>> {
        self.entries.get(url).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes the record for `url`. The next resolution fetches again.
    pub fn remove(&self, url: &str) -> Option<Arc<PayloadRecord>> {
        self.entries.remove(url).map(|(_, record)| record)
    }

    /// Removes every expired record and returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut evicted = 0;
        self.entries.retain(|url, record| {
            if record.is_expired() {
                debug!(url = %url, state = %record.state(), "evicting expired blueprint record");
                evicted += 1;
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Removes every record.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of registered records, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no record is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for UrlCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use blueprint_core::{AllowAll, DenyAll, LoadState, policy_fn};

    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    fn cache(policy: impl DownloadPolicy + 'static) -> UrlCache {
        UrlCache::new(Arc::new(policy), TTL)
    }

    #[test]
    fn test_first_resolution_creates_pending_record() {
        let cache = cache(AllowAll);
        let lookup = cache.resolve("https://example.com/a.bp");
        assert!(lookup.is_created());
        let record = lookup.into_record().unwrap();
        assert_eq!(record.state(), LoadState::Pending);
        assert_eq!(record.source(), Some("https://example.com/a.bp"));
        assert_eq!(record.ttl(), Some(TTL));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_second_resolution_returns_same_record() {
        let cache = cache(AllowAll);
        let first = cache.resolve("https://example.com/a.bp").into_record().unwrap();
        first.begin_loading();

        let second = cache.resolve("https://example.com/a.bp");
        assert!(matches!(second, Lookup::Cached(_)));
        let second = second.into_record().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.state(), LoadState::Waiting, "hit must not reset state");
    }

    #[test]
    fn test_denied_url_is_not_registered() {
        let cache = cache(DenyAll);
        assert!(matches!(cache.resolve("http://blocked.example/x"), Lookup::Denied));
        assert!(cache.is_empty());
        assert!(cache.get("http://blocked.example/x").is_none());
    }

    #[test]
    fn test_local_urls_ignore_policy() {
        let cache = cache(DenyAll);
        assert!(cache.resolve("file:///tmp/a.bp").is_created());
    }

    #[test]
    fn test_policy_change_takes_effect_immediately() {
        let open = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&open);
        let cache = cache(policy_fn(move |_| flag.load(Ordering::SeqCst)));

        assert!(matches!(cache.resolve("http://later.example/x"), Lookup::Denied));
        open.store(true, Ordering::SeqCst);
        assert!(cache.resolve("http://later.example/x").is_created());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_resets_expiry() {
        let cache = cache(AllowAll);
        let record = cache.resolve("https://example.com/a.bp").into_record().unwrap();

        tokio::time::advance(Duration::from_secs(25)).await;
        cache.resolve("https://example.com/a.bp");
        tokio::time::advance(Duration::from_secs(25)).await;

        assert!(!record.is_expired());
        assert_eq!(cache.sweep_expired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = cache(AllowAll);
        cache.resolve("https://example.com/old.bp");
        tokio::time::advance(Duration::from_secs(20)).await;
        cache.resolve("https://example.com/new.bp");
        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(cache.sweep_expired(), 1);
        assert!(cache.get("https://example.com/old.bp").is_none());
        assert!(cache.get("https://example.com/new.bp").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_unswept_record_is_replaced() {
        let cache = cache(AllowAll);
        let old = cache.resolve("https://example.com/a.bp").into_record().unwrap();
        old.complete(bytes::Bytes::from_static(b"v1"));

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        let lookup = cache.resolve("https://example.com/a.bp");
        assert!(lookup.is_created());
        let fresh = lookup.into_record().unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(fresh.state(), LoadState::Pending);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_record_dropped_when_policy_now_denies() {
        let open = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&open);
        let cache = cache(policy_fn(move |_| flag.load(Ordering::SeqCst)));
        cache.resolve("https://example.com/a.bp");

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        open.store(false, Ordering::SeqCst);
        assert!(matches!(cache.resolve("https://example.com/a.bp"), Lookup::Denied));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove_forces_refetch() {
        let cache = cache(AllowAll);
        let first = cache.resolve("https://example.com/a.bp").into_record().unwrap();
        assert!(cache.remove("https://example.com/a.bp").is_some());
        let second = cache.resolve("https://example.com/a.bp").into_record().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
