//! LoadManager implementation for background URL loads.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use blueprint_core::{Fetcher, Payload, PayloadDecoder, PayloadRecord};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use smol_str::SmolStr;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info_span, warn};

use super::policy::TimeoutPolicy;
use crate::error::LoadError;

#[cfg(feature = "metrics")]
use crate::metrics::{LOAD_DURATION, LOADS_ACTIVE, LOADS_FINISHED};

/// A load in flight for one URL, tagged with its record's sequence.
struct InFlight {
    sequence: u64,
    handle: JoinHandle<()>,
    record: Arc<PayloadRecord>,
}

impl InFlight {
    /// Aborts the task and fails its record if it has not settled yet.
    fn cancel(&self, reason: &'static str) {
        self.handle.abort();
        if self.record.fail(LoadError::Cancelled(reason).to_string()) {
            debug!(url = ?self.record.source(), reason, "blueprint load cancelled");
        }
    }
}

struct LoadManagerInner {
    fetcher: Arc<dyn Fetcher>,
    decoder: Arc<dyn PayloadDecoder>,
    timeout_policy: TimeoutPolicy,
    runtime: Handle,
    loads: DashMap<SmolStr, InFlight>,
}

/// Runs URL loads on a tokio runtime, one task per record.
///
/// Each task marks its record `Waiting`, fetches the raw bytes, decodes them
/// and settles the record `Ready` or `Error`. Failures are logged and stored
/// on the record, never returned.
///
/// Loads are keyed by URL. When a load for the URL is already running, the
/// record created later wins: a newer record supersedes the running load,
/// whose task is aborted and whose record is failed, while an older record is
/// failed without being loaded. Every record handed to [`spawn`] therefore
/// settles.
///
/// [`spawn`]: LoadManager::spawn
#[derive(Clone)]
pub struct LoadManager {
    inner: Arc<LoadManagerInner>,
}

impl LoadManager {
    /// Create a manager spawning its loads on `runtime`.
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        decoder: Arc<dyn PayloadDecoder>,
        timeout_policy: TimeoutPolicy,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(LoadManagerInner {
                fetcher,
                decoder,
                timeout_policy,
                runtime,
                loads: DashMap::new(),
            }),
        }
    }

    /// Timeout policy applied to every load.
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        self.inner.timeout_policy
    }

    /// Start loading `record` in the background.
    ///
    /// Returns `false` without spawning if the record has no URL, has already
    /// settled, is already loading, or is older than the record being loaded
    /// for the same URL. In the last case the record is failed.
    pub fn spawn(&self, record: Arc<PayloadRecord>) -> bool {
        let Some(url) = record.source().map(SmolStr::new) else {
            return false;
        };
        if record.is_settled() {
            return false;
        }

        let sequence = record.sequence();
        // The entry lock is held while spawning so the task's own removal can
        // never run before its registration.
        match self.inner.loads.entry(url.clone()) {
            Entry::Occupied(mut occupied) => {
                let running = occupied.get();
                if sequence == running.sequence {
                    return false;
                }
                if sequence < running.sequence && !running.handle.is_finished() {
                    if record.fail(LoadError::Cancelled("superseded by a newer load").to_string())
                    {
                        debug!(url = %url, "older blueprint load not started");
                    }
                    return false;
                }
                running.cancel("superseded by a newer load");
                let handle = self.spawn_inner(url, sequence, Arc::clone(&record));
                occupied.insert(InFlight {
                    sequence,
                    handle,
                    record,
                });
            }
            Entry::Vacant(vacant) => {
                let handle = self.spawn_inner(url, sequence, Arc::clone(&record));
                vacant.insert(InFlight {
                    sequence,
                    handle,
                    record,
                });
            }
        }
        true
    }

    fn spawn_inner(
        &self,
        url: SmolStr,
        sequence: u64,
        record: Arc<PayloadRecord>,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let span = info_span!("blueprint.load", url = %url, sequence);
        #[cfg(feature = "metrics")]
        let active = ActiveLoad::start();

        self.inner.runtime.spawn(
            async move {
                #[cfg(feature = "metrics")]
                let _active = active;
                record.begin_loading();
                let start = Instant::now();

                let outcome = match inner.timeout_policy {
                    TimeoutPolicy::None => inner.load(&url).await,
                    TimeoutPolicy::Cancel(duration) => {
                        match tokio::time::timeout(duration, inner.load(&url)).await {
                            Ok(outcome) => outcome,
                            Err(_) => Err(LoadError::TimedOut(duration)),
                        }
                    }
                    TimeoutPolicy::Warn(duration) => {
                        let outcome = inner.load(&url).await;
                        let elapsed = start.elapsed();
                        if elapsed > duration {
                            warn!(
                                elapsed_ms = elapsed.as_millis(),
                                threshold_ms = duration.as_millis(),
                                "blueprint load exceeded timeout threshold"
                            );
                        }
                        outcome
                    }
                };
                inner.settle(&record, outcome, start.elapsed());
                inner
                    .loads
                    .remove_if(&url, |_, load| load.sequence == sequence);
            }
            .instrument(span),
        )
    }

    /// Number of loads still running.
    pub fn active_count(&self) -> usize {
        self.inner
            .loads
            .iter()
            .filter(|load| !load.handle.is_finished())
            .count()
    }

    /// `true` if a load for `url` is running.
    pub fn is_in_flight(&self, url: &str) -> bool {
        self.inner
            .loads
            .get(url)
            .is_some_and(|load| !load.handle.is_finished())
    }

    /// Drop bookkeeping of finished loads.
    pub fn cleanup_finished(&self) {
        self.inner
            .loads
            .retain(|_, load| !load.handle.is_finished());
    }

    /// Cancel the load for `url`, failing its record.
    pub fn cancel(&self, url: &str) -> bool {
        match self.inner.loads.remove(url) {
            Some((_, load)) => {
                load.cancel("cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every load, failing their records.
    pub fn cancel_all(&self) {
        self.inner.loads.retain(|_, load| {
            load.cancel("cache shut down");
            false
        });
    }

    /// Wait until every load in flight at the time of the call has settled
    /// its record.
    pub async fn wait_all(&self) {
        let records: Vec<_> = self
            .inner
            .loads
            .iter()
            .map(|load| Arc::clone(&load.record))
            .collect();
        for record in records {
            record.wait_settled().await;
        }
        self.cleanup_finished();
    }

    /// Wait for all loads with a timeout.
    ///
    /// Returns `true` if all loads settled within the timeout.
    pub async fn wait_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_all()).await.is_ok()
    }
}

impl LoadManagerInner {
    async fn load(&self, url: &str) -> Result<Payload, LoadError> {
        let raw = self.fetcher.fetch(url).await?;
        Ok(self.decoder.decode(raw)?)
    }

    fn settle(
        &self,
        record: &PayloadRecord,
        outcome: Result<Payload, LoadError>,
        elapsed: Duration,
    ) {
        match outcome {
            Ok(payload) => {
                let size = payload.len();
                if record.complete(payload) {
                    debug!(size, elapsed_ms = elapsed.as_millis(), "loaded blueprint data");
                }
                #[cfg(feature = "metrics")]
                metrics::counter!(*LOADS_FINISHED, "source" => "url", "outcome" => "ready")
                    .increment(1);
            }
            Err(error) => {
                if record.fail(error.to_string()) {
                    warn!(%error, "failed to load blueprint data");
                }
                #[cfg(feature = "metrics")]
                {
                    let outcome = match error {
                        LoadError::TimedOut(_) => "timeout",
                        _ => "error",
                    };
                    metrics::counter!(*LOADS_FINISHED, "source" => "url", "outcome" => outcome)
                        .increment(1);
                }
            }
        }
        #[cfg(feature = "metrics")]
        metrics::histogram!(*LOAD_DURATION).record(elapsed.as_secs_f64());
    }
}

impl fmt::Debug for LoadManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadManager")
            .field("timeout_policy", &self.inner.timeout_policy)
            .field("loads", &self.inner.loads.len())
            .finish_non_exhaustive()
    }
}

/// Keeps the active-loads gauge in step with the task, aborted or not.
#[cfg(feature = "metrics")]
struct ActiveLoad;

#[cfg(feature = "metrics")]
impl ActiveLoad {
    fn start() -> Self {
        metrics::gauge!(*LOADS_ACTIVE).increment(1.0);
        Self
    }
}

#[cfg(feature = "metrics")]
impl Drop for ActiveLoad {
    fn drop(&mut self) {
        metrics::gauge!(*LOADS_ACTIVE).decrement(1.0);
    }
}
