//! Periodic eviction of expired URL records.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::UrlCache;

#[cfg(feature = "metrics")]
use crate::metrics::{SWEEP_EVICTED, SWEEP_FAULTS};

/// Something the cleanup worker sweeps.
pub trait Sweep: Send + Sync + 'static {
    /// Remove expired entries and return how many were removed.
    fn sweep_expired(&self) -> usize;
}

impl Sweep for UrlCache {
    fn sweep_expired(&self) -> usize {
        UrlCache::sweep_expired(self)
    }
}

impl<T> Sweep for Arc<T>
where
    T: Sweep + ?Sized,
{
    fn sweep_expired(&self) -> usize {
        self.as_ref().sweep_expired()
    }
}

/// Background task that sweeps its target, waits `interval`, and repeats.
///
/// The first sweep runs as soon as the task starts. A panic inside a sweep is
/// caught and logged; the loop keeps going. The loop never ends on its own:
/// only [`WorkerHandle::stop`] ends it, and dropping the handle leaves the
/// task running.
#[derive(Debug)]
pub struct CleanupWorker<S> {
    target: Arc<S>,
    interval: Duration,
}

impl<S: Sweep> CleanupWorker<S> {
    /// Create a worker sweeping `target` every `interval`.
    pub fn new(target: Arc<S>, interval: Duration) -> Self {
        Self { target, interval }
    }

    /// Spawn the loop on `runtime`.
    pub fn start(self, runtime: &Handle) -> WorkerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(self.run(shutdown_rx));
        WorkerHandle { shutdown, handle }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis(),
            "blueprint cleanup worker started"
        );
        loop {
            self.sweep_once();

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                stop = Self::stop_requested(&mut shutdown_rx) => {
                    if stop {
                        break;
                    }
                }
            }
        }
        info!("blueprint cleanup worker stopped");
    }

    /// Resolves to `true` once a stop is requested. Pends forever if the
    /// handle was dropped without stopping.
    async fn stop_requested(shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        let stopped = shutdown_rx.wait_for(|stop| *stop).await.is_ok();
        if !stopped {
            std::future::pending::<()>().await;
        }
        stopped
    }

    fn sweep_once(&self) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.target.sweep_expired())) {
            Ok(evicted) => {
                if evicted > 0 {
                    debug!(evicted, "swept expired blueprint records");
                }
                #[cfg(feature = "metrics")]
                metrics::counter!(*SWEEP_EVICTED).increment(evicted as u64);
            }
            Err(payload) => {
                error!(panic = panic_message(&*payload), "error pruning blueprint data");
                #[cfg(feature = "metrics")]
                metrics::counter!(*SWEEP_FAULTS).increment(1);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Handle to a running [`CleanupWorker`].
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// `true` until the loop has exited.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Ask the loop to exit. It finishes any sweep in progress first.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Ask the loop to exit and wait until it has.
    pub async fn shutdown(self) {
        self.stop();
        // The task never panics: sweeps run under `catch_unwind`.
        let _ = self.handle.await;
    }
}
