//! Per-source load record with expiry bookkeeping.
//!
//! A [`PayloadRecord`] is shared (behind an `Arc`) by every consumer that
//! resolved the same source. Its [`LoadState`] is published through a
//! [`tokio::sync::watch`] channel, which gives two things at once:
//!
//! - transitions are checked and applied under the channel's lock, so the
//!   forward-only rule of [`LoadState::can_advance_to`] holds under races
//! - readers on any thread observe the final state (and the payload stored
//!   before it) without extra synchronisation, and can `await` it
//!
//! ## Expiry
//!
//! URL records carry a TTL measured from the last time a cache hit touched
//! them. Embedded records carry none and never expire; their lifetime follows
//! the owning object instead.
//!
//! ```
//! use blueprint_core::{LoadState, PayloadRecord};
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let record = PayloadRecord::for_url("file:///tmp/house.bp", Duration::from_secs(30));
//! assert_eq!(record.state(), LoadState::Pending);
//!
//! assert!(record.begin_loading());
//! assert!(record.complete(Bytes::from_static(b"payload")));
//! assert!(!record.fail("too late"));
//!
//! assert_eq!(record.state(), LoadState::Ready);
//! assert_eq!(record.payload().as_deref(), Some(&b"payload"[..]));
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

use smol_str::SmolStr;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::{LoadState, Payload};

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Load state, payload and expiry bookkeeping for one payload source.
pub struct PayloadRecord {
    source: Option<SmolStr>,
    state: watch::Sender<LoadState>,
    payload: OnceLock<Payload>,
    error: OnceLock<SmolStr>,
    sequence: u64,
    created_at: Instant,
    last_touched: Mutex<Instant>,
    ttl: Option<Duration>,
}

impl PayloadRecord {
    /// Creates a `Pending` record for a URL source that expires after `ttl`
    /// without a touch.
    pub fn for_url(url: impl Into<SmolStr>, ttl: Duration) -> Self {
        Self::new(Some(url.into()), Some(ttl))
    }

    /// Creates a `Pending` record for embedded data. It never expires.
    pub fn embedded() -> Self {
        Self::new(None, None)
    }

    fn new(source: Option<SmolStr>, ttl: Option<Duration>) -> Self {
        let (state, _) = watch::channel(LoadState::Pending);
        let now = Instant::now();
        Self {
            source,
            state,
            payload: OnceLock::new(),
            error: OnceLock::new(),
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            created_at: now,
            last_touched: Mutex::new(now),
            ttl,
        }
    }

    /// The URL this record loads, `None` for embedded data.
    #[inline]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Current load state.
    #[inline]
    pub fn state(&self) -> LoadState {
        *self.state.borrow()
    }

    /// `true` for `Ready` or `Waiting`.
    #[inline]
    pub fn is_usable(&self) -> bool {
        self.state().is_usable()
    }

    /// `true` for `Ready` or `Error`.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.state().is_terminal()
    }

    /// Loaded payload, present only once the record is `Ready`.
    pub fn payload(&self) -> Option<Payload> {
        self.payload.get().cloned()
    }

    /// Failure reason, present only once the record is in `Error`.
    pub fn error(&self) -> Option<&str> {
        self.error.get().map(SmolStr::as_str)
    }

    /// Creation order across all records in the process: a record created
    /// later always has a larger sequence.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// When the record was created.
    #[inline]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When a cache hit last touched the record.
    pub fn last_touched_at(&self) -> Instant {
        *self
            .last_touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Time to live after the last touch; `None` means the record never expires.
    #[inline]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Resets the expiry clock.
    pub fn touch(&self) {
        *self
            .last_touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Time elapsed since the last touch.
    pub fn idle(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_touched_at())
    }

    /// `true` once the record has been idle for longer than its TTL.
    pub fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.idle() > ttl)
    }

    /// `Pending -> Waiting`. Returns whether the transition happened.
    pub fn begin_loading(&self) -> bool {
        self.state.send_if_modified(|state| {
            if !state.can_advance_to(LoadState::Waiting) {
                return false;
            }
            *state = LoadState::Waiting;
            true
        })
    }

    /// `Pending | Waiting -> Ready` with `payload`. Returns whether the
    /// transition happened; the payload is dropped otherwise.
    pub fn complete(&self, payload: Payload) -> bool {
        self.state.send_if_modified(|state| {
            if !state.can_advance_to(LoadState::Ready) {
                return false;
            }
            // Written under the channel lock, before readers can observe `Ready`.
            let _ = self.payload.set(payload);
            *state = LoadState::Ready;
            true
        })
    }

    /// `Pending | Waiting -> Error`. Returns whether the transition happened.
    pub fn fail(&self, reason: impl Into<SmolStr>) -> bool {
        let reason = reason.into();
        self.state.send_if_modified(|state| {
            if !state.can_advance_to(LoadState::Error) {
                return false;
            }
            let _ = self.error.set(reason);
            *state = LoadState::Error;
            true
        })
    }

    /// Waits until the record is `Ready` or `Error` and returns that state.
    pub async fn wait_settled(&self) -> LoadState {
        let mut state = self.state.subscribe();
        match state.wait_for(|state| state.is_terminal()).await {
            Ok(settled) => *settled,
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => self.state(),
        }
    }
}

impl fmt::Debug for PayloadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadRecord")
            .field("source", &self.source)
            .field("state", &self.state())
            .field("payload_len", &self.payload.get().map(Payload::len))
            .field("error", &self.error.get())
            .field("ttl", &self.ttl)
            .finish()
    }
}
