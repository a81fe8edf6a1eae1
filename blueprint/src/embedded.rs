//! Records for payloads embedded in their owner's tag.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use blueprint_core::{PayloadDecoder, PayloadRecord};
use bytes::Bytes;
use moka::ops::compute::{CompResult, Op};
use moka::sync::Cache;
use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use crate::metrics::{CACHE_HIT_COUNTER, CACHE_MISS_COUNTER, LOADS_FINISHED};

/// Identity of an owner: the address of its `Arc` allocation.
type OwnerKey = usize;

fn owner_key<O>(owner: &Arc<O>) -> OwnerKey {
    Arc::as_ptr(owner) as *const () as usize
}

#[derive(Clone)]
struct OwnedRecord {
    owner: Weak<dyn Any + Send + Sync>,
    record: Arc<PayloadRecord>,
}

impl OwnedRecord {
    /// The owner was dropped; its address may already belong to a new object.
    fn is_orphaned(&self) -> bool {
        self.owner.strong_count() == 0
    }
}

/// Records for embedded payloads, keyed by the identity of the owning object.
///
/// Identical bytes held by two different owners give two independent
/// records: the key is object identity, not content.
///
/// An entry lives as long as its owner. Owners are tracked through `Weak`
/// handles, so once an owner is dropped its entry is dead: it is replaced by
/// the next resolution that lands on the same address, removed by
/// [`purge_orphans`], or removed right away by [`release`]. The map is also
/// bounded by capacity; an evicted live owner simply decodes again on its next
/// resolution. There is no TTL and no background sweep.
///
/// Decoding is synchronous and runs under the per-key insertion lock, so
/// concurrent resolutions for one owner decode once.
///
/// [`purge_orphans`]: EmbeddedCache::purge_orphans
/// [`release`]: EmbeddedCache::release
pub struct EmbeddedCache {
    entries: Cache<OwnerKey, OwnedRecord>,
    decoder: Arc<dyn PayloadDecoder>,
}

impl EmbeddedCache {
    /// Creates a cache holding at most `capacity` records.
    pub fn new(decoder: Arc<dyn PayloadDecoder>, capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(capacity).build(),
            decoder,
        }
    }

    /// Returns the record owned by `owner`, decoding `raw` into a new record
    /// if there is none.
    ///
    /// On a hit `raw` is ignored: changing an owner's bytes does not reload
    /// its record. Release the owner first to force a reload.
    pub fn resolve<O>(&self, owner: &Arc<O>, raw: Bytes) -> Arc<PayloadRecord>
    where
        O: Send + Sync + 'static,
    {
        let weak = Arc::downgrade(owner);
        let weak: Weak<dyn Any + Send + Sync> = weak;
        let entry = self
            .entries
            .entry(owner_key(owner))
            .or_insert_with_if(|| self.load(weak, raw), OwnedRecord::is_orphaned);

        #[cfg(feature = "metrics")]
        if entry.is_fresh() {
            metrics::counter!(*CACHE_MISS_COUNTER).increment(1);
        } else {
            metrics::counter!(*CACHE_HIT_COUNTER).increment(1);
        }

        entry.into_value().record
    }

    fn load(&self, owner: Weak<dyn Any + Send + Sync>, raw: Bytes) -> OwnedRecord {
        let record = Arc::new(PayloadRecord::embedded());
        let size = raw.len();
        match self.decoder.decode(raw) {
            Ok(payload) => {
                debug!(size, "loaded embedded blueprint data");
                record.complete(payload);
                #[cfg(feature = "metrics")]
                metrics::counter!(*LOADS_FINISHED, "source" => "embedded", "outcome" => "ready")
                    .increment(1);
            }
            Err(error) => {
                warn!(size, %error, "failed to load embedded blueprint data");
                record.fail(error.to_string());
                #[cfg(feature = "metrics")]
                metrics::counter!(*LOADS_FINISHED, "source" => "embedded", "outcome" => "error")
                    .increment(1);
            }
        }
        OwnedRecord { owner, record }
    }

    /// Returns the record owned by `owner` without creating one.
    pub fn get<O>(&self, owner: &Arc<O>) -> Option<Arc<PayloadRecord>>
    where
        O: Send + Sync + 'static,
    {
        self.entries
            .get(&owner_key(owner))
            .filter(|entry| !entry.is_orphaned())
            .map(|entry| entry.record)
    }

    /// Drops the record owned by `owner`. Call when the owner is torn down or
    /// its embedded bytes change.
    pub fn release<O>(&self, owner: &Arc<O>) -> Option<Arc<PayloadRecord>>
    where
        O: Send + Sync + 'static,
    {
        self.entries
            .remove(&owner_key(owner))
            .map(|entry| entry.record)
    }

    /// Removes entries whose owner was dropped and returns how many.
    ///
    /// Each entry is re-checked under its key's lock before removal, so an
    /// entry a live owner installed in the meantime is kept.
    pub fn purge_orphans(&self) -> usize {
        let candidates: Vec<OwnerKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_orphaned())
            .map(|(key, _)| *key)
            .collect();
        candidates
            .into_iter()
            .filter(|key| self.remove_if_orphaned(*key))
            .count()
    }

    fn remove_if_orphaned(&self, key: OwnerKey) -> bool {
        let result = self.entries.entry(key).and_compute_with(|entry| match entry {
            Some(entry) if entry.value().is_orphaned() => Op::Remove,
            _ => Op::Nop,
        });
        matches!(result, CompResult::Removed(_))
    }

    /// Number of records, orphaned ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    /// `true` if no record is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EmbeddedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedCache")
            .field("entries", &self.entries.entry_count())
            .field("capacity", &self.entries.policy().max_capacity())
            .finish_non_exhaustive()
    }
}
