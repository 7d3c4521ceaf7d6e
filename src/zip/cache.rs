//! Decompressed-entry cache with at-most-once extraction per entry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use log::*;
use tokio::sync::OnceCell;

use crate::error::{ZipError, ZipResult};

type Slot = Arc<OnceCell<ZipResult<Arc<[u8]>>>>;

/// Maps directory positions to extraction results.
///
/// Concurrent readers of one entry share a single extraction and all see its
/// outcome, bytes or error. The map lock is only held to fetch a slot, so
/// different entries never wait on each other.
#[derive(Default)]
pub struct EntryCache {
    slots: Mutex<HashMap<usize, Slot>>,
}

impl EntryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached result for `key`, running `extract` if nobody has yet.
    ///
    /// Transport errors are handed to everyone waiting and then forgotten, so
    /// a later call extracts again.
    pub async fn get_or_extract<F, Fut>(&self, key: usize, extract: F) -> ZipResult<Arc<[u8]>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ZipResult<Vec<u8>>>,
    {
        let slot = self.slot(key);
        if slot.initialized() {
            trace!("Cache hit for entry #{}", key);
        }
        let result = slot
            .get_or_init(|| async move { extract().await.map(Arc::from) })
            .await
            .clone();

        if let Err(ZipError::Io(_)) = &result {
            self.evict(key, &slot);
        }
        result
    }

    /// Number of entries with a stored result
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: usize) -> Slot {
        self.lock().entry(key).or_default().clone()
    }

    fn evict(&self, key: usize, slot: &Slot) {
        let mut slots = self.lock();
        // Only drop the slot we failed on; a retry may already have replaced it.
        if slots.get(&key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            debug!("Dropping failed extraction of entry #{} from the cache", key);
            slots.remove(&key);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<usize, Slot>> {
        // Nothing panics while holding the lock, but don't turn a poisoned
        // map into a second panic.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
