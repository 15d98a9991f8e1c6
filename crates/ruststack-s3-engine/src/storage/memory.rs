//! In-memory blob storage with an optional size ceiling.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::BlobStorage;
use crate::error::{EngineError, EngineResult};
use crate::id::IdGenerator;

/// Blobs held in a concurrent map.
///
/// Stored values are [`Bytes`] copied from the caller's slice, so no caller
/// can mutate stored state through an aliased buffer; reads hand out cheap
/// immutable views of the same allocation.
///
/// With a capacity set, a write that would push the total stored size past
/// it fails with [`EngineError::CapacityExceeded`] and leaves the store
/// untouched. Overwriting an ID only counts the size difference.
pub struct InMemoryBlobStorage {
    ids: Arc<IdGenerator>,
    blobs: DashMap<u64, Bytes>,
    capacity: Option<u64>,
    /// Total stored bytes. Held across the map update to keep it exact.
    used: Mutex<u64>,
}

impl fmt::Debug for InMemoryBlobStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBlobStorage")
            .field("blobs", &self.blobs.len())
            .field("capacity", &self.capacity)
            .field("used", &*self.used.lock())
            .finish_non_exhaustive()
    }
}

impl InMemoryBlobStorage {
    /// Create an unbounded store.
    #[must_use]
    pub fn new(ids: Arc<IdGenerator>) -> Self {
        Self {
            ids,
            blobs: DashMap::new(),
            capacity: None,
            used: Mutex::new(0),
        }
    }

    /// Create a store that holds at most `capacity` bytes.
    #[must_use]
    pub fn with_capacity(ids: Arc<IdGenerator>, capacity: u64) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new(ids)
        }
    }

    /// The configured size ceiling, if any.
    #[must_use]
    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    /// Total bytes currently stored.
    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        *self.used.lock()
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether the store holds no blobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

fn byte_len(data: &[u8]) -> u64 {
    u64::try_from(data.len()).unwrap_or(u64::MAX)
}

impl BlobStorage for InMemoryBlobStorage {
    fn put(&self, id: Option<u64>, data: &[u8]) -> EngineResult<u64> {
        let id = match id {
            Some(id) => id,
            None => self.ids.next_id()?,
        };
        let size = byte_len(data);

        let mut used = self.used.lock();
        let replaced = self.blobs.get(&id).map_or(0, |b| byte_len(&b));
        let retained = used.saturating_sub(replaced);
        if let Some(capacity) = self.capacity {
            if retained.saturating_add(size) > capacity {
                debug!(id, size, capacity, used = *used, "rejecting blob over capacity");
                return Err(EngineError::CapacityExceeded {
                    requested: size,
                    available: capacity.saturating_sub(retained),
                    capacity,
                });
            }
        }

        self.blobs.insert(id, Bytes::copy_from_slice(data));
        *used = retained.saturating_add(size);
        trace!(id, size, "stored blob in memory");
        Ok(id)
    }

    fn get_bytes(&self, id: u64) -> EngineResult<Bytes> {
        self.blobs
            .get(&id)
            .map(|b| b.value().clone())
            .ok_or(EngineError::BlobNotFound { id })
    }

    fn delete(&self, id: u64) -> EngineResult<u64> {
        let mut used = self.used.lock();
        let (_, removed) = self
            .blobs
            .remove(&id)
            .ok_or(EngineError::BlobNotFound { id })?;
        *used = used.saturating_sub(byte_len(&removed));
        trace!(id, "deleted blob from memory");
        Ok(id)
    }

    fn exists(&self, id: u64) -> bool {
        self.blobs.contains_key(&id)
    }
}
