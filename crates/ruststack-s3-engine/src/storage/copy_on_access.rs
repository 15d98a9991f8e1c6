//! Copy-on-access blob storage: a private, lazily filled view of a shared base.

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashSet;
use tracing::trace;

use super::{BlobReader, BlobStorage, InMemoryBlobStorage};
use crate::error::{EngineError, EngineResult};

/// Serves blobs from a private in-memory store, copying each one out of the
/// base store the first time it is read.
///
/// The base store is never written. Once an ID has been read here, later
/// changes to the base do not affect it. Deleting an ID that exists only in
/// the base records a tombstone in this view; deleting an ID that exists in
/// neither fails with [`EngineError::BlobNotFound`].
#[derive(Debug)]
pub struct CopyOnAccessBlobStorage {
    base: Arc<dyn BlobStorage>,
    private: InMemoryBlobStorage,
    deleted: DashSet<u64>,
}

impl CopyOnAccessBlobStorage {
    /// Wrap `base`, materializing copies into `private`.
    #[must_use]
    pub fn new(base: Arc<dyn BlobStorage>, private: InMemoryBlobStorage) -> Self {
        Self {
            base,
            private,
            deleted: DashSet::new(),
        }
    }

    /// Whether `id` has already been copied into the private store.
    #[must_use]
    pub fn is_materialized(&self, id: u64) -> bool {
        self.private.exists(id)
    }

    fn hidden(&self, id: u64) -> bool {
        self.deleted.contains(&id)
    }

    /// Copy `id` from the base into the private store.
    fn materialize(&self, id: u64) -> EngineResult<()> {
        let mut reader = self.base.get_reader(id)?;
        self.private.put_stream(Some(id), &mut reader)?;
        trace!(id, "materialized blob from base");
        Ok(())
    }

    fn ensure_local(&self, id: u64) -> EngineResult<()> {
        if self.private.exists(id) {
            return Ok(());
        }
        if self.hidden(id) {
            return Err(EngineError::BlobNotFound { id });
        }
        self.materialize(id)
    }
}

impl BlobStorage for CopyOnAccessBlobStorage {
    fn put(&self, id: Option<u64>, data: &[u8]) -> EngineResult<u64> {
        let id = self.private.put(id, data)?;
        self.deleted.remove(&id);
        Ok(id)
    }

    fn put_stream(&self, id: Option<u64>, reader: &mut dyn Read) -> EngineResult<u64> {
        let id = self.private.put_stream(id, reader)?;
        self.deleted.remove(&id);
        Ok(id)
    }

    fn get_bytes(&self, id: u64) -> EngineResult<Bytes> {
        self.ensure_local(id)?;
        self.private.get_bytes(id)
    }

    fn get_reader(&self, id: u64) -> EngineResult<BlobReader> {
        self.ensure_local(id)?;
        self.private.get_reader(id)
    }

    fn delete(&self, id: u64) -> EngineResult<u64> {
        if self.private.exists(id) {
            self.private.delete(id)?;
            if self.base.exists(id) {
                self.deleted.insert(id);
            }
            return Ok(id);
        }
        if self.hidden(id) || !self.base.exists(id) {
            return Err(EngineError::BlobNotFound { id });
        }
        self.deleted.insert(id);
        trace!(id, "hid base blob");
        Ok(id)
    }

    fn exists(&self, id: u64) -> bool {
        self.private.exists(id) || (!self.hidden(id) && self.base.exists(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::ids;

    fn view() -> (Arc<InMemoryBlobStorage>, CopyOnAccessBlobStorage) {
        let ids = ids();
        let base = Arc::new(InMemoryBlobStorage::new(Arc::clone(&ids)));
        let store = CopyOnAccessBlobStorage::new(base.clone(), InMemoryBlobStorage::new(ids));
        (base, store)
    }

    #[test]
    fn test_should_materialize_on_first_read() {
        let (base, store) = view();
        base.put(Some(1), b"shared")
            .unwrap_or_else(|e| panic!("seed: {e}"));
        assert!(!store.is_materialized(1));
        assert!(store.exists(1));

        let data = store.get_bytes(1).unwrap_or_else(|e| panic!("get: {e}"));
        assert_eq!(data.as_ref(), b"shared");
        assert!(store.is_materialized(1));
    }

    #[test]
    fn test_should_survive_base_deletion_after_read() {
        let (base, store) = view();
        base.put(Some(1), b"shared")
            .unwrap_or_else(|e| panic!("seed: {e}"));
        let mut out = Vec::new();
        store
            .get_reader(1)
            .unwrap_or_else(|e| panic!("reader: {e}"))
            .read_to_end(&mut out)
            .unwrap_or_else(|e| panic!("read: {e}"));

        base.delete(1).unwrap_or_else(|e| panic!("base delete: {e}"));

        assert_eq!(
            store.get_bytes(1).unwrap_or_else(|e| panic!("get: {e}")).as_ref(),
            b"shared"
        );
    }

    #[test]
    fn test_should_never_write_to_base() {
        let (base, store) = view();
        base.put(Some(1), b"original")
            .unwrap_or_else(|e| panic!("seed: {e}"));
        store
            .put(Some(1), b"private")
            .unwrap_or_else(|e| panic!("put: {e}"));
        store
            .put(Some(2), b"new")
            .unwrap_or_else(|e| panic!("put: {e}"));

        assert_eq!(
            base.get_bytes(1).unwrap_or_else(|e| panic!("get: {e}")).as_ref(),
            b"original"
        );
        assert!(!base.exists(2));
        assert_eq!(
            store.get_bytes(1).unwrap_or_else(|e| panic!("get: {e}")).as_ref(),
            b"private"
        );
    }

    #[test]
    fn test_should_hide_base_blob_on_delete() {
        let (base, store) = view();
        base.put(Some(1), b"shared")
            .unwrap_or_else(|e| panic!("seed: {e}"));

        assert_eq!(store.delete(1).unwrap_or_else(|e| panic!("delete: {e}")), 1);
        assert!(!store.exists(1));
        assert!(base.exists(1));
        assert!(matches!(
            store.get_bytes(1),
            Err(EngineError::BlobNotFound { id: 1 })
        ));
        assert!(matches!(
            store.delete(1),
            Err(EngineError::BlobNotFound { id: 1 })
        ));

        store
            .put(Some(1), b"again")
            .unwrap_or_else(|e| panic!("put: {e}"));
        assert!(store.exists(1));
    }

    #[test]
    fn test_should_delete_materialized_copy() {
        let (base, store) = view();
        base.put(Some(1), b"shared")
            .unwrap_or_else(|e| panic!("seed: {e}"));
        store.get_bytes(1).unwrap_or_else(|e| panic!("get: {e}"));

        store.delete(1).unwrap_or_else(|e| panic!("delete: {e}"));
        assert!(!store.exists(1));
        assert!(base.exists(1));
    }

    #[test]
    fn test_should_reject_delete_of_unknown_id() {
        let (_base, store) = view();
        assert!(matches!(
            store.delete(99),
            Err(EngineError::BlobNotFound { id: 99 })
        ));
        assert!(matches!(
            store.get_bytes(99),
            Err(EngineError::BlobNotFound { id: 99 })
        ));
    }
}
