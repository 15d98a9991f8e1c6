//! Layered blob storage: isolated writes over a shared, read-only backend.

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use super::{BlobReader, BlobStorage};
use crate::error::EngineResult;

/// A frontend that absorbs every write, stacked over a backend that is only
/// ever read.
///
/// Reads try the frontend first and fall through to the backend when the
/// frontend has no blob under the ID. Deletes only touch the frontend, so
/// deleting an ID that lives only in the backend fails with
/// [`EngineError::BlobNotFound`](crate::error::EngineError::BlobNotFound).
#[derive(Debug, Clone)]
pub struct LayeredBlobStorage {
    frontend: Arc<dyn BlobStorage>,
    backend: Arc<dyn BlobStorage>,
}

impl LayeredBlobStorage {
    /// Stack `frontend` over `backend`.
    #[must_use]
    pub fn new(frontend: Arc<dyn BlobStorage>, backend: Arc<dyn BlobStorage>) -> Self {
        Self { frontend, backend }
    }

    /// The store receiving writes.
    #[must_use]
    pub fn frontend(&self) -> &Arc<dyn BlobStorage> {
        &self.frontend
    }

    /// The store that is never mutated through this layer.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn BlobStorage> {
        &self.backend
    }
}

impl BlobStorage for LayeredBlobStorage {
    fn put(&self, id: Option<u64>, data: &[u8]) -> EngineResult<u64> {
        self.frontend.put(id, data)
    }

    fn put_stream(&self, id: Option<u64>, reader: &mut dyn Read) -> EngineResult<u64> {
        self.frontend.put_stream(id, reader)
    }

    fn get_bytes(&self, id: u64) -> EngineResult<Bytes> {
        match self.frontend.get_bytes(id) {
            Err(e) if e.is_not_found() => {
                trace!(id, "blob not in frontend, reading backend");
                self.backend.get_bytes(id)
            }
            other => other,
        }
    }

    fn get_reader(&self, id: u64) -> EngineResult<BlobReader> {
        match self.frontend.get_reader(id) {
            Err(e) if e.is_not_found() => self.backend.get_reader(id),
            other => other,
        }
    }

    fn delete(&self, id: u64) -> EngineResult<u64> {
        self.frontend.delete(id)
    }

    fn exists(&self, id: u64) -> bool {
        self.frontend.exists(id) || self.backend.exists(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::storage::InMemoryBlobStorage;
    use crate::storage::test_support::ids;

    fn layered() -> (Arc<InMemoryBlobStorage>, Arc<InMemoryBlobStorage>, LayeredBlobStorage) {
        let ids = ids();
        let frontend = Arc::new(InMemoryBlobStorage::new(Arc::clone(&ids)));
        let backend = Arc::new(InMemoryBlobStorage::new(ids));
        let store = LayeredBlobStorage::new(frontend.clone(), backend.clone());
        (frontend, backend, store)
    }

    #[test]
    fn test_should_write_to_frontend_only() {
        let (frontend, backend, store) = layered();
        let id = store
            .put(None, b"fresh")
            .unwrap_or_else(|e| panic!("put: {e}"));
        assert!(frontend.exists(id));
        assert!(!backend.exists(id));
    }

    #[test]
    fn test_should_read_through_to_backend() {
        let (frontend, backend, store) = layered();
        backend
            .put(Some(1), b"shared")
            .unwrap_or_else(|e| panic!("seed: {e}"));
        assert!(store.exists(1));
        assert_eq!(
            store.get_bytes(1).unwrap_or_else(|e| panic!("get: {e}")).as_ref(),
            b"shared"
        );

        frontend
            .put(Some(1), b"shadowed")
            .unwrap_or_else(|e| panic!("shadow: {e}"));
        assert_eq!(
            store.get_bytes(1).unwrap_or_else(|e| panic!("get: {e}")).as_ref(),
            b"shadowed"
        );
        let mut out = Vec::new();
        store
            .get_reader(1)
            .unwrap_or_else(|e| panic!("reader: {e}"))
            .read_to_end(&mut out)
            .unwrap_or_else(|e| panic!("read: {e}"));
        assert_eq!(out, b"shadowed");
    }

    #[test]
    fn test_should_never_delete_from_backend() {
        let (_frontend, backend, store) = layered();
        backend
            .put(Some(3), b"base")
            .unwrap_or_else(|e| panic!("seed: {e}"));
        assert!(matches!(
            store.delete(3),
            Err(EngineError::BlobNotFound { id: 3 })
        ));
        assert!(backend.exists(3));
    }

    #[test]
    fn test_should_keep_frontend_writes_when_backend_changes() {
        let (_frontend, backend, store) = layered();
        backend
            .put(Some(5), b"pre-existing")
            .unwrap_or_else(|e| panic!("seed: {e}"));
        store
            .put(Some(10), b"front")
            .unwrap_or_else(|e| panic!("put: {e}"));

        backend.delete(5).unwrap_or_else(|e| panic!("backend delete: {e}"));

        assert_eq!(
            store.get_bytes(10).unwrap_or_else(|e| panic!("get: {e}")).as_ref(),
            b"front"
        );
        assert!(!store.exists(5));
    }

    #[test]
    fn test_should_nest_layers() {
        let (_frontend, backend, inner) = layered();
        backend
            .put(Some(1), b"bottom")
            .unwrap_or_else(|e| panic!("seed: {e}"));
        let top = Arc::new(InMemoryBlobStorage::new(ids()));
        let outer = LayeredBlobStorage::new(top.clone(), Arc::new(inner));
        assert_eq!(
            outer.get_bytes(1).unwrap_or_else(|e| panic!("get: {e}")).as_ref(),
            b"bottom"
        );
        outer
            .put(Some(2), b"top")
            .unwrap_or_else(|e| panic!("put: {e}"));
        assert!(top.exists(2));
        assert!(!backend.exists(2));
    }
}
