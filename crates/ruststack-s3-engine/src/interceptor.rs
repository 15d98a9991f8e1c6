//! Locking and persistence around bucket-scoped calls.
//!
//! Every call into a [`BucketService`](crate::service::BucketService) goes
//! through [`MutationInterceptor::intercept`] with the [`CallSpec`] declared
//! for that operation:
//!
//! 1. take the bucket's read or write lock, if the [`CallSpec`] asks for one;
//! 2. run the operation, returning its error unchanged if it fails;
//! 3. on success, if the call declares a mutation and a store is configured,
//!    store the bucket's current snapshot (`Create` / `Update`) or delete its
//!    record (`Delete`);
//! 4. release the lock, whatever happened in steps 2 and 3.
//!
//! Persistence runs after the in-memory change and is not transactional with
//! it: if step 3 fails the error reaches the caller, and memory and disk
//! disagree until the next successful write of that bucket.

use std::fmt;
use std::sync::Arc;

use tracing::{error, trace, warn};

use crate::error::EngineResult;
use crate::locks::BucketLockRegistry;
use crate::persistence::MetadataStore;
use crate::state::ServiceMetadata;

/// Which bucket lock a call holds while it runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockMode {
    /// No lock.
    #[default]
    None,
    /// The shared lock.
    Read,
    /// The exclusive lock.
    Write,
}

/// How a successful call changes the durable state of its bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MutationKind {
    /// The bucket was created; store its first record.
    Create,
    /// The bucket changed; overwrite its record.
    #[default]
    Update,
    /// The bucket was removed; delete its record.
    Delete,
}

/// Call metadata declared by each intercepted operation.
///
/// ```
/// use ruststack_s3_engine::interceptor::{CallSpec, LockMode, MutationKind};
///
/// let spec = CallSpec::write().persists();
/// assert_eq!(spec.lock, LockMode::Write);
/// assert_eq!(spec.mutation, Some(MutationKind::Update));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallSpec {
    /// Lock held for the duration of the call.
    pub lock: LockMode,
    /// Durable effect of a successful call, `None` for pure reads.
    pub mutation: Option<MutationKind>,
}

impl CallSpec {
    /// No lock, no persistence.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            lock: LockMode::None,
            mutation: None,
        }
    }

    /// Hold the read lock.
    #[must_use]
    pub const fn read() -> Self {
        Self {
            lock: LockMode::Read,
            mutation: None,
        }
    }

    /// Hold the write lock.
    #[must_use]
    pub const fn write() -> Self {
        Self {
            lock: LockMode::Write,
            mutation: None,
        }
    }

    /// Persist as an [`MutationKind::Update`].
    #[must_use]
    pub const fn persists(self) -> Self {
        self.persists_as(MutationKind::Update)
    }

    /// Persist with the given mutation kind.
    #[must_use]
    pub const fn persists_as(self, kind: MutationKind) -> Self {
        Self {
            lock: self.lock,
            mutation: Some(kind),
        }
    }
}

/// Applies [`CallSpec`]s: bucket locking plus write-through persistence.
pub struct MutationInterceptor {
    locks: Arc<BucketLockRegistry>,
    metadata: Arc<ServiceMetadata>,
    store: Option<Arc<dyn MetadataStore>>,
}

impl fmt::Debug for MutationInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationInterceptor")
            .field("locks", &self.locks)
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl MutationInterceptor {
    /// Create an interceptor. Without a store, persistence is skipped.
    #[must_use]
    pub fn new(
        locks: Arc<BucketLockRegistry>,
        metadata: Arc<ServiceMetadata>,
        store: Option<Arc<dyn MetadataStore>>,
    ) -> Self {
        Self {
            locks,
            metadata,
            store,
        }
    }

    /// The lock registry in use.
    #[must_use]
    pub fn locks(&self) -> &Arc<BucketLockRegistry> {
        &self.locks
    }

    /// Whether successful mutations are written to a store.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// Run `op` against `bucket` under `spec`.
    ///
    /// # Errors
    ///
    /// Returns the error of `op` unchanged, or the store's error if
    /// persisting a successful mutation fails.
    pub fn intercept<T>(
        &self,
        bucket: &str,
        spec: CallSpec,
        op: impl FnOnce() -> EngineResult<T>,
    ) -> EngineResult<T> {
        let _read_guard = (spec.lock == LockMode::Read).then(|| self.locks.read(bucket));
        let _write_guard = (spec.lock == LockMode::Write).then(|| self.locks.write(bucket));
        trace!(bucket, lock = ?spec.lock, mutation = ?spec.mutation, "intercepted call");

        let value = op()?;

        if let (Some(kind), Some(store)) = (spec.mutation, &self.store) {
            self.persist(bucket, kind, store.as_ref()).inspect_err(|e| {
                error!(bucket, ?kind, error = %e, "persisting bucket metadata failed after in-memory change");
            })?;
        }
        Ok(value)
    }

    fn persist(
        &self,
        bucket: &str,
        kind: MutationKind,
        store: &dyn MetadataStore,
    ) -> EngineResult<()> {
        if kind == MutationKind::Delete {
            return store.delete(bucket);
        }
        match self.metadata.find_bucket(bucket) {
            Some(current) => store.store(bucket, &current.snapshot()),
            None => {
                warn!(bucket, ?kind, "bucket no longer exists, nothing to persist");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::error::EngineError;
    use crate::persistence::FsMetadataStore;
    use crate::state::BucketMetadata;

    fn in_memory() -> (Arc<ServiceMetadata>, MutationInterceptor) {
        let metadata = Arc::new(ServiceMetadata::new());
        let interceptor = MutationInterceptor::new(
            Arc::new(BucketLockRegistry::new()),
            Arc::clone(&metadata),
            None,
        );
        (metadata, interceptor)
    }

    fn persistent(
        dir: &tempfile::TempDir,
    ) -> (Arc<ServiceMetadata>, Arc<FsMetadataStore>, MutationInterceptor) {
        let metadata = Arc::new(ServiceMetadata::new());
        let store = Arc::new(FsMetadataStore::new(dir.path().join("metadata")));
        let interceptor = MutationInterceptor::new(
            Arc::new(BucketLockRegistry::new()),
            Arc::clone(&metadata),
            Some(store.clone() as Arc<dyn MetadataStore>),
        );
        (metadata, store, interceptor)
    }

    fn counter(bucket: &BucketMetadata) -> u64 {
        bucket
            .tagging()
            .and_then(|sets| sets.first().and_then(|tags| tags.get("count").cloned()))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    fn set_counter(bucket: &BucketMetadata, value: u64) {
        let tags = std::collections::BTreeMap::from([("count".to_owned(), value.to_string())]);
        bucket.set_tagging(Some(vec![tags]));
    }

    #[test]
    fn test_should_serialize_write_locked_increments() {
        const THREADS: u64 = 8;
        const ROUNDS: u64 = 50;

        let (metadata, interceptor) = in_memory();
        let bucket = metadata
            .add_bucket(BucketMetadata::new("b1"))
            .unwrap_or_else(|e| panic!("add: {e}"));
        let interceptor = Arc::new(interceptor);

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let interceptor = Arc::clone(&interceptor);
                let bucket = Arc::clone(&bucket);
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        interceptor
                            .intercept("b1", CallSpec::write().persists(), || {
                                let current = counter(&bucket);
                                thread::yield_now();
                                set_counter(&bucket, current + 1);
                                Ok(())
                            })
                            .unwrap_or_else(|e| panic!("intercept: {e}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap_or_else(|_| panic!("worker panicked"));
        }

        assert_eq!(counter(&bucket), THREADS * ROUNDS);
    }

    #[test]
    fn test_should_persist_create_and_update() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let (metadata, store, interceptor) = persistent(&dir);

        interceptor
            .intercept("b1", CallSpec::write().persists_as(MutationKind::Create), || {
                metadata.add_bucket(BucketMetadata::new("b1")).map(|_| ())
            })
            .unwrap_or_else(|e| panic!("create: {e}"));
        assert!(store.fetch("b1").is_ok());

        interceptor
            .intercept("b1", CallSpec::write().persists(), || {
                metadata.get_bucket("b1")?.set_policy(Some("{}".to_owned()));
                Ok(())
            })
            .unwrap_or_else(|e| panic!("update: {e}"));
        let record = store.fetch("b1").unwrap_or_else(|e| panic!("fetch: {e}"));
        assert_eq!(record.policy.as_deref(), Some("{}"));
    }

    #[test]
    fn test_should_delete_record_on_delete() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let (metadata, store, interceptor) = persistent(&dir);
        let bucket = metadata
            .add_bucket(BucketMetadata::new("b1"))
            .unwrap_or_else(|e| panic!("add: {e}"));
        store
            .store("b1", &bucket.snapshot())
            .unwrap_or_else(|e| panic!("store: {e}"));

        interceptor
            .intercept("b1", CallSpec::write().persists_as(MutationKind::Delete), || {
                metadata.remove_bucket("b1").map(|_| ())
            })
            .unwrap_or_else(|e| panic!("delete: {e}"));
        assert!(matches!(
            store.fetch("b1"),
            Err(EngineError::NoSuchBucket { .. })
        ));
    }

    #[test]
    fn test_should_not_persist_reads_or_failures() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let (metadata, store, interceptor) = persistent(&dir);
        metadata
            .add_bucket(BucketMetadata::new("b1"))
            .unwrap_or_else(|e| panic!("add: {e}"));

        interceptor
            .intercept("b1", CallSpec::read(), || Ok(()))
            .unwrap_or_else(|e| panic!("read: {e}"));
        let err = interceptor.intercept("b1", CallSpec::write().persists(), || -> EngineResult<()> {
            Err(EngineError::NoSuchKey {
                key: "k".to_owned(),
            })
        });
        assert!(matches!(err, Err(EngineError::NoSuchKey { key }) if key == "k"));
        assert!(matches!(
            store.fetch("b1"),
            Err(EngineError::NoSuchBucket { .. })
        ));
        assert!(!interceptor.locks().is_locked("b1"));
    }

    #[test]
    fn test_should_surface_persistence_failure_after_mutation() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let blocker = dir.path().join("metadata");
        std::fs::write(&blocker, "not a directory").unwrap_or_else(|e| panic!("write: {e}"));
        let (metadata, _store, interceptor) = persistent(&dir);
        let bucket = metadata
            .add_bucket(BucketMetadata::new("b1"))
            .unwrap_or_else(|e| panic!("add: {e}"));

        let result = interceptor.intercept("b1", CallSpec::write().persists(), || {
            bucket.set_policy(Some("{}".to_owned()));
            Ok(())
        });
        assert!(matches!(result, Err(EngineError::Persistence { .. })));
        assert_eq!(bucket.policy().as_deref(), Some("{}"));
    }

    #[test]
    fn test_should_release_lock_when_operation_panics() {
        let (_metadata, interceptor) = in_memory();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            interceptor.intercept("b1", CallSpec::write(), || -> EngineResult<()> {
                panic!("operation blew up")
            })
        }));
        assert!(outcome.is_err());
        assert!(!interceptor.locks().is_locked("b1"));
    }

    #[test]
    fn test_should_reenter_bucket_lock_from_nested_call() {
        let (metadata, interceptor) = in_memory();
        let bucket = metadata
            .add_bucket(BucketMetadata::new("b1"))
            .unwrap_or_else(|e| panic!("add: {e}"));
        let interceptor = Arc::new(interceptor);
        let (tx, rx) = std::sync::mpsc::channel();

        {
            let interceptor = Arc::clone(&interceptor);
            thread::spawn(move || {
                let result = interceptor.intercept("b1", CallSpec::write(), || {
                    let seen =
                        interceptor.intercept("b1", CallSpec::read(), || Ok(counter(&bucket)))?;
                    interceptor.intercept("b1", CallSpec::write(), || {
                        set_counter(&bucket, seen + 1);
                        Ok(())
                    })
                });
                tx.send(result).unwrap_or_else(|e| panic!("send: {e}"));
            });
        }

        let result = rx
            .recv_timeout(Duration::from_secs(2))
            .unwrap_or_else(|e| panic!("nested call did not finish: {e}"));
        result.unwrap_or_else(|e| panic!("intercept: {e}"));
        let bucket = metadata
            .get_bucket("b1")
            .unwrap_or_else(|e| panic!("get: {e}"));
        assert_eq!(counter(&bucket), 1);
        assert!(!interceptor.locks().is_locked("b1"));
    }

    #[test]
    fn test_should_skip_store_for_vanished_bucket() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let (_metadata, store, interceptor) = persistent(&dir);
        interceptor
            .intercept("ghost", CallSpec::write().persists(), || Ok(()))
            .unwrap_or_else(|e| panic!("intercept: {e}"));
        assert!(store.fetch_all().unwrap_or_else(|e| panic!("fetch_all: {e}")).is_empty());
    }
}
