//! Engine assembly.
//!
//! [`S3Engine`] owns every shared component and wires them together from an
//! [`EngineConfig`]: the identifier generator, the blob storage stack, the
//! lock registry, the optional metadata store and the rehydrated
//! [`ServiceMetadata`]. Callers drive it through [`S3Engine::service`].

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{BlobBackend, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::id::IdGenerator;
use crate::interceptor::MutationInterceptor;
use crate::locks::BucketLockRegistry;
use crate::persistence::{FsMetadataStore, MetadataStore};
use crate::service::{BucketInfo, InterceptedBucketService, MetadataService};
use crate::state::ServiceMetadata;
use crate::storage::{
    BlobStorage, CopyOnAccessBlobStorage, FilesystemBlobStorage, InMemoryBlobStorage,
    LayeredBlobStorage,
};

/// A fully assembled storage engine.
///
/// # Examples
///
/// ```
/// use ruststack_s3_engine::{EngineConfig, S3Engine};
/// use ruststack_s3_engine::service::BucketService;
///
/// let engine = S3Engine::open(EngineConfig::default()).unwrap();
/// engine.service().create_bucket("photos").unwrap();
/// assert_eq!(engine.bucket_summaries().len(), 1);
/// ```
#[derive(Debug)]
pub struct S3Engine {
    config: Arc<EngineConfig>,
    ids: Arc<IdGenerator>,
    blobs: Arc<dyn BlobStorage>,
    metadata: Arc<ServiceMetadata>,
    store: Option<Arc<dyn MetadataStore>>,
    service: InterceptedBucketService<MetadataService>,
}

impl S3Engine {
    /// Build an engine from `config`, rehydrating persisted metadata when
    /// persistence is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] for an unusable configuration
    /// (identifier fields out of range, unset or missing base directory), or the
    /// store's error if persisted metadata cannot be read.
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        let ids = Arc::new(IdGenerator::new(config.datacenter_id, config.worker_id)?);
        let blobs = build_blob_storage(&config, &ids)?;

        let store: Option<Arc<dyn MetadataStore>> = if config.persistence {
            if config.blob_backend == BlobBackend::Memory {
                warn!(
                    "metadata is persisted but blobs are in memory; \
                     object bodies will not survive a restart"
                );
            }
            Some(Arc::new(FsMetadataStore::new(config.metadata_dir())))
        } else {
            None
        };

        let metadata = match &store {
            Some(store) => Arc::new(ServiceMetadata::from_snapshots(store.fetch_all()?)?),
            None => Arc::new(ServiceMetadata::new()),
        };

        let interceptor = MutationInterceptor::new(
            Arc::new(BucketLockRegistry::new()),
            Arc::clone(&metadata),
            store.clone(),
        );
        let service = InterceptedBucketService::new(
            MetadataService::new(Arc::clone(&metadata), Arc::clone(&blobs), Arc::clone(&ids)),
            interceptor,
        );

        info!(
            backend = config.blob_backend.as_str(),
            persistence = config.persistence,
            data_dir = %config.data_dir.display(),
            buckets = metadata.len(),
            "s3 engine ready"
        );

        Ok(Self {
            config: Arc::new(config),
            ids,
            blobs,
            metadata,
            store,
            service,
        })
    }

    /// The locked, persisting operation surface.
    #[must_use]
    pub fn service(&self) -> &InterceptedBucketService<MetadataService> {
        &self.service
    }

    /// The configuration the engine was built from.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared identifier generator.
    #[must_use]
    pub fn ids(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    /// The assembled blob storage stack.
    #[must_use]
    pub fn blobs(&self) -> &Arc<dyn BlobStorage> {
        &self.blobs
    }

    /// The in-memory metadata tree.
    #[must_use]
    pub fn metadata(&self) -> &Arc<ServiceMetadata> {
        &self.metadata
    }

    /// The metadata store, when persistence is enabled.
    #[must_use]
    pub fn store(&self) -> Option<&Arc<dyn MetadataStore>> {
        self.store.as_ref()
    }

    /// Summaries of every bucket, sorted by name.
    #[must_use]
    pub fn bucket_summaries(&self) -> Vec<BucketInfo> {
        self.metadata
            .list_buckets()
            .iter()
            .map(|bucket| BucketInfo::of(bucket))
            .collect()
    }
}

fn base_dir(config: &EngineConfig) -> EngineResult<PathBuf> {
    config.blob_base_dir.clone().ok_or_else(|| {
        EngineError::invalid_argument(format!(
            "blob backend {} needs S3_BLOB_BASE_DIR",
            config.blob_backend
        ))
    })
}

fn memory_storage(config: &EngineConfig, ids: &Arc<IdGenerator>) -> InMemoryBlobStorage {
    match config.max_memory_storage {
        Some(capacity) => InMemoryBlobStorage::with_capacity(Arc::clone(ids), capacity),
        None => InMemoryBlobStorage::new(Arc::clone(ids)),
    }
}

fn build_blob_storage(
    config: &EngineConfig,
    ids: &Arc<IdGenerator>,
) -> EngineResult<Arc<dyn BlobStorage>> {
    let storage: Arc<dyn BlobStorage> = match config.blob_backend {
        BlobBackend::Memory => Arc::new(memory_storage(config, ids)),
        BlobBackend::Filesystem => Arc::new(FilesystemBlobStorage::open(
            config.blob_dir(),
            Arc::clone(ids),
        )?),
        BlobBackend::Layered => {
            let base =
                FilesystemBlobStorage::open_existing(base_dir(config)?, Arc::clone(ids))?;
            let frontend = FilesystemBlobStorage::open(config.blob_dir(), Arc::clone(ids))?;
            Arc::new(LayeredBlobStorage::new(Arc::new(frontend), Arc::new(base)))
        }
        BlobBackend::CopyOnAccess => {
            let base =
                FilesystemBlobStorage::open_existing(base_dir(config)?, Arc::clone(ids))?;
            Arc::new(CopyOnAccessBlobStorage::new(
                Arc::new(base),
                memory_storage(config, ids),
            ))
        }
    };
    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::BucketService;
    use crate::state::VersioningState;

    fn persistent_config(data_dir: &std::path::Path, backend: BlobBackend) -> EngineConfig {
        EngineConfig::builder()
            .persistence(true)
            .data_dir(data_dir.to_path_buf())
            .blob_backend(backend)
            .build()
    }

    #[test]
    fn test_should_open_in_memory_engine() {
        let engine =
            S3Engine::open(EngineConfig::default()).unwrap_or_else(|e| panic!("open: {e}"));
        assert!(engine.store().is_none());
        assert!(engine.metadata().is_empty());
        assert!(!engine.service().interceptor().is_persistent());
    }

    #[test]
    fn test_should_reject_out_of_range_worker_id() {
        let config = EngineConfig::builder().worker_id(32).build();
        assert!(matches!(
            S3Engine::open(config),
            Err(EngineError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_should_require_base_dir_for_layered_backends() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        for backend in [BlobBackend::Layered, BlobBackend::CopyOnAccess] {
            let config = EngineConfig::builder()
                .data_dir(dir.path().to_path_buf())
                .blob_backend(backend)
                .build();
            assert!(matches!(
                S3Engine::open(config),
                Err(EngineError::InvalidArgument { .. })
            ));
        }
    }

    #[test]
    fn test_should_reject_missing_base_dir_without_creating_it() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let base = dir.path().join("shared-base");
        for backend in [BlobBackend::Layered, BlobBackend::CopyOnAccess] {
            let config = EngineConfig::builder()
                .data_dir(dir.path().join("session"))
                .blob_backend(backend)
                .blob_base_dir(base.clone())
                .build();
            assert!(matches!(
                S3Engine::open(config),
                Err(EngineError::InvalidArgument { .. })
            ));
            assert!(!base.exists());
        }
    }

    #[test]
    fn test_should_rehydrate_persisted_buckets_and_objects() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let config = persistent_config(dir.path(), BlobBackend::Filesystem);

        let before = {
            let engine = S3Engine::open(config.clone()).unwrap_or_else(|e| panic!("open: {e}"));
            let service = engine.service();
            service
                .create_bucket("bucket-one")
                .unwrap_or_else(|e| panic!("create: {e}"));
            service
                .set_versioning("bucket-one", VersioningState::Enabled)
                .unwrap_or_else(|e| panic!("versioning: {e}"));
            service
                .put_object("bucket-one", "k1", "text/plain", b"v1")
                .unwrap_or_else(|e| panic!("put: {e}"));
            engine
                .metadata()
                .get_bucket("bucket-one")
                .unwrap_or_else(|e| panic!("get: {e}"))
                .snapshot()
        };

        let engine = S3Engine::open(config).unwrap_or_else(|e| panic!("reopen: {e}"));
        let after = engine
            .metadata()
            .get_bucket("bucket-one")
            .unwrap_or_else(|e| panic!("get: {e}"))
            .snapshot();
        assert_eq!(after, before);

        let object = engine
            .service()
            .get_object("bucket-one", "k1", None)
            .unwrap_or_else(|e| panic!("get_object: {e}"));
        assert_eq!(object.body.as_ref(), b"v1");
    }

    #[test]
    fn test_should_layer_session_writes_over_shared_base() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        std::fs::create_dir(dir.path().join("base")).unwrap_or_else(|e| panic!("mkdir: {e}"));
        let config = EngineConfig::builder()
            .data_dir(dir.path().join("session"))
            .blob_backend(BlobBackend::Layered)
            .blob_base_dir(dir.path().join("base"))
            .build();
        let engine = S3Engine::open(config).unwrap_or_else(|e| panic!("open: {e}"));
        engine
            .service()
            .create_bucket("bucket-one")
            .unwrap_or_else(|e| panic!("create: {e}"));
        engine
            .service()
            .put_object("bucket-one", "k", "text/plain", b"session")
            .unwrap_or_else(|e| panic!("put: {e}"));

        let base_entries = std::fs::read_dir(dir.path().join("base"))
            .unwrap_or_else(|e| panic!("read_dir: {e}"))
            .count();
        assert_eq!(base_entries, 0);
    }

    #[test]
    fn test_should_summarize_buckets_in_name_order() {
        let engine =
            S3Engine::open(EngineConfig::default()).unwrap_or_else(|e| panic!("open: {e}"));
        for name in ["zeta", "alpha"] {
            engine
                .service()
                .create_bucket(name)
                .unwrap_or_else(|e| panic!("create {name}: {e}"));
        }
        let names: Vec<_> = engine
            .bucket_summaries()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, ["alpha", "zeta"]);
    }
}
