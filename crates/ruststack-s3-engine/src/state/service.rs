//! Process-wide service metadata.
//!
//! [`ServiceMetadata`] owns every bucket by name. The map itself is a
//! `DashMap`, so single lookups and inserts are atomic; "create iff absent"
//! uses the entry API.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;

use super::bucket::{BucketMetadata, BucketSnapshot};
use crate::error::{EngineError, EngineResult};

/// All buckets known to one engine.
pub struct ServiceMetadata {
    buckets: DashMap<String, Arc<BucketMetadata>>,
}

impl fmt::Debug for ServiceMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceMetadata")
            .field("bucket_count", &self.buckets.len())
            .finish_non_exhaustive()
    }
}

impl Default for ServiceMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetadata {
    /// Create an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Rebuild service metadata from persisted snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BucketAlreadyExists`] if two snapshots share a
    /// name.
    pub fn from_snapshots(
        snapshots: impl IntoIterator<Item = BucketSnapshot>,
    ) -> EngineResult<Self> {
        let service = Self::new();
        for snapshot in snapshots {
            service.add_bucket(BucketMetadata::from_snapshot(snapshot))?;
        }
        info!(bucket_count = service.len(), "rehydrated service metadata");
        Ok(service)
    }

    /// Register a bucket.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BucketAlreadyExists`] if the name is taken.
    pub fn add_bucket(&self, bucket: BucketMetadata) -> EngineResult<Arc<BucketMetadata>> {
        match self.buckets.entry(bucket.name().to_owned()) {
            Entry::Occupied(entry) => Err(EngineError::BucketAlreadyExists {
                bucket: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                let bucket = Arc::new(bucket);
                entry.insert(Arc::clone(&bucket));
                info!(bucket = %bucket.name(), "bucket registered");
                Ok(bucket)
            }
        }
    }

    /// Look up a bucket.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoSuchBucket`] if the bucket does not exist.
    pub fn get_bucket(&self, name: &str) -> EngineResult<Arc<BucketMetadata>> {
        self.find_bucket(name)
            .ok_or_else(|| EngineError::NoSuchBucket {
                bucket: name.to_owned(),
            })
    }

    /// Look up a bucket, `None` if absent.
    #[must_use]
    pub fn find_bucket(&self, name: &str) -> Option<Arc<BucketMetadata>> {
        self.buckets.get(name).map(|b| Arc::clone(b.value()))
    }

    /// Whether a bucket exists.
    #[must_use]
    pub fn has_bucket(&self, name: &str) -> bool {
        self.buckets.contains_key(name)
    }

    /// Unregister a bucket and return it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoSuchBucket`] if the bucket does not exist.
    pub fn remove_bucket(&self, name: &str) -> EngineResult<Arc<BucketMetadata>> {
        let (_, bucket) = self
            .buckets
            .remove(name)
            .ok_or_else(|| EngineError::NoSuchBucket {
                bucket: name.to_owned(),
            })?;
        info!(bucket = %name, "bucket unregistered");
        Ok(bucket)
    }

    /// All buckets, sorted by name.
    #[must_use]
    pub fn list_buckets(&self) -> Vec<Arc<BucketMetadata>> {
        let mut buckets: Vec<_> = self
            .buckets
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        buckets.sort_by(|a, b| a.name().cmp(b.name()));
        buckets
    }

    /// Number of buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether there are no buckets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
