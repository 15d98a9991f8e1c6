//! Bucket metadata.
//!
//! A [`BucketMetadata`] owns the objects and in-progress uploads of one
//! bucket plus its configuration (versioning, tagging, ACL, policy,
//! replication). Each field sits behind its own `parking_lot::RwLock`, so
//! single reads and writes are atomic without the bucket lock; multi-step
//! changes rely on the bucket lock held by the mutation interceptor.
//!
//! [`BucketSnapshot`] is the serializable form written by the metadata store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::multipart::{UploadMetadata, UploadPartMetadata};
use super::object::{ObjectMetadata, VersionedObjectMetadata};
use crate::error::{EngineError, EngineResult};

// ---------------------------------------------------------------------------
// Supporting configuration types
// ---------------------------------------------------------------------------

/// Bucket versioning state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersioningState {
    /// Versioning has never been enabled on this bucket.
    #[default]
    Unset,
    /// Versioning is currently enabled.
    Enabled,
    /// Versioning was enabled and is now suspended.
    Suspended,
}

impl VersioningState {
    /// Whether new writes receive their own version IDs.
    #[must_use]
    pub fn is_enabled(self) -> bool {
        self == Self::Enabled
    }
}

/// Canned ACLs a bucket can carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CannedAcl {
    /// Owner gets `FULL_CONTROL`; no one else has access.
    #[default]
    Private,
    /// `AllUsers` additionally get `READ`.
    PublicRead,
    /// `AllUsers` additionally get `READ` and `WRITE`.
    PublicReadWrite,
    /// `AuthenticatedUsers` additionally get `READ`.
    AuthenticatedRead,
    /// The `LogDelivery` group gets `WRITE` and `READ_ACP`.
    LogDeliveryWrite,
}

impl CannedAcl {
    /// The header spelling of this ACL.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
            Self::PublicReadWrite => "public-read-write",
            Self::AuthenticatedRead => "authenticated-read",
            Self::LogDeliveryWrite => "log-delivery-write",
        }
    }
}

impl fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CannedAcl {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public-read" => Ok(Self::PublicRead),
            "public-read-write" => Ok(Self::PublicReadWrite),
            "authenticated-read" => Ok(Self::AuthenticatedRead),
            "log-delivery-write" => Ok(Self::LogDeliveryWrite),
            _ => Err(EngineError::invalid_argument(format!("unknown canned ACL: {s}"))),
        }
    }
}

/// Ordered tag sets attached to a bucket.
pub type TagSets = Vec<BTreeMap<String, String>>;

// ---------------------------------------------------------------------------
// BucketSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time, serializable copy of a bucket's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSnapshot {
    /// Bucket name.
    pub name: String,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Versioning state.
    #[serde(default)]
    pub versioning: VersioningState,
    /// Objects keyed by object key.
    #[serde(default)]
    pub objects: BTreeMap<String, ObjectMetadata>,
    /// Uploads keyed by object key, then upload ID.
    #[serde(default)]
    pub uploads: BTreeMap<String, BTreeMap<String, UploadMetadata>>,
    /// Tag sets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagging: Option<TagSets>,
    /// Canned ACL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<CannedAcl>,
    /// Bucket policy document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    /// Replication configuration document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// BucketMetadata
// ---------------------------------------------------------------------------

/// Live metadata of one bucket.
pub struct BucketMetadata {
    name: String,
    created: DateTime<Utc>,
    versioning: RwLock<VersioningState>,
    objects: RwLock<BTreeMap<String, ObjectMetadata>>,
    uploads: RwLock<BTreeMap<String, BTreeMap<String, UploadMetadata>>>,
    tagging: RwLock<Option<TagSets>>,
    acl: RwLock<Option<CannedAcl>>,
    policy: RwLock<Option<String>>,
    replication: RwLock<Option<serde_json::Value>>,
}

impl fmt::Debug for BucketMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketMetadata")
            .field("name", &self.name)
            .field("created", &self.created)
            .field("versioning", &*self.versioning.read())
            .field("object_count", &self.objects.read().len())
            .finish_non_exhaustive()
    }
}

impl BucketMetadata {
    /// Create an empty bucket created now.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_snapshot(BucketSnapshot {
            name: name.into(),
            created: Utc::now(),
            versioning: VersioningState::Unset,
            objects: BTreeMap::new(),
            uploads: BTreeMap::new(),
            tagging: None,
            acl: None,
            policy: None,
            replication: None,
        })
    }

    /// Rebuild live metadata from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: BucketSnapshot) -> Self {
        Self {
            name: snapshot.name,
            created: snapshot.created,
            versioning: RwLock::new(snapshot.versioning),
            objects: RwLock::new(snapshot.objects),
            uploads: RwLock::new(snapshot.uploads),
            tagging: RwLock::new(snapshot.tagging),
            acl: RwLock::new(snapshot.acl),
            policy: RwLock::new(snapshot.policy),
            replication: RwLock::new(snapshot.replication),
        }
    }

    /// Copy the current state into a serializable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> BucketSnapshot {
        BucketSnapshot {
            name: self.name.clone(),
            created: self.created,
            versioning: *self.versioning.read(),
            objects: self.objects.read().clone(),
            uploads: self.uploads.read().clone(),
            tagging: self.tagging.read().clone(),
            acl: *self.acl.read(),
            policy: self.policy.read().clone(),
            replication: self.replication.read().clone(),
        }
    }

    /// Bucket name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creation timestamp.
    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Whether the bucket holds no objects and no uploads.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty() && self.uploads.read().is_empty()
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Current versioning state.
    #[must_use]
    pub fn versioning(&self) -> VersioningState {
        *self.versioning.read()
    }

    /// Change the versioning state.
    pub fn set_versioning(&self, state: VersioningState) {
        *self.versioning.write() = state;
        debug!(bucket = %self.name, ?state, "versioning changed");
    }

    /// Current tag sets.
    #[must_use]
    pub fn tagging(&self) -> Option<TagSets> {
        self.tagging.read().clone()
    }

    /// Replace (or clear) the tag sets.
    pub fn set_tagging(&self, tagging: Option<TagSets>) {
        *self.tagging.write() = tagging;
    }

    /// Current canned ACL.
    #[must_use]
    pub fn acl(&self) -> Option<CannedAcl> {
        *self.acl.read()
    }

    /// Replace (or clear) the canned ACL.
    pub fn set_acl(&self, acl: Option<CannedAcl>) {
        *self.acl.write() = acl;
    }

    /// Current policy document.
    #[must_use]
    pub fn policy(&self) -> Option<String> {
        self.policy.read().clone()
    }

    /// Replace (or clear) the policy document.
    pub fn set_policy(&self, policy: Option<String>) {
        *self.policy.write() = policy;
    }

    /// Current replication configuration.
    #[must_use]
    pub fn replication(&self) -> Option<serde_json::Value> {
        self.replication.read().clone()
    }

    /// Replace (or clear) the replication configuration.
    pub fn set_replication(&self, replication: Option<serde_json::Value>) {
        *self.replication.write() = replication;
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    /// A copy of one object's metadata.
    #[must_use]
    pub fn get_object(&self, key: &str) -> Option<ObjectMetadata> {
        self.objects.read().get(key).cloned()
    }

    /// Whether `key` has at least one version.
    #[must_use]
    pub fn has_object(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    /// Number of keys with at least one version.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Run `f` against the object map while holding its read lock.
    pub fn read_objects<R>(&self, f: impl FnOnce(&BTreeMap<String, ObjectMetadata>) -> R) -> R {
        f(&self.objects.read())
    }

    /// Add `version` under `version_id`, creating the object if needed.
    /// Returns the entry it replaced, if the ID was already present.
    pub fn put_version(
        &self,
        key: &str,
        version_id: &str,
        version: VersionedObjectMetadata,
    ) -> Option<VersionedObjectMetadata> {
        let mut objects = self.objects.write();
        match objects.get_mut(key) {
            Some(object) => object.put_version(version_id, version),
            None => {
                objects.insert(key.to_owned(), ObjectMetadata::new(key, version_id, version));
                None
            }
        }
    }

    /// Make `version` the null version of `key`, ordered under `virtual_id`,
    /// creating the object if needed. Returns the replaced null version.
    pub fn put_null_version(
        &self,
        key: &str,
        virtual_id: &str,
        version: VersionedObjectMetadata,
    ) -> Option<VersionedObjectMetadata> {
        let mut objects = self.objects.write();
        match objects.get_mut(key) {
            Some(object) => object.put_null_version(virtual_id, version),
            None => {
                objects.insert(
                    key.to_owned(),
                    ObjectMetadata::with_null_version(key, virtual_id, version),
                );
                None
            }
        }
    }

    /// Remove one version. The object disappears with its last version.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoSuchKey`] or [`EngineError::NoSuchVersion`].
    pub fn remove_version(
        &self,
        key: &str,
        version_id: &str,
    ) -> EngineResult<VersionedObjectMetadata> {
        let mut objects = self.objects.write();
        let object = objects.get_mut(key).ok_or_else(|| EngineError::NoSuchKey {
            key: key.to_owned(),
        })?;
        let removed = object
            .remove_version(version_id)
            .ok_or_else(|| EngineError::NoSuchVersion {
                key: key.to_owned(),
                version_id: version_id.to_owned(),
            })?;
        if object.is_empty() {
            objects.remove(key);
            debug!(bucket = %self.name, key, "removed last version, dropping object");
        }
        Ok(removed)
    }

    /// Remove an object with all its versions.
    pub fn remove_object(&self, key: &str) -> Option<ObjectMetadata> {
        self.objects.write().remove(key)
    }

    // -----------------------------------------------------------------------
    // Multipart uploads
    // -----------------------------------------------------------------------

    /// Register a new upload.
    pub fn add_upload(&self, upload: UploadMetadata) {
        self.uploads
            .write()
            .entry(upload.key.clone())
            .or_default()
            .insert(upload.upload_id.clone(), upload);
    }

    /// A copy of one upload.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoSuchUpload`] if the upload is not registered
    /// under `key`.
    pub fn get_upload(&self, key: &str, upload_id: &str) -> EngineResult<UploadMetadata> {
        self.uploads
            .read()
            .get(key)
            .and_then(|by_id| by_id.get(upload_id))
            .cloned()
            .ok_or_else(|| EngineError::NoSuchUpload {
                upload_id: upload_id.to_owned(),
            })
    }

    /// Insert or replace a part of an upload. Returns the replaced part.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoSuchUpload`] if the upload is not registered
    /// under `key`.
    pub fn put_part(
        &self,
        key: &str,
        upload_id: &str,
        part: UploadPartMetadata,
    ) -> EngineResult<Option<UploadPartMetadata>> {
        let mut uploads = self.uploads.write();
        let upload = uploads
            .get_mut(key)
            .and_then(|by_id| by_id.get_mut(upload_id))
            .ok_or_else(|| EngineError::NoSuchUpload {
                upload_id: upload_id.to_owned(),
            })?;
        Ok(upload.put_part(part))
    }

    /// Remove an upload on completion or abort.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoSuchUpload`] if the upload is not registered
    /// under `key`.
    pub fn remove_upload(&self, key: &str, upload_id: &str) -> EngineResult<UploadMetadata> {
        let mut uploads = self.uploads.write();
        let by_id = uploads.get_mut(key).ok_or_else(|| EngineError::NoSuchUpload {
            upload_id: upload_id.to_owned(),
        })?;
        let upload = by_id.remove(upload_id).ok_or_else(|| EngineError::NoSuchUpload {
            upload_id: upload_id.to_owned(),
        })?;
        if by_id.is_empty() {
            uploads.remove(key);
        }
        Ok(upload)
    }

    /// All in-progress uploads, ordered by key then upload ID.
    #[must_use]
    pub fn list_uploads(&self) -> Vec<UploadMetadata> {
        self.uploads
            .read()
            .values()
            .flat_map(|by_id| by_id.values().cloned())
            .collect()
    }

    /// Number of in-progress uploads.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.uploads.read().values().map(BTreeMap::len).sum()
    }
}
