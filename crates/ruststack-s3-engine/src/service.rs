//! Bucket-scoped business operations.
//!
//! [`BucketService`] is the operation surface a wire layer drives.
//! [`MetadataService`] implements it directly on the metadata model and blob
//! storage, with no locking and no persistence. [`InterceptedBucketService`]
//! wraps any implementation and routes every call through the
//! [`MutationInterceptor`] using the [`CallSpec`] declared in
//! [`Operation::call_spec`]:
//!
//! | Operation | Lock | Mutation |
//! |-----------|------|----------|
//! | `create_bucket` | write | create |
//! | `delete_bucket` | write | delete |
//! | `describe_bucket`, `get_object`, `list_objects` | read | none |
//! | every other operation | write | update |

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::checksums::{compute_etag, compute_multipart_etag};
use crate::error::{EngineError, EngineResult};
use crate::id::IdGenerator;
use crate::interceptor::{CallSpec, MutationInterceptor, MutationKind};
use crate::state::{
    BucketMetadata, CannedAcl, NULL_VERSION_ID, ServiceMetadata, TagSets, UploadMetadata,
    UploadPartMetadata, VersionedObjectMetadata, VersioningState,
};
use crate::storage::BlobStorage;
use crate::token::{self, ListParameters};
use crate::validation::{validate_bucket_name, validate_object_key};

/// Page size when a listing does not ask for one.
pub const DEFAULT_MAX_KEYS: i32 = 1000;

/// Highest part number a multipart upload accepts.
pub const MAX_PART_NUMBER: u32 = 10_000;

// ---------------------------------------------------------------------------
// Operation outputs
// ---------------------------------------------------------------------------

/// Summary of one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Versioning state.
    pub versioning: VersioningState,
    /// Keys with at least one version.
    pub object_count: usize,
    /// In-progress multipart uploads.
    pub upload_count: usize,
}

impl BucketInfo {
    /// Summarize `bucket`.
    #[must_use]
    pub fn of(bucket: &BucketMetadata) -> Self {
        Self {
            name: bucket.name().to_owned(),
            created: bucket.created(),
            versioning: bucket.versioning(),
            object_count: bucket.object_count(),
            upload_count: bucket.upload_count(),
        }
    }
}

/// Result of writing an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectOutput {
    /// Caller-visible version ID (`"null"` without versioning).
    pub version_id: String,
    /// Quoted entity tag.
    pub etag: String,
}

/// Result of reading an object.
#[derive(Debug, Clone)]
pub struct GetObjectOutput {
    /// Caller-visible version ID of the returned version.
    pub version_id: String,
    /// Metadata of the returned version.
    pub metadata: VersionedObjectMetadata,
    /// Object content.
    pub body: Bytes,
}

/// Result of deleting an object or version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteObjectOutput {
    /// Version created (delete marker) or removed.
    pub version_id: String,
    /// Whether the affected version is a delete marker.
    pub delete_marker: bool,
}

/// One key in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    /// Object key.
    pub key: String,
    /// Caller-visible ID of the current version.
    pub version_id: String,
    /// Quoted entity tag of the current version.
    pub etag: String,
    /// Size of the current version.
    pub size: u64,
    /// When the current version was written.
    pub last_modified: DateTime<Utc>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsOutput {
    /// Keys on this page, in key order.
    pub objects: Vec<ListedObject>,
    /// Prefixes rolled up by the delimiter, in key order.
    pub common_prefixes: Vec<String>,
    /// Whether more entries follow.
    pub is_truncated: bool,
    /// Token that resumes after this page, set when truncated.
    pub next_continuation_token: Option<String>,
}

impl ListObjectsOutput {
    /// Entries on this page, objects and common prefixes together.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.objects.len() + self.common_prefixes.len()
    }
}

// ---------------------------------------------------------------------------
// BucketService
// ---------------------------------------------------------------------------

/// Bucket-scoped operations. The bucket name is always the first argument.
pub trait BucketService: Send + Sync {
    /// Create an empty bucket.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidBucketName`] or [`EngineError::BucketAlreadyExists`].
    fn create_bucket(&self, bucket: &str) -> EngineResult<BucketInfo>;

    /// Delete an empty bucket.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoSuchBucket`] or [`EngineError::BucketNotEmpty`].
    fn delete_bucket(&self, bucket: &str) -> EngineResult<()>;

    /// Summarize a bucket.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoSuchBucket`].
    fn describe_bucket(&self, bucket: &str) -> EngineResult<BucketInfo>;

    /// Enable or suspend versioning.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoSuchBucket`], or [`EngineError::InvalidArgument`]
    /// when asked to return to [`VersioningState::Unset`].
    fn set_versioning(&self, bucket: &str, state: VersioningState) -> EngineResult<()>;

    /// Replace or clear the tag sets.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoSuchBucket`].
    fn put_bucket_tagging(&self, bucket: &str, tagging: Option<TagSets>) -> EngineResult<()>;

    /// Replace or clear the policy document.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoSuchBucket`], or [`EngineError::InvalidArgument`] if
    /// the policy is not JSON.
    fn put_bucket_policy(&self, bucket: &str, policy: Option<String>) -> EngineResult<()>;

    /// Replace or clear the canned ACL.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoSuchBucket`].
    fn put_bucket_acl(&self, bucket: &str, acl: Option<CannedAcl>) -> EngineResult<()>;

    /// Replace or clear the replication configuration.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoSuchBucket`].
    fn put_bucket_replication(
        &self,
        bucket: &str,
        replication: Option<serde_json::Value>,
    ) -> EngineResult<()>;

    /// Write an object.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoSuchBucket`], [`EngineError::InvalidArgument`] for a
    /// bad key, or a blob storage error.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        data: &[u8],
    ) -> EngineResult<PutObjectOutput>;

    /// Read the current or a specific version of an object.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoSuchBucket`], [`EngineError::NoSuchKey`] (also when
    /// the current version is a delete marker) or
    /// [`EngineError::NoSuchVersion`].
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> EngineResult<GetObjectOutput>;

    /// Delete an object, or one specific version of it.
    ///
    /// Without a version ID, an `Enabled` bucket gains a delete marker, a
    /// `Suspended` bucket gains a delete marker as its null version, and an
    /// unversioned bucket loses its null version.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoSuchBucket`], or for a specific version
    /// [`EngineError::NoSuchKey`] / [`EngineError::NoSuchVersion`].
    fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> EngineResult<DeleteObjectOutput>;

    /// List current keys. A continuation token, when given, supersedes
    /// `params`.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoSuchBucket`],
    /// [`EngineError::InvalidContinuationToken`] or
    /// [`EngineError::InvalidArgument`] for a negative page size.
    fn list_objects(
        &self,
        bucket: &str,
        params: &ListParameters,
        continuation_token: Option<&str>,
    ) -> EngineResult<ListObjectsOutput>;

    /// Start a multipart upload and return its ID.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoSuchBucket`] or [`EngineError::InvalidArgument`].
    fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> EngineResult<String>;

    /// Store one part and return its ETag.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoSuchBucket`], [`EngineError::NoSuchUpload`],
    /// [`EngineError::InvalidArgument`] for an out-of-range part number, or
    /// a blob storage error.
    fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> EngineResult<String>;

    /// Assemble all uploaded parts, in part-number order, into an object.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoSuchBucket`], [`EngineError::NoSuchUpload`],
    /// [`EngineError::InvalidArgument`] if no part was uploaded, or a blob
    /// storage error.
    fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> EngineResult<PutObjectOutput>;

    /// Discard an upload and its parts.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoSuchBucket`] or [`EngineError::NoSuchUpload`].
    fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> EngineResult<()>;
}

// ---------------------------------------------------------------------------
// MetadataService
// ---------------------------------------------------------------------------

/// [`BucketService`] operating directly on the metadata model and blob
/// storage. Callers provide locking and persistence.
pub struct MetadataService {
    metadata: Arc<ServiceMetadata>,
    blobs: Arc<dyn BlobStorage>,
    ids: Arc<IdGenerator>,
}

impl fmt::Debug for MetadataService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataService")
            .field("metadata", &self.metadata)
            .field("blobs", &self.blobs)
            .finish_non_exhaustive()
    }
}

impl MetadataService {
    /// Create a service over shared metadata, blobs and ID generator.
    #[must_use]
    pub fn new(
        metadata: Arc<ServiceMetadata>,
        blobs: Arc<dyn BlobStorage>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            metadata,
            blobs,
            ids,
        }
    }

    /// Remove a blob no metadata refers to any more. Failures only leak the
    /// blob, so they are logged rather than returned.
    fn discard_blob(&self, file_id: Option<u64>) {
        let Some(id) = file_id else { return };
        if let Err(e) = self.blobs.delete(id) {
            warn!(file_id = id, error = %e, "failed to delete unreferenced blob");
        }
    }

    /// Record a freshly written blob as the newest version of `key`,
    /// following the bucket's versioning state.
    fn commit_version(
        &self,
        bucket: &BucketMetadata,
        key: &str,
        version_id: String,
        version: VersionedObjectMetadata,
    ) -> String {
        if bucket.versioning().is_enabled() {
            bucket.put_version(key, &version_id, version);
            version_id
        } else {
            let replaced = bucket.put_null_version(key, &version_id, version);
            self.discard_blob(replaced.and_then(|v| v.file_id));
            NULL_VERSION_ID.to_owned()
        }
    }
}

impl BucketService for MetadataService {
    fn create_bucket(&self, bucket: &str) -> EngineResult<BucketInfo> {
        validate_bucket_name(bucket)?;
        let created = self.metadata.add_bucket(BucketMetadata::new(bucket))?;
        info!(bucket, "bucket created");
        Ok(BucketInfo::of(&created))
    }

    fn delete_bucket(&self, bucket: &str) -> EngineResult<()> {
        let existing = self.metadata.get_bucket(bucket)?;
        if !existing.is_empty() {
            return Err(EngineError::BucketNotEmpty {
                bucket: bucket.to_owned(),
            });
        }
        self.metadata.remove_bucket(bucket)?;
        info!(bucket, "bucket deleted");
        Ok(())
    }

    fn describe_bucket(&self, bucket: &str) -> EngineResult<BucketInfo> {
        let target = self.metadata.get_bucket(bucket)?;
        Ok(BucketInfo::of(&target))
    }

    fn set_versioning(&self, bucket: &str, state: VersioningState) -> EngineResult<()> {
        let target = self.metadata.get_bucket(bucket)?;
        if state == VersioningState::Unset {
            return Err(EngineError::invalid_argument(
                "versioning can only be enabled or suspended",
            ));
        }
        target.set_versioning(state);
        Ok(())
    }

    fn put_bucket_tagging(&self, bucket: &str, tagging: Option<TagSets>) -> EngineResult<()> {
        self.metadata.get_bucket(bucket)?.set_tagging(tagging);
        Ok(())
    }

    fn put_bucket_policy(&self, bucket: &str, policy: Option<String>) -> EngineResult<()> {
        let target = self.metadata.get_bucket(bucket)?;
        if let Some(policy) = &policy {
            serde_json::from_str::<serde_json::Value>(policy)
                .map_err(|e| EngineError::invalid_argument(format!("policy is not JSON: {e}")))?;
        }
        target.set_policy(policy);
        Ok(())
    }

    fn put_bucket_acl(&self, bucket: &str, acl: Option<CannedAcl>) -> EngineResult<()> {
        self.metadata.get_bucket(bucket)?.set_acl(acl);
        Ok(())
    }

    fn put_bucket_replication(
        &self,
        bucket: &str,
        replication: Option<serde_json::Value>,
    ) -> EngineResult<()> {
        self.metadata.get_bucket(bucket)?.set_replication(replication);
        Ok(())
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        data: &[u8],
    ) -> EngineResult<PutObjectOutput> {
        validate_object_key(key)?;
        let target = self.metadata.get_bucket(bucket)?;
        let version_id = self.ids.next_id_string()?;
        let file_id = self.blobs.put(None, data)?;

        let etag = compute_etag(data);
        let size = u64::try_from(data.len()).unwrap_or(u64::MAX);
        let version = VersionedObjectMetadata::new(content_type, etag.clone(), size, file_id);
        let version_id = self.commit_version(&target, key, version_id, version);
        debug!(bucket, key, %version_id, size, "object written");
        Ok(PutObjectOutput { version_id, etag })
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> EngineResult<GetObjectOutput> {
        let target = self.metadata.get_bucket(bucket)?;
        let object = target.get_object(key).ok_or_else(|| EngineError::NoSuchKey {
            key: key.to_owned(),
        })?;

        let (version_id, metadata) = match version_id {
            Some(requested) => {
                let version =
                    object
                        .get_version(requested)
                        .ok_or_else(|| EngineError::NoSuchVersion {
                            key: key.to_owned(),
                            version_id: requested.to_owned(),
                        })?;
                if version.delete_marker {
                    return Err(EngineError::invalid_argument(format!(
                        "version {requested} of {key} is a delete marker"
                    )));
                }
                (requested.to_owned(), version.clone())
            }
            None => match object.latest() {
                Some((id, version)) if !version.delete_marker => (id.to_owned(), version.clone()),
                _ => {
                    return Err(EngineError::NoSuchKey {
                        key: key.to_owned(),
                    });
                }
            },
        };

        let file_id = metadata.file_id.ok_or_else(|| {
            anyhow::anyhow!("version {version_id} of {key} has no blob reference")
        })?;
        let body = self.blobs.get_bytes(file_id)?;
        Ok(GetObjectOutput {
            version_id,
            metadata,
            body,
        })
    }

    fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> EngineResult<DeleteObjectOutput> {
        let target = self.metadata.get_bucket(bucket)?;

        if let Some(requested) = version_id {
            let removed = target.remove_version(key, requested)?;
            self.discard_blob(removed.file_id);
            debug!(bucket, key, version_id = requested, "object version deleted");
            return Ok(DeleteObjectOutput {
                version_id: requested.to_owned(),
                delete_marker: removed.delete_marker,
            });
        }

        if target.versioning().is_enabled() {
            let marker_id = self.ids.next_id_string()?;
            target.put_version(key, &marker_id, VersionedObjectMetadata::delete_marker());
            debug!(bucket, key, version_id = %marker_id, "delete marker written");
            return Ok(DeleteObjectOutput {
                version_id: marker_id,
                delete_marker: true,
            });
        }

        if target.versioning() == VersioningState::Suspended {
            let marker_id = self.ids.next_id_string()?;
            let replaced =
                target.put_null_version(key, &marker_id, VersionedObjectMetadata::delete_marker());
            self.discard_blob(replaced.and_then(|v| v.file_id));
            debug!(bucket, key, "null delete marker written");
            return Ok(DeleteObjectOutput {
                version_id: NULL_VERSION_ID.to_owned(),
                delete_marker: true,
            });
        }

        match target.remove_version(key, NULL_VERSION_ID) {
            Ok(removed) => {
                self.discard_blob(removed.file_id);
                debug!(bucket, key, "null version deleted");
            }
            Err(e) if e.is_not_found() => debug!(bucket, key, "nothing to delete"),
            Err(e) => return Err(e),
        }
        Ok(DeleteObjectOutput {
            version_id: NULL_VERSION_ID.to_owned(),
            delete_marker: false,
        })
    }

    fn list_objects(
        &self,
        bucket: &str,
        params: &ListParameters,
        continuation_token: Option<&str>,
    ) -> EngineResult<ListObjectsOutput> {
        let target = self.metadata.get_bucket(bucket)?;
        let params = match continuation_token {
            Some(t) => token::decode(t)?,
            None => params.clone(),
        };
        let max_keys = params.max_keys.unwrap_or(DEFAULT_MAX_KEYS);
        let max_keys = usize::try_from(max_keys).map_err(|_| {
            EngineError::invalid_argument(format!("max-keys must not be negative: {max_keys}"))
        })?;

        Ok(target.read_objects(|objects| list_page(objects, &params, max_keys)))
    }

    fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> EngineResult<String> {
        validate_object_key(key)?;
        let target = self.metadata.get_bucket(bucket)?;
        let upload_id = self.ids.next_id_string()?;
        target.add_upload(UploadMetadata::new(upload_id.clone(), key, content_type));
        debug!(bucket, key, %upload_id, "multipart upload created");
        Ok(upload_id)
    }

    fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> EngineResult<String> {
        if !(1..=MAX_PART_NUMBER).contains(&part_number) {
            return Err(EngineError::invalid_argument(format!(
                "part number must be between 1 and {MAX_PART_NUMBER}: {part_number}"
            )));
        }
        let target = self.metadata.get_bucket(bucket)?;
        target.get_upload(key, upload_id)?;

        let file_id = self.blobs.put(None, data)?;
        let etag = compute_etag(data);
        let size = u64::try_from(data.len()).unwrap_or(u64::MAX);
        let part = UploadPartMetadata::new(part_number, etag.clone(), size, file_id);
        let replaced = target.put_part(key, upload_id, part)?;
        self.discard_blob(replaced.map(|p| p.file_id));
        debug!(bucket, key, upload_id, part_number, size, "part uploaded");
        Ok(etag)
    }

    fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> EngineResult<PutObjectOutput> {
        let target = self.metadata.get_bucket(bucket)?;
        let upload = target.get_upload(key, upload_id)?;
        if upload.parts.is_empty() {
            return Err(EngineError::invalid_argument(format!(
                "upload {upload_id} has no parts"
            )));
        }

        let mut assembled = BytesMut::new();
        for part in upload.parts.values() {
            assembled.extend_from_slice(&self.blobs.get_bytes(part.file_id)?);
        }
        let version_id = self.ids.next_id_string()?;
        let file_id = self.blobs.put(None, &assembled)?;

        let etag = compute_multipart_etag(&upload.part_etags());
        let version = VersionedObjectMetadata::new(
            upload.content_type.clone(),
            etag.clone(),
            upload.total_size(),
            file_id,
        );
        target.remove_upload(key, upload_id)?;
        let version_id = self.commit_version(&target, key, version_id, version);
        for part in upload.parts.values() {
            self.discard_blob(Some(part.file_id));
        }
        debug!(
            bucket,
            key,
            upload_id,
            %version_id,
            parts = upload.parts.len(),
            "multipart upload completed"
        );
        Ok(PutObjectOutput { version_id, etag })
    }

    fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> EngineResult<()> {
        let target = self.metadata.get_bucket(bucket)?;
        let upload = target.remove_upload(key, upload_id)?;
        for part in upload.parts.values() {
            self.discard_blob(Some(part.file_id));
        }
        debug!(bucket, key, upload_id, "multipart upload aborted");
        Ok(())
    }
}

/// Build one listing page from the bucket's key-ordered object map.
fn list_page(
    objects: &std::collections::BTreeMap<String, crate::state::ObjectMetadata>,
    params: &ListParameters,
    max_keys: usize,
) -> ListObjectsOutput {
    use std::ops::Bound;

    if max_keys == 0 {
        return ListObjectsOutput::default();
    }

    let prefix = params.prefix.as_deref().unwrap_or_default();
    let start = match params.start_after.as_deref() {
        Some(after) => Bound::Excluded(after),
        None => Bound::Unbounded,
    };
    // A page that ended on a common prefix resumes after everything under it.
    let skip_under = params.start_after.as_deref().filter(|after| {
        params.delimiter.is_some_and(|d| {
            after
                .strip_prefix(prefix)
                .and_then(|rest| rest.find(d))
                .is_some_and(|pos| pos + d.len_utf8() == after.len() - prefix.len())
        })
    });

    let mut page = ListObjectsOutput::default();
    let mut last_entry: Option<String> = None;

    for (key, object) in objects.range::<str, _>((start, Bound::Unbounded)) {
        if !key.starts_with(prefix) || skip_under.is_some_and(|p| key.starts_with(p)) {
            continue;
        }
        let Some((version_id, latest)) = object.latest() else {
            continue;
        };
        if latest.delete_marker {
            continue;
        }

        let rolled_up = params.delimiter.and_then(|d| {
            key[prefix.len()..]
                .find(d)
                .map(|pos| key[..prefix.len() + pos + d.len_utf8()].to_owned())
        });
        if let Some(common) = &rolled_up {
            if page.common_prefixes.last() == Some(common) {
                continue;
            }
        }

        if page.key_count() == max_keys {
            page.is_truncated = true;
            break;
        }

        match rolled_up {
            Some(common) => {
                last_entry = Some(common.clone());
                page.common_prefixes.push(common);
            }
            None => {
                last_entry = Some(key.clone());
                page.objects.push(ListedObject {
                    key: key.clone(),
                    version_id: version_id.to_owned(),
                    etag: latest.etag.clone(),
                    size: latest.size,
                    last_modified: latest.created,
                });
            }
        }
    }

    if page.is_truncated {
        let next = ListParameters {
            start_after: last_entry.or_else(|| params.start_after.clone()),
            ..params.clone()
        };
        page.next_continuation_token = Some(token::encode(&next));
    }
    page
}

// ---------------------------------------------------------------------------
// Call table
// ---------------------------------------------------------------------------

/// Every operation of [`BucketService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// [`BucketService::create_bucket`]
    CreateBucket,
    /// [`BucketService::delete_bucket`]
    DeleteBucket,
    /// [`BucketService::describe_bucket`]
    DescribeBucket,
    /// [`BucketService::set_versioning`]
    SetVersioning,
    /// [`BucketService::put_bucket_tagging`]
    PutBucketTagging,
    /// [`BucketService::put_bucket_policy`]
    PutBucketPolicy,
    /// [`BucketService::put_bucket_acl`]
    PutBucketAcl,
    /// [`BucketService::put_bucket_replication`]
    PutBucketReplication,
    /// [`BucketService::put_object`]
    PutObject,
    /// [`BucketService::get_object`]
    GetObject,
    /// [`BucketService::delete_object`]
    DeleteObject,
    /// [`BucketService::list_objects`]
    ListObjects,
    /// [`BucketService::create_multipart_upload`]
    CreateMultipartUpload,
    /// [`BucketService::upload_part`]
    UploadPart,
    /// [`BucketService::complete_multipart_upload`]
    CompleteMultipartUpload,
    /// [`BucketService::abort_multipart_upload`]
    AbortMultipartUpload,
}

impl Operation {
    /// The lock and persistence behaviour declared for this operation.
    #[must_use]
    pub const fn call_spec(self) -> CallSpec {
        match self {
            Self::CreateBucket => CallSpec::write().persists_as(MutationKind::Create),
            Self::DeleteBucket => CallSpec::write().persists_as(MutationKind::Delete),
            Self::DescribeBucket | Self::GetObject | Self::ListObjects => CallSpec::read(),
            Self::SetVersioning
            | Self::PutBucketTagging
            | Self::PutBucketPolicy
            | Self::PutBucketAcl
            | Self::PutBucketReplication
            | Self::PutObject
            | Self::DeleteObject
            | Self::CreateMultipartUpload
            | Self::UploadPart
            | Self::CompleteMultipartUpload
            | Self::AbortMultipartUpload => CallSpec::write().persists(),
        }
    }
}

// ---------------------------------------------------------------------------
// InterceptedBucketService
// ---------------------------------------------------------------------------

/// Decorator running every call of the wrapped service through a
/// [`MutationInterceptor`].
#[derive(Debug)]
pub struct InterceptedBucketService<S> {
    inner: S,
    interceptor: MutationInterceptor,
}

impl<S: BucketService> InterceptedBucketService<S> {
    /// Wrap `inner`.
    #[must_use]
    pub fn new(inner: S, interceptor: MutationInterceptor) -> Self {
        Self { inner, interceptor }
    }

    /// The wrapped service, bypassing locks and persistence.
    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// The interceptor in use.
    #[must_use]
    pub fn interceptor(&self) -> &MutationInterceptor {
        &self.interceptor
    }

    fn call<T>(
        &self,
        op: Operation,
        bucket: &str,
        f: impl FnOnce(&S) -> EngineResult<T>,
    ) -> EngineResult<T> {
        self.interceptor
            .intercept(bucket, op.call_spec(), || f(&self.inner))
    }
}

impl<S: BucketService> BucketService for InterceptedBucketService<S> {
    fn create_bucket(&self, bucket: &str) -> EngineResult<BucketInfo> {
        self.call(Operation::CreateBucket, bucket, |s| s.create_bucket(bucket))
    }

    fn delete_bucket(&self, bucket: &str) -> EngineResult<()> {
        self.call(Operation::DeleteBucket, bucket, |s| s.delete_bucket(bucket))
    }

    fn describe_bucket(&self, bucket: &str) -> EngineResult<BucketInfo> {
        self.call(Operation::DescribeBucket, bucket, |s| s.describe_bucket(bucket))
    }

    fn set_versioning(&self, bucket: &str, state: VersioningState) -> EngineResult<()> {
        self.call(Operation::SetVersioning, bucket, |s| {
            s.set_versioning(bucket, state)
        })
    }

    fn put_bucket_tagging(&self, bucket: &str, tagging: Option<TagSets>) -> EngineResult<()> {
        self.call(Operation::PutBucketTagging, bucket, |s| {
            s.put_bucket_tagging(bucket, tagging)
        })
    }

    fn put_bucket_policy(&self, bucket: &str, policy: Option<String>) -> EngineResult<()> {
        self.call(Operation::PutBucketPolicy, bucket, |s| {
            s.put_bucket_policy(bucket, policy)
        })
    }

    fn put_bucket_acl(&self, bucket: &str, acl: Option<CannedAcl>) -> EngineResult<()> {
        self.call(Operation::PutBucketAcl, bucket, |s| s.put_bucket_acl(bucket, acl))
    }

    fn put_bucket_replication(
        &self,
        bucket: &str,
        replication: Option<serde_json::Value>,
    ) -> EngineResult<()> {
        self.call(Operation::PutBucketReplication, bucket, |s| {
            s.put_bucket_replication(bucket, replication)
        })
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        data: &[u8],
    ) -> EngineResult<PutObjectOutput> {
        self.call(Operation::PutObject, bucket, |s| {
            s.put_object(bucket, key, content_type, data)
        })
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> EngineResult<GetObjectOutput> {
        self.call(Operation::GetObject, bucket, |s| {
            s.get_object(bucket, key, version_id)
        })
    }

    fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> EngineResult<DeleteObjectOutput> {
        self.call(Operation::DeleteObject, bucket, |s| {
            s.delete_object(bucket, key, version_id)
        })
    }

    fn list_objects(
        &self,
        bucket: &str,
        params: &ListParameters,
        continuation_token: Option<&str>,
    ) -> EngineResult<ListObjectsOutput> {
        self.call(Operation::ListObjects, bucket, |s| {
            s.list_objects(bucket, params, continuation_token)
        })
    }

    fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> EngineResult<String> {
        self.call(Operation::CreateMultipartUpload, bucket, |s| {
            s.create_multipart_upload(bucket, key, content_type)
        })
    }

    fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> EngineResult<String> {
        self.call(Operation::UploadPart, bucket, |s| {
            s.upload_part(bucket, key, upload_id, part_number, data)
        })
    }

    fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> EngineResult<PutObjectOutput> {
        self.call(Operation::CompleteMultipartUpload, bucket, |s| {
            s.complete_multipart_upload(bucket, key, upload_id)
        })
    }

    fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> EngineResult<()> {
        self.call(Operation::AbortMultipartUpload, bucket, |s| {
            s.abort_multipart_upload(bucket, key, upload_id)
        })
    }
}
