//! Object and object-version metadata.
//!
//! An [`ObjectMetadata`] holds every retained version of one key, ordered
//! newest first by [`VersionKey`]. Buckets that have never had versioning
//! enabled still order their history through a *virtual version*: an
//! internally generated ID that is reported to callers as [`NULL_VERSION_ID`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The version ID callers see for entries written without versioning.
pub const NULL_VERSION_ID: &str = "null";

// ---------------------------------------------------------------------------
// VersionKey
// ---------------------------------------------------------------------------

/// Version ID ordered newest first.
///
/// Generator-issued IDs are decimal integers and compare numerically, so a
/// later ID sorts before an earlier one. Non-numeric IDs sort ahead of every
/// numeric one and compare lexicographically (descending) among themselves.
///
/// ```
/// use ruststack_s3_engine::state::VersionKey;
///
/// let mut keys = vec![VersionKey::from("3"), VersionKey::from("1"), VersionKey::from("20")];
/// keys.sort();
/// let ordered: Vec<&str> = keys.iter().map(VersionKey::as_str).collect();
/// assert_eq!(ordered, ["20", "3", "1"]);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionKey(String);

impl VersionKey {
    /// The raw version ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl From<&str> for VersionKey {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for VersionKey {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Debug for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for VersionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let ascending = match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        };
        ascending.reverse()
    }
}

impl PartialOrd for VersionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// VersionedObjectMetadata
// ---------------------------------------------------------------------------

/// One immutable version of an object, or a delete marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedObjectMetadata {
    /// MIME type recorded at write time.
    pub content_type: String,
    /// Quoted entity tag.
    pub etag: String,
    /// When this version was written.
    pub created: DateTime<Utc>,
    /// Content length in bytes.
    pub size: u64,
    /// Whether this entry is a delete marker.
    #[serde(default)]
    pub delete_marker: bool,
    /// Blob storage ID of the content. `None` only for delete markers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<u64>,
}

impl VersionedObjectMetadata {
    /// A content-bearing version stored under blob `file_id`.
    #[must_use]
    pub fn new(
        content_type: impl Into<String>,
        etag: impl Into<String>,
        size: u64,
        file_id: u64,
    ) -> Self {
        Self {
            content_type: content_type.into(),
            etag: etag.into(),
            created: Utc::now(),
            size,
            delete_marker: false,
            file_id: Some(file_id),
        }
    }

    /// A delete marker with no backing blob.
    #[must_use]
    pub fn delete_marker() -> Self {
        Self {
            content_type: String::new(),
            etag: String::new(),
            created: Utc::now(),
            size: 0,
            delete_marker: true,
            file_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectMetadata
// ---------------------------------------------------------------------------

/// All retained versions of one key.
///
/// Always created together with its first version. A bucket drops the object
/// as soon as its last version is removed, so an `ObjectMetadata` reachable
/// from a bucket is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ObjectRecord")]
pub struct ObjectMetadata {
    key: String,
    versions: BTreeMap<VersionKey, VersionedObjectMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    virtual_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectRecord {
    key: String,
    versions: BTreeMap<VersionKey, VersionedObjectMetadata>,
    #[serde(default)]
    virtual_version: Option<String>,
}

impl TryFrom<ObjectRecord> for ObjectMetadata {
    type Error = String;

    fn try_from(record: ObjectRecord) -> Result<Self, Self::Error> {
        if record.versions.is_empty() {
            return Err(format!("object {} has no versions", record.key));
        }
        if let Some(virtual_version) = &record.virtual_version {
            if !record.versions.contains_key(&VersionKey::from(virtual_version.as_str())) {
                return Err(format!(
                    "object {} names missing virtual version {virtual_version}",
                    record.key
                ));
            }
        }
        Ok(Self {
            key: record.key,
            versions: record.versions,
            virtual_version: record.virtual_version,
        })
    }
}

impl ObjectMetadata {
    /// Create an object whose first version is `version_id`.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        version_id: impl Into<String>,
        version: VersionedObjectMetadata,
    ) -> Self {
        let mut versions = BTreeMap::new();
        versions.insert(VersionKey::from(version_id.into()), version);
        Self {
            key: key.into(),
            versions,
            virtual_version: None,
        }
    }

    /// Create an object whose first version is the null version, ordered
    /// internally under `virtual_id`.
    #[must_use]
    pub fn with_null_version(
        key: impl Into<String>,
        virtual_id: impl Into<String>,
        version: VersionedObjectMetadata,
    ) -> Self {
        let virtual_id = virtual_id.into();
        let mut object = Self::new(key, virtual_id.clone(), version);
        object.virtual_version = Some(virtual_id);
        object
    }

    /// The object key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of retained versions, delete markers included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Whether no versions remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Whether one of the versions is the null version.
    #[must_use]
    pub fn has_null_version(&self) -> bool {
        self.virtual_version.is_some()
    }

    /// The newest version and its caller-visible ID.
    #[must_use]
    pub fn latest(&self) -> Option<(&str, &VersionedObjectMetadata)> {
        self.versions
            .iter()
            .next()
            .map(|(id, version)| (self.visible_id(id), version))
    }

    /// Versions newest first, with caller-visible IDs.
    pub fn versions(&self) -> impl Iterator<Item = (&str, &VersionedObjectMetadata)> {
        self.versions
            .iter()
            .map(|(id, version)| (self.visible_id(id), version))
    }

    /// Look up a version by caller-visible ID ([`NULL_VERSION_ID`] included).
    #[must_use]
    pub fn get_version(&self, version_id: &str) -> Option<&VersionedObjectMetadata> {
        self.versions.get(&self.storage_key(version_id)?)
    }

    /// Insert `version` under `version_id`, making it the newest entry when
    /// the ID is the newest. Returns the entry it replaced, if any.
    pub fn put_version(
        &mut self,
        version_id: impl Into<String>,
        version: VersionedObjectMetadata,
    ) -> Option<VersionedObjectMetadata> {
        self.versions.insert(VersionKey::from(version_id.into()), version)
    }

    /// Replace the null version with `version`, ordered under `virtual_id`.
    /// Returns the previous null version, if there was one.
    pub fn put_null_version(
        &mut self,
        virtual_id: impl Into<String>,
        version: VersionedObjectMetadata,
    ) -> Option<VersionedObjectMetadata> {
        let replaced = self.take_null_version();
        let virtual_id = virtual_id.into();
        self.versions.insert(VersionKey::from(virtual_id.as_str()), version);
        self.virtual_version = Some(virtual_id);
        replaced
    }

    /// Remove a version by caller-visible ID.
    pub(crate) fn remove_version(&mut self, version_id: &str) -> Option<VersionedObjectMetadata> {
        if version_id == NULL_VERSION_ID {
            return self.take_null_version();
        }
        let key = self.storage_key(version_id)?;
        self.versions.remove(&key)
    }

    fn take_null_version(&mut self) -> Option<VersionedObjectMetadata> {
        let virtual_id = self.virtual_version.take()?;
        self.versions.remove(&VersionKey::from(virtual_id))
    }

    fn visible_id<'a>(&'a self, id: &'a VersionKey) -> &'a str {
        match &self.virtual_version {
            Some(v) if v == id.as_str() => NULL_VERSION_ID,
            _ => id.as_str(),
        }
    }

    /// Map a caller-visible ID to the map key. The virtual ID itself is not
    /// addressable from outside.
    fn storage_key(&self, version_id: &str) -> Option<VersionKey> {
        if version_id == NULL_VERSION_ID {
            return self.virtual_version.as_deref().map(VersionKey::from);
        }
        if self.virtual_version.as_deref() == Some(version_id) {
            return None;
        }
        Some(VersionKey::from(version_id))
    }
}
