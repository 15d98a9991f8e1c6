//! Multipart upload metadata.
//!
//! An [`UploadMetadata`] accumulates [`UploadPartMetadata`] entries, ordered
//! by part number, until the upload is completed or aborted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An in-progress multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    /// Unique identifier for this upload.
    pub upload_id: String,
    /// The object key the upload will create.
    pub key: String,
    /// When the upload was initiated.
    pub created: DateTime<Utc>,
    /// Content type declared at initiation.
    pub content_type: String,
    /// Parts uploaded so far, keyed by part number.
    #[serde(default)]
    pub parts: BTreeMap<u32, UploadPartMetadata>,
}

impl UploadMetadata {
    /// Create an upload with no parts.
    #[must_use]
    pub fn new(
        upload_id: impl Into<String>,
        key: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            upload_id: upload_id.into(),
            key: key.into(),
            created: Utc::now(),
            content_type: content_type.into(),
            parts: BTreeMap::new(),
        }
    }

    /// Insert or replace a part. Returns the part it replaced.
    pub fn put_part(&mut self, part: UploadPartMetadata) -> Option<UploadPartMetadata> {
        self.parts.insert(part.part_number, part)
    }

    /// Get a part by its number.
    #[must_use]
    pub fn get_part(&self, part_number: u32) -> Option<&UploadPartMetadata> {
        self.parts.get(&part_number)
    }

    /// Total size of all uploaded parts.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.parts.values().map(|p| p.size).sum()
    }

    /// Part ETags in part-number order.
    #[must_use]
    pub fn part_etags(&self) -> Vec<&str> {
        self.parts.values().map(|p| p.etag.as_str()).collect()
    }
}

/// One uploaded part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPartMetadata {
    /// The part number (1-based).
    pub part_number: u32,
    /// Quoted hex MD5 of the part.
    pub etag: String,
    /// When the part was last written.
    pub last_modified: DateTime<Utc>,
    /// Size in bytes.
    pub size: u64,
    /// Blob storage ID of the part bytes.
    pub file_id: u64,
}

impl UploadPartMetadata {
    /// Describe a part just written to blob `file_id`.
    #[must_use]
    pub fn new(part_number: u32, etag: impl Into<String>, size: u64, file_id: u64) -> Self {
        Self {
            part_number,
            etag: etag.into(),
            last_modified: Utc::now(),
            size,
            file_id,
        }
    }
}
