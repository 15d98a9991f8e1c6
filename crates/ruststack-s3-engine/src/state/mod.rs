//! In-memory metadata model.
//!
//! - [`ServiceMetadata`] -- every bucket by name
//! - [`BucketMetadata`] -- objects, uploads and configuration of one bucket
//! - [`ObjectMetadata`] / [`VersionedObjectMetadata`] -- versions of one key,
//!   newest first
//! - [`UploadMetadata`] / [`UploadPartMetadata`] -- in-progress multipart
//!   uploads
//!
//! # Thread Safety
//!
//! All types reachable from [`ServiceMetadata`] are `Send + Sync`. The
//! bucket table is a `DashMap`; every bucket field is a `parking_lot::RwLock`.
//! Blob storage IDs held here are plain handles: removing metadata never
//! removes the blob.

pub(crate) mod bucket;
pub(crate) mod multipart;
pub(crate) mod object;
pub(crate) mod service;

pub use bucket::{BucketMetadata, BucketSnapshot, CannedAcl, TagSets, VersioningState};
pub use multipart::{UploadMetadata, UploadPartMetadata};
pub use object::{NULL_VERSION_ID, ObjectMetadata, VersionKey, VersionedObjectMetadata};
pub use service::ServiceMetadata;
