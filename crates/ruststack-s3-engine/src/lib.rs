//! Metadata and storage engine for the RustStack S3 emulator.
//!
//! The engine keeps a versioned metadata tree (service, buckets, objects,
//! versions, multipart uploads) in memory, stores object bytes through a
//! pluggable blob storage stack, and optionally mirrors every bucket to a
//! JSON document on disk so state survives a restart. It has no wire
//! protocol of its own; an HTTP layer drives it through
//! [`service::BucketService`].
//!
//! # Architecture
//!
//! ```text
//! BucketService call (bucket, args)
//!        |
//!        v
//! InterceptedBucketService ---- CallSpec (lock mode, mutation kind)
//!        |
//!        v
//! MutationInterceptor -- BucketLockRegistry (per-bucket reentrant lock)
//!        |                 \
//!        v                  MetadataStore (<bucket>.bucket.meta)
//! MetadataService
//!        |
//!        +--> ServiceMetadata -> BucketMetadata -> ObjectMetadata -> versions
//!        |
//!        +--> BlobStorage (memory | filesystem | layered | copy-on-access)
//!                  ^
//!                  IdGenerator (snowflake IDs for blobs, versions, uploads)
//! ```

pub mod checksums;
pub mod config;
pub mod engine;
pub mod error;
pub mod id;
pub mod interceptor;
pub mod locks;
pub mod persistence;
pub mod service;
pub mod state;
pub mod storage;
pub mod token;
pub mod validation;

pub use config::EngineConfig;
pub use engine::S3Engine;
pub use error::{EngineError, EngineResult};
