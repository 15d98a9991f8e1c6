//! Blob storage for object and part bytes.
//!
//! Blobs are addressed by a 64-bit storage ID, usually issued by the
//! [`IdGenerator`](crate::id::IdGenerator). Metadata only ever holds the ID;
//! deleting metadata never deletes the blob, callers do that explicitly.
//!
//! Four variants implement [`BlobStorage`] and nest freely through
//! `Arc<dyn BlobStorage>`:
//!
//! | Variant | Writes go to | Reads come from |
//! |---------|--------------|-----------------|
//! | [`InMemoryBlobStorage`] | process memory | process memory |
//! | [`FilesystemBlobStorage`] | one file per ID | one file per ID |
//! | [`LayeredBlobStorage`] | frontend | frontend, then backend |
//! | [`CopyOnAccessBlobStorage`] | private memory | private memory, materialized from base |
//!
//! Operations on different IDs may run concurrently. Concurrent writes to the
//! same ID are last-writer-wins.

mod copy_on_access;
mod filesystem;
mod layered;
mod memory;

use std::fmt;
use std::io::{Cursor, Read};

use bytes::Bytes;

pub use copy_on_access::CopyOnAccessBlobStorage;
pub use filesystem::FilesystemBlobStorage;
pub use layered::LayeredBlobStorage;
pub use memory::InMemoryBlobStorage;

use crate::error::EngineResult;

/// Reader over a stored blob.
pub type BlobReader = Box<dyn Read + Send>;

/// A key to bytes store addressed by 64-bit storage IDs.
pub trait BlobStorage: Send + Sync + fmt::Debug {
    /// Store `data` under `id`, or under a freshly generated ID when `id` is
    /// `None`. Returns the ID the blob was stored under.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::CapacityExceeded`](crate::error::EngineError::CapacityExceeded) when a size ceiling would
    /// be crossed, or [`EngineError::Internal`](crate::error::EngineError::Internal) on I/O failure.
    fn put(&self, id: Option<u64>, data: &[u8]) -> EngineResult<u64>;

    /// Store everything `reader` yields. See [`BlobStorage::put`].
    ///
    /// # Errors
    ///
    /// As [`BlobStorage::put`], plus [`EngineError::Internal`](crate::error::EngineError::Internal) if reading
    /// from `reader` fails.
    fn put_stream(&self, id: Option<u64>, reader: &mut dyn Read) -> EngineResult<u64> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| anyhow::Error::new(e).context("failed to read blob stream"))?;
        self.put(id, &buf)
    }

    /// Return the bytes stored under `id`.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::BlobNotFound`](crate::error::EngineError::BlobNotFound) if nothing is stored under `id`.
    fn get_bytes(&self, id: u64) -> EngineResult<Bytes>;

    /// Return a reader over the bytes stored under `id`.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::BlobNotFound`](crate::error::EngineError::BlobNotFound) if nothing is stored under `id`.
    fn get_reader(&self, id: u64) -> EngineResult<BlobReader> {
        Ok(Box::new(Cursor::new(self.get_bytes(id)?)))
    }

    /// Remove the blob stored under `id` and return `id`.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::BlobNotFound`](crate::error::EngineError::BlobNotFound) if nothing is stored under `id`.
    fn delete(&self, id: u64) -> EngineResult<u64>;

    /// Whether a blob is stored under `id`.
    fn exists(&self, id: u64) -> bool;
}
