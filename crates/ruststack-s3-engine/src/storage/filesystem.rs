//! Local-filesystem blob storage: one file per storage ID.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use super::{BlobReader, BlobStorage};
use crate::error::{EngineError, EngineResult};
use crate::id::IdGenerator;

/// Blobs stored as raw files named by the decimal storage ID.
///
/// Writes truncate and recreate the file. The directory is created when the
/// store is opened.
#[derive(Debug)]
pub struct FilesystemBlobStorage {
    ids: Arc<IdGenerator>,
    dir: PathBuf,
}

impl FilesystemBlobStorage {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Internal`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>, ids: Arc<IdGenerator>) -> EngineResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            anyhow::Error::new(e).context(format!(
                "failed to create blob directory {}",
                dir.display()
            ))
        })?;
        debug!(dir = %dir.display(), "opened filesystem blob storage");
        Ok(Self { ids, dir })
    }

    /// Open a store over a directory that must already exist. Nothing is
    /// created, so a shared read-only dataset stays untouched.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] if `dir` is not an existing
    /// directory.
    pub fn open_existing(dir: impl Into<PathBuf>, ids: Arc<IdGenerator>) -> EngineResult<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(EngineError::invalid_argument(format!(
                "blob directory {} does not exist",
                dir.display()
            )));
        }
        debug!(dir = %dir.display(), "opened existing filesystem blob storage");
        Ok(Self { ids, dir })
    }

    /// Root directory of this store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: u64) -> PathBuf {
        self.dir.join(id.to_string())
    }

    fn resolve_id(&self, id: Option<u64>) -> EngineResult<u64> {
        match id {
            Some(id) => Ok(id),
            None => self.ids.next_id(),
        }
    }
}

/// Map an I/O error reading or removing blob `id`, keeping "not found"
/// distinguishable.
fn io_error(id: u64, path: &Path, op: &str, err: io::Error) -> EngineError {
    if err.kind() == io::ErrorKind::NotFound {
        EngineError::BlobNotFound { id }
    } else {
        write_error(path, op, err)
    }
}

/// Map an I/O error writing a blob. A missing file or directory here is a
/// storage fault, never a missing blob.
fn write_error(path: &Path, op: &str, err: io::Error) -> EngineError {
    anyhow::Error::new(err)
        .context(format!("failed to {op} blob file {}", path.display()))
        .into()
}

impl BlobStorage for FilesystemBlobStorage {
    fn put(&self, id: Option<u64>, data: &[u8]) -> EngineResult<u64> {
        let id = self.resolve_id(id)?;
        let path = self.path(id);
        fs::write(&path, data).map_err(|e| write_error(&path, "write", e))?;
        trace!(id, size = data.len(), "wrote blob file");
        Ok(id)
    }

    fn put_stream(&self, id: Option<u64>, reader: &mut dyn Read) -> EngineResult<u64> {
        let id = self.resolve_id(id)?;
        let path = self.path(id);
        let mut file = File::create(&path).map_err(|e| write_error(&path, "create", e))?;
        let size = io::copy(reader, &mut file).map_err(|e| write_error(&path, "write", e))?;
        trace!(id, size, "streamed blob file");
        Ok(id)
    }

    fn get_bytes(&self, id: u64) -> EngineResult<Bytes> {
        let path = self.path(id);
        let data = fs::read(&path).map_err(|e| io_error(id, &path, "read", e))?;
        Ok(Bytes::from(data))
    }

    fn get_reader(&self, id: u64) -> EngineResult<BlobReader> {
        let path = self.path(id);
        let file = File::open(&path).map_err(|e| io_error(id, &path, "open", e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn delete(&self, id: u64) -> EngineResult<u64> {
        let path = self.path(id);
        fs::remove_file(&path).map_err(|e| io_error(id, &path, "remove", e))?;
        trace!(id, "removed blob file");
        Ok(id)
    }

    fn exists(&self, id: u64) -> bool {
        self.path(id).is_file()
    }
}
