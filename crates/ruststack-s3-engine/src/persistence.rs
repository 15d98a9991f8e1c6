//! Durable bucket metadata.
//!
//! [`FsMetadataStore`] keeps one JSON document per bucket in a single
//! directory:
//!
//! ```text
//! <dir>/
//!   version              format version, written once
//!   photos.bucket.meta   BucketSnapshot of bucket "photos"
//!   logs.bucket.meta
//! ```
//!
//! Records are written to a temporary file in the same directory and renamed
//! over the target, so readers never observe a partially written document.
//! Blob bytes are not stored here.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info, trace};

use crate::error::{EngineError, EngineResult};
use crate::state::BucketSnapshot;

/// Format version written to new metadata directories.
pub const FORMAT_VERSION: u32 = 1;

/// Suffix of per-bucket record files.
pub const RECORD_SUFFIX: &str = ".bucket.meta";

const VERSION_FILE: &str = "version";

/// Storage for per-bucket metadata records.
pub trait MetadataStore: Send + Sync + fmt::Debug {
    /// Load the record of bucket `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoSuchBucket`] if no record exists, or a
    /// persistence error if it cannot be read or parsed.
    fn fetch(&self, name: &str) -> EngineResult<BucketSnapshot>;

    /// Create or overwrite the record of bucket `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] or
    /// [`EngineError::MetadataFormat`] on failure.
    fn store(&self, name: &str, snapshot: &BucketSnapshot) -> EngineResult<()>;

    /// Remove the record of bucket `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the record does not exist or
    /// cannot be removed.
    fn delete(&self, name: &str) -> EngineResult<()>;

    /// Load every record. Used once at startup.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if any record cannot be read or parsed.
    fn fetch_all(&self) -> EngineResult<Vec<BucketSnapshot>>;
}

// ---------------------------------------------------------------------------
// FsMetadataStore
// ---------------------------------------------------------------------------

/// [`MetadataStore`] backed by JSON files in one directory.
pub struct FsMetadataStore {
    dir: PathBuf,
    /// Set once the directory and its version file are in place.
    initialized: Mutex<bool>,
}

impl fmt::Debug for FsMetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsMetadataStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

fn persistence_error(path: &Path, source: io::Error) -> EngineError {
    EngineError::Persistence {
        path: path.to_path_buf(),
        source,
    }
}

impl FsMetadataStore {
    /// Create a store rooted at `dir`. Nothing touches the disk until the
    /// first operation.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            initialized: Mutex::new(false),
        }
    }

    /// Root directory of this store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, name: &str) -> EngineResult<PathBuf> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(EngineError::invalid_argument(format!(
                "bucket name {name:?} cannot be used as a record name"
            )));
        }
        Ok(self.dir.join(format!("{name}{RECORD_SUFFIX}")))
    }

    /// Create the directory and version file on first use, or check the
    /// version of an existing directory.
    fn ensure_initialized(&self) -> EngineResult<()> {
        let mut initialized = self.initialized.lock();
        if *initialized {
            return Ok(());
        }

        fs::create_dir_all(&self.dir).map_err(|e| persistence_error(&self.dir, e))?;
        let version_path = self.dir.join(VERSION_FILE);
        match fs::read_to_string(&version_path) {
            Ok(content) => {
                let version: u32 = content.trim().parse().map_err(|_| {
                    EngineError::invalid_argument(format!(
                        "unreadable metadata format version {:?} in {}",
                        content.trim(),
                        version_path.display()
                    ))
                })?;
                if version > FORMAT_VERSION {
                    return Err(EngineError::invalid_argument(format!(
                        "metadata format version {version} in {} is newer than supported version {FORMAT_VERSION}",
                        self.dir.display()
                    )));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.write_atomic(&version_path, FORMAT_VERSION.to_string().as_bytes())?;
                info!(dir = %self.dir.display(), version = FORMAT_VERSION, "initialized metadata directory");
            }
            Err(e) => return Err(persistence_error(&version_path, e)),
        }

        *initialized = true;
        Ok(())
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> EngineResult<()> {
        let mut temp = NamedTempFile::new_in(&self.dir).map_err(|e| persistence_error(&self.dir, e))?;
        temp.write_all(data)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| persistence_error(temp.path(), e))?;
        temp.persist(path)
            .map_err(|e| persistence_error(path, e.error))?;
        Ok(())
    }

    fn read_record(path: &Path) -> EngineResult<BucketSnapshot> {
        let data = fs::read(path).map_err(|e| persistence_error(path, e))?;
        serde_json::from_slice(&data).map_err(|source| EngineError::MetadataFormat {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl MetadataStore for FsMetadataStore {
    fn fetch(&self, name: &str) -> EngineResult<BucketSnapshot> {
        let path = self.record_path(name)?;
        if !path.is_file() {
            return Err(EngineError::NoSuchBucket {
                bucket: name.to_owned(),
            });
        }
        Self::read_record(&path)
    }

    fn store(&self, name: &str, snapshot: &BucketSnapshot) -> EngineResult<()> {
        let path = self.record_path(name)?;
        self.ensure_initialized()?;
        let data = serde_json::to_vec_pretty(snapshot).map_err(|source| {
            EngineError::MetadataFormat {
                path: path.clone(),
                source,
            }
        })?;
        self.write_atomic(&path, &data)?;
        debug!(bucket = %name, bytes = data.len(), "stored bucket metadata");
        Ok(())
    }

    fn delete(&self, name: &str) -> EngineResult<()> {
        let path = self.record_path(name)?;
        fs::remove_file(&path).map_err(|e| persistence_error(&path, e))?;
        debug!(bucket = %name, "deleted bucket metadata");
        Ok(())
    }

    fn fetch_all(&self) -> EngineResult<Vec<BucketSnapshot>> {
        if !self.dir.is_dir() {
            debug!(dir = %self.dir.display(), "no metadata directory yet");
            return Ok(Vec::new());
        }
        self.ensure_initialized()?;

        let entries = fs::read_dir(&self.dir).map_err(|e| persistence_error(&self.dir, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| persistence_error(&self.dir, e))?;
            let path = entry.path();
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(RECORD_SUFFIX));
            if is_record && path.is_file() {
                paths.push(path);
            } else {
                trace!(path = %path.display(), "skipping non-record entry");
            }
        }
        paths.sort();

        let snapshots = paths
            .iter()
            .map(|path| Self::read_record(path))
            .collect::<EngineResult<Vec<_>>>()?;
        info!(dir = %self.dir.display(), count = snapshots.len(), "loaded bucket metadata");
        Ok(snapshots)
    }
}
