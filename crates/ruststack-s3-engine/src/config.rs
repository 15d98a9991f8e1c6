//! Engine configuration.
//!
//! Provides [`EngineConfig`] for assembling an [`crate::S3Engine`]. Values are
//! loaded from environment variables, following the same conventions as the
//! rest of RustStack.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Which blob storage stack the engine assembles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlobBackend {
    /// Bytes kept in process memory only.
    #[default]
    Memory,
    /// One file per blob under `<data_dir>/blobs`.
    Filesystem,
    /// Writes under `<data_dir>/blobs`, reads falling through to a read-only base directory.
    Layered,
    /// Private in-memory copies materialized lazily from a read-only base directory.
    CopyOnAccess,
}

impl BlobBackend {
    /// The configuration spelling of this backend.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Filesystem => "filesystem",
            Self::Layered => "layered",
            Self::CopyOnAccess => "copy-on-access",
        }
    }
}

impl fmt::Display for BlobBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`BlobBackend`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown blob backend: {0}")]
pub struct ParseBlobBackendError(String);

impl FromStr for BlobBackend {
    type Err = ParseBlobBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "filesystem" | "fs" => Ok(Self::Filesystem),
            "layered" => Ok(Self::Layered),
            "copy-on-access" | "copy_on_access" => Ok(Self::CopyOnAccess),
            _ => Err(ParseBlobBackendError(s.to_owned())),
        }
    }
}

/// Engine configuration.
///
/// # Examples
///
/// ```
/// use ruststack_s3_engine::config::{BlobBackend, EngineConfig};
///
/// let config = EngineConfig::default();
/// assert!(!config.persistence);
/// assert_eq!(config.blob_backend, BlobBackend::Memory);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Whether bucket metadata is persisted to `<data_dir>/metadata`.
    #[builder(default = false)]
    pub persistence: bool,

    /// Root directory for persisted metadata and filesystem blobs.
    #[builder(default = PathBuf::from("/var/lib/ruststack/s3"))]
    pub data_dir: PathBuf,

    /// Blob storage stack to assemble.
    #[builder(default)]
    pub blob_backend: BlobBackend,

    /// Shared base dataset for the layered and copy-on-access backends.
    #[builder(default, setter(strip_option))]
    pub blob_base_dir: Option<PathBuf>,

    /// Size ceiling (bytes) for in-memory blob stores. `None` is unbounded.
    #[builder(default, setter(strip_option))]
    pub max_memory_storage: Option<u64>,

    /// Datacenter field of the identifier generator.
    #[builder(default = 1)]
    pub datacenter_id: u64,

    /// Worker field of the identifier generator.
    #[builder(default = 1)]
    pub worker_id: u64,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `PERSISTENCE` | `false` |
    /// | `DATA_DIR` | `/var/lib/ruststack/s3` |
    /// | `S3_BLOB_BACKEND` | `memory` |
    /// | `S3_BLOB_BASE_DIR` | *(unset)* |
    /// | `S3_MAX_MEMORY_STORAGE` | *(unset)* |
    /// | `S3_DATACENTER_ID` | `1` |
    /// | `S3_WORKER_ID` | `1` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// Unparseable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("PERSISTENCE") {
            config.persistence = parse_bool(&v);
        }
        if let Some(v) = lookup("DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("S3_BLOB_BACKEND") {
            if let Ok(backend) = v.parse() {
                config.blob_backend = backend;
            }
        }
        if let Some(v) = lookup("S3_BLOB_BASE_DIR") {
            config.blob_base_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("S3_MAX_MEMORY_STORAGE") {
            if let Ok(n) = v.parse::<u64>() {
                config.max_memory_storage = Some(n);
            }
        }
        if let Some(v) = lookup("S3_DATACENTER_ID") {
            if let Ok(n) = v.parse::<u64>() {
                config.datacenter_id = n;
            }
        }
        if let Some(v) = lookup("S3_WORKER_ID") {
            if let Ok(n) = v.parse::<u64>() {
                config.worker_id = n;
            }
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Directory holding one JSON document per bucket.
    #[must_use]
    pub fn metadata_dir(&self) -> PathBuf {
        self.data_dir.join("metadata")
    }

    /// Directory holding one file per filesystem blob.
    #[must_use]
    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = EngineConfig::default();
        assert!(!config.persistence);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/ruststack/s3"));
        assert_eq!(config.blob_backend, BlobBackend::Memory);
        assert!(config.blob_base_dir.is_none());
        assert!(config.max_memory_storage.is_none());
        assert_eq!(config.datacenter_id, 1);
        assert_eq!(config.worker_id, 1);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_should_load_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("PERSISTENCE", "TRUE"),
            ("DATA_DIR", "/tmp/s3"),
            ("S3_BLOB_BACKEND", "copy-on-access"),
            ("S3_BLOB_BASE_DIR", "/srv/base"),
            ("S3_MAX_MEMORY_STORAGE", "4096"),
            ("S3_WORKER_ID", "7"),
            ("S3_DATACENTER_ID", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_owned()));
        assert!(config.persistence);
        assert_eq!(config.metadata_dir(), PathBuf::from("/tmp/s3/metadata"));
        assert_eq!(config.blob_dir(), PathBuf::from("/tmp/s3/blobs"));
        assert_eq!(config.blob_backend, BlobBackend::CopyOnAccess);
        assert_eq!(config.blob_base_dir, Some(PathBuf::from("/srv/base")));
        assert_eq!(config.max_memory_storage, Some(4096));
        assert_eq!(config.worker_id, 7);
        assert_eq!(config.datacenter_id, 1);
    }

    #[test]
    fn test_should_build_with_typed_builder() {
        let config = EngineConfig::builder()
            .persistence(true)
            .data_dir("/data".into())
            .blob_backend(BlobBackend::Layered)
            .blob_base_dir("/base".into())
            .max_memory_storage(10)
            .build();
        assert!(config.persistence);
        assert_eq!(config.blob_backend, BlobBackend::Layered);
        assert_eq!(config.max_memory_storage, Some(10));
    }

    #[test]
    fn test_should_parse_blob_backend() {
        assert_eq!("FS".parse::<BlobBackend>().ok(), Some(BlobBackend::Filesystem));
        assert_eq!(
            "copy_on_access".parse::<BlobBackend>().ok(),
            Some(BlobBackend::CopyOnAccess)
        );
        assert!("tape".parse::<BlobBackend>().is_err());
        assert_eq!(BlobBackend::Layered.to_string(), "layered");
    }

    #[test]
    fn test_should_serialize_to_camel_case_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).expect("test serialization");
        assert!(json.contains("dataDir"));
        assert!(json.contains("\"blobBackend\":\"memory\""));
    }

    #[test]
    fn test_should_parse_bool_values() {
        assert!(parse_bool("1"));
        assert!(parse_bool("True"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }
}
