//! Engine error types.
//!
//! Defines [`EngineError`], the single error enum produced by every layer of
//! the engine: identifier generation, blob storage, the metadata model, the
//! persistence store and the continuation-token codec. Errors are raised at
//! the point of detection and travel unchanged through the mutation
//! interceptor; mapping them onto HTTP status codes is left to the wire layer.
//!
//! # Usage
//!
//! ```
//! use ruststack_s3_engine::error::EngineError;
//!
//! let err = EngineError::NoSuchBucket {
//!     bucket: "my-bucket".to_owned(),
//! };
//! assert!(err.is_not_found());
//! ```

use std::path::PathBuf;

/// Engine error type.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // -----------------------------------------------------------------------
    // Not found
    // -----------------------------------------------------------------------
    /// The specified bucket does not exist.
    #[error("The specified bucket does not exist: {bucket}")]
    NoSuchBucket {
        /// The bucket name that was not found.
        bucket: String,
    },

    /// The specified key does not exist.
    #[error("The specified key does not exist: {key}")]
    NoSuchKey {
        /// The key that was not found.
        key: String,
    },

    /// The specified version does not exist.
    #[error("The specified version does not exist: key={key}, version_id={version_id}")]
    NoSuchVersion {
        /// The key for the version.
        key: String,
        /// The version ID that was not found.
        version_id: String,
    },

    /// The specified multipart upload does not exist.
    #[error("The specified upload does not exist: {upload_id}")]
    NoSuchUpload {
        /// The upload ID that was not found.
        upload_id: String,
    },

    /// The specified part of a multipart upload does not exist.
    #[error("Part {part_number} of upload {upload_id} does not exist")]
    NoSuchPart {
        /// The upload the part was looked up in.
        upload_id: String,
        /// The missing part number.
        part_number: u32,
    },

    /// No blob is stored under the given storage ID.
    #[error("No blob stored under id {id}")]
    BlobNotFound {
        /// The storage ID that was not found.
        id: u64,
    },

    // -----------------------------------------------------------------------
    // Conflicts
    // -----------------------------------------------------------------------
    /// The bucket name is already taken.
    #[error("The requested bucket name is not available: {bucket}")]
    BucketAlreadyExists {
        /// The bucket name that already exists.
        bucket: String,
    },

    /// The bucket still holds objects or uploads and cannot be deleted.
    #[error("The bucket you tried to delete is not empty: {bucket}")]
    BucketNotEmpty {
        /// The bucket name that is not empty.
        bucket: String,
    },

    // -----------------------------------------------------------------------
    // Invalid input
    // -----------------------------------------------------------------------
    /// The specified bucket name is not valid.
    #[error("Invalid bucket name: {name}: {reason}")]
    InvalidBucketName {
        /// The invalid bucket name.
        name: String,
        /// The reason for the error.
        reason: String,
    },

    /// An argument provided is invalid.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// A continuation token could not be decoded or failed its integrity check.
    #[error("The continuation token provided is incorrect: {reason}")]
    InvalidContinuationToken {
        /// What was wrong with the token.
        reason: String,
    },

    // -----------------------------------------------------------------------
    // Resources
    // -----------------------------------------------------------------------
    /// Writing the blob would push the store past its size ceiling.
    #[error("Storage capacity exceeded: {requested} bytes requested, {available} of {capacity} available")]
    CapacityExceeded {
        /// Size of the rejected payload.
        requested: u64,
        /// Bytes still free before the write.
        available: u64,
        /// The configured ceiling.
        capacity: u64,
    },

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------
    /// Filesystem I/O failed while reading or writing bucket metadata.
    #[error("Metadata persistence failed at {}: {source}", path.display())]
    Persistence {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A persisted metadata document could not be (de)serialized.
    #[error("Malformed metadata document at {}: {source}", path.display())]
    MetadataFormat {
        /// The offending file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    // -----------------------------------------------------------------------
    // Fatal
    // -----------------------------------------------------------------------
    /// The wall clock went backwards; identifiers can no longer be ordered.
    #[error("Clock moved backwards: refusing to generate id for {now_ms} (last {last_ms})")]
    ClockMovedBackwards {
        /// The last millisecond an identifier was issued in.
        last_ms: u64,
        /// The regressed current millisecond.
        now_ms: u64,
    },

    // -----------------------------------------------------------------------
    // Internal / catch-all
    // -----------------------------------------------------------------------
    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Build an [`EngineError::InvalidArgument`] from any message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Build an [`EngineError::InvalidContinuationToken`] from any reason.
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidContinuationToken {
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to the not-found family.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NoSuchBucket { .. }
                | Self::NoSuchKey { .. }
                | Self::NoSuchVersion { .. }
                | Self::NoSuchUpload { .. }
                | Self::NoSuchPart { .. }
                | Self::BlobNotFound { .. }
        )
    }
}

/// Convenience result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_classify_not_found_errors() {
        assert!(EngineError::BlobNotFound { id: 7 }.is_not_found());
        assert!(
            EngineError::NoSuchPart {
                upload_id: "1".to_owned(),
                part_number: 2,
            }
            .is_not_found()
        );
        assert!(
            !EngineError::BucketNotEmpty {
                bucket: "b".to_owned(),
            }
            .is_not_found()
        );
    }

    #[test]
    fn test_should_render_messages_with_context() {
        let err = EngineError::CapacityExceeded {
            requested: 5,
            available: 2,
            capacity: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("5 bytes requested"));
        assert!(msg.contains("of 10"));

        let err = EngineError::invalid_token("bad hash");
        assert!(err.to_string().contains("bad hash"));
    }

    #[test]
    fn test_should_keep_io_source() {
        let err = EngineError::Persistence {
            path: PathBuf::from("/tmp/b.bucket.meta"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        let source = std::error::Error::source(&err);
        assert!(source.is_some());
        assert!(err.to_string().contains("b.bucket.meta"));
    }

    #[test]
    fn test_should_wrap_anyhow_as_internal() {
        let err: EngineError = anyhow::anyhow!("disk on fire").into();
        assert!(matches!(err, EngineError::Internal(_)));
        assert_eq!(err.to_string(), "disk on fire");
    }
}
