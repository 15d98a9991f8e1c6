//! Validation of bucket names and object keys.
//!
//! Follows the
//! [Amazon S3 naming rules](https://docs.aws.amazon.com/AmazonS3/latest/userguide/bucketnamingrules.html)
//! that matter for a local emulator.

use std::net::Ipv4Addr;

use crate::error::{EngineError, EngineResult};

/// Minimum bucket name length.
const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length.
const MAX_BUCKET_NAME_LEN: usize = 63;

/// Maximum object key length in bytes.
const MAX_KEY_BYTES: usize = 1024;

/// Validate an S3 bucket name.
///
/// Rules:
/// - 3-63 characters long
/// - Only lowercase letters, numbers, hyphens, and dots
/// - Must start and end with a letter or number
/// - No consecutive dots (`..`)
/// - Not formatted as an IPv4 address
/// - Must not start with `xn--` or `sthree-`, nor end with `-s3alias`
///
/// # Errors
///
/// Returns [`EngineError::InvalidBucketName`] if any rule is violated.
///
/// # Examples
///
/// ```
/// use ruststack_s3_engine::validation::validate_bucket_name;
///
/// assert!(validate_bucket_name("my-valid-bucket").is_ok());
/// assert!(validate_bucket_name("AB").is_err());
/// ```
pub fn validate_bucket_name(name: &str) -> EngineResult<()> {
    let invalid = |reason: &str| EngineError::InvalidBucketName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };

    let len = name.len();
    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&len) {
        return Err(EngineError::InvalidBucketName {
            name: name.to_owned(),
            reason: format!(
                "Bucket name must be between {MIN_BUCKET_NAME_LEN} and {MAX_BUCKET_NAME_LEN} characters long"
            ),
        });
    }

    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return Err(invalid(
            "Bucket name must only contain lowercase letters, numbers, hyphens, and dots",
        ));
    }

    let bytes = name.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[len - 1]) {
        return Err(invalid("Bucket name must start and end with a letter or number"));
    }

    if name.contains("..") {
        return Err(invalid("Bucket name must not contain consecutive dots"));
    }

    if name.parse::<Ipv4Addr>().is_ok() {
        return Err(invalid("Bucket name must not be formatted as an IP address"));
    }

    if name.starts_with("xn--") || name.starts_with("sthree-") {
        return Err(invalid("Bucket name must not use a reserved prefix"));
    }

    if name.ends_with("-s3alias") {
        return Err(invalid("Bucket name must not end with '-s3alias'"));
    }

    Ok(())
}

/// Validate an S3 object key: 1-1024 bytes.
///
/// # Errors
///
/// Returns [`EngineError::InvalidArgument`] if the key is empty or too long.
pub fn validate_object_key(key: &str) -> EngineResult<()> {
    if key.is_empty() {
        return Err(EngineError::invalid_argument("Object key must not be empty"));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(EngineError::invalid_argument(format!(
            "Object key must not exceed {MAX_KEY_BYTES} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_accept_valid_bucket_names() {
        for name in ["abc", "my-bucket", "my.bucket.1", "0bucket9"] {
            assert!(validate_bucket_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_should_reject_invalid_bucket_names() {
        for name in [
            "ab",
            "UPPER",
            "-leading",
            "trailing.",
            "double..dot",
            "192.168.0.1",
            "xn--punycode",
            "sthree-bucket",
            "bucket-s3alias",
            "under_score",
        ] {
            assert!(
                matches!(
                    validate_bucket_name(name),
                    Err(EngineError::InvalidBucketName { .. })
                ),
                "{name} should be rejected"
            );
        }
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_should_validate_object_keys() {
        assert!(validate_object_key("photos/2024/image.jpg").is_ok());
        assert!(validate_object_key("").is_err());
        assert!(validate_object_key(&"k".repeat(1025)).is_err());
    }
}
