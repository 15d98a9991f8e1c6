//! ETag computation for stored objects.
//!
//! Single-part objects carry the quoted hex MD5 of their bytes. Objects
//! assembled from a multipart upload carry the MD5 of the concatenated part
//! digests, suffixed with the part count.

use md5::{Digest, Md5};

/// Compute the hex-encoded MD5 digest of `data`.
///
/// # Examples
///
/// ```
/// use ruststack_s3_engine::checksums::compute_md5;
///
/// assert_eq!(compute_md5(b"hello"), "5d41402abc4b2a76b9719d911017c592");
/// ```
#[must_use]
pub fn compute_md5(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Compute the quoted MD5 ETag of `data`.
///
/// # Examples
///
/// ```
/// use ruststack_s3_engine::checksums::compute_etag;
///
/// assert_eq!(compute_etag(b"hello"), "\"5d41402abc4b2a76b9719d911017c592\"");
/// ```
#[must_use]
pub fn compute_etag(data: &[u8]) -> String {
    format!("\"{}\"", compute_md5(data))
}

/// Compute the composite ETag of a multipart object from its part ETags.
///
/// Quotes around the part ETags are ignored. Part ETags that are not valid
/// hex contribute nothing to the digest.
#[must_use]
pub fn compute_multipart_etag(part_etags: &[impl AsRef<str>]) -> String {
    let mut combined = Vec::with_capacity(part_etags.len() * 16);
    for etag in part_etags {
        if let Ok(bytes) = hex::decode(etag.as_ref().trim_matches('"')) {
            combined.extend_from_slice(&bytes);
        }
    }
    format!("\"{}-{}\"", compute_md5(&combined), part_etags.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_compute_md5_of_empty_input() {
        assert_eq!(compute_md5(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_should_compute_multipart_etag() {
        let parts = [compute_etag(b"hello "), compute_etag(b"world")];
        let etag = compute_multipart_etag(&parts);
        assert!(etag.starts_with('"'));
        assert!(etag.ends_with("-2\""));

        let mut raw = hex::decode(compute_md5(b"hello ")).unwrap_or_default();
        raw.extend(hex::decode(compute_md5(b"world")).unwrap_or_default());
        assert_eq!(etag, format!("\"{}-2\"", compute_md5(&raw)));
    }
}
