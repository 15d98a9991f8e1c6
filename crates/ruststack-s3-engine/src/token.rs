//! Continuation-token codec for paginated list operations.
//!
//! A token captures the list parameters needed to resume a listing. Each
//! present field is written as a one-digit tag followed by its
//! percent-encoded value; segments are joined with `/`, a content hash is
//! appended after a final `/`, and the result is base64-encoded (URL-safe,
//! unpadded):
//!
//! ```text
//! base64url( "1%2F/5photos%2F/6photos%2Fa.jpg" + "/" + hash )
//! ```
//!
//! Decoding verifies the hash, so a truncated or edited token is rejected
//! with [`EngineError::InvalidContinuationToken`] instead of silently
//! resuming somewhere else. Tokens are untrusted input.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use typed_builder::TypedBuilder;

use crate::error::{EngineError, EngineResult};

/// URL-safe alphabet; emits no padding, accepts it either way.
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const SEPARATOR: char = '/';

const DELIMITER_TAG: char = '1';
const ENCODING_TYPE_TAG: char = '2';
const FETCH_OWNER_TAG: char = '3';
const MAX_KEYS_TAG: char = '4';
const PREFIX_TAG: char = '5';
const START_AFTER_TAG: char = '6';

/// The list parameters a continuation token carries.
///
/// # Examples
///
/// ```
/// use ruststack_s3_engine::token::{ListParameters, decode, encode};
///
/// let params = ListParameters::builder()
///     .prefix("photos/".to_owned())
///     .max_keys(2)
///     .build();
/// let token = encode(&params);
/// assert_eq!(decode(&token).unwrap(), params);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, TypedBuilder)]
pub struct ListParameters {
    /// Character grouping keys into common prefixes.
    #[builder(default, setter(strip_option))]
    pub delimiter: Option<char>,
    /// Requested key encoding in responses (e.g. `url`).
    #[builder(default, setter(strip_option))]
    pub encoding_type: Option<String>,
    /// Whether owners are included in listed entries.
    #[builder(default, setter(strip_option))]
    pub fetch_owner: Option<bool>,
    /// Page size.
    #[builder(default, setter(strip_option))]
    pub max_keys: Option<i32>,
    /// Only keys starting with this prefix are listed.
    #[builder(default, setter(strip_option))]
    pub prefix: Option<String>,
    /// Listing resumes strictly after this key.
    #[builder(default, setter(strip_option))]
    pub start_after: Option<String>,
}

/// Encode list parameters into an opaque, URL-safe token.
#[must_use]
pub fn encode(params: &ListParameters) -> String {
    let mut segments: Vec<String> = Vec::with_capacity(6);

    if let Some(delimiter) = params.delimiter {
        let mut buf = [0u8; 4];
        segments.push(tagged(DELIMITER_TAG, delimiter.encode_utf8(&mut buf)));
    }
    if let Some(encoding_type) = &params.encoding_type {
        segments.push(tagged(ENCODING_TYPE_TAG, encoding_type));
    }
    if let Some(fetch_owner) = params.fetch_owner {
        segments.push(tagged(FETCH_OWNER_TAG, &fetch_owner.to_string()));
    }
    if let Some(max_keys) = params.max_keys {
        segments.push(tagged(MAX_KEYS_TAG, &max_keys.to_string()));
    }
    if let Some(prefix) = &params.prefix {
        segments.push(tagged(PREFIX_TAG, prefix));
    }
    if let Some(start_after) = &params.start_after {
        segments.push(tagged(START_AFTER_TAG, start_after));
    }

    let body = segments.join("/");
    let raw = format!("{body}{SEPARATOR}{}", content_hash(&body));
    TOKEN_ENGINE.encode(raw.as_bytes())
}

/// Decode a token produced by [`encode`].
///
/// # Errors
///
/// Returns [`EngineError::InvalidContinuationToken`] if the token is not
/// base64, is not UTF-8, fails its hash check, carries an unknown or repeated
/// field tag, or a field value does not parse.
pub fn decode(token: &str) -> EngineResult<ListParameters> {
    let bytes = TOKEN_ENGINE
        .decode(token)
        .map_err(|e| EngineError::invalid_token(format!("not base64: {e}")))?;
    let raw = String::from_utf8(bytes)
        .map_err(|_| EngineError::invalid_token("token contains invalid UTF-8"))?;

    let (body, hash) = raw
        .rsplit_once(SEPARATOR)
        .ok_or_else(|| EngineError::invalid_token("missing hash"))?;
    let hash: i32 = hash
        .parse()
        .map_err(|_| EngineError::invalid_token("hash is not numeric"))?;
    if hash != content_hash(body) {
        return Err(EngineError::invalid_token("hash mismatch"));
    }

    let mut params = ListParameters::default();
    for segment in body.split(SEPARATOR).filter(|s| !s.is_empty()) {
        let mut chars = segment.chars();
        let tag = chars.next().unwrap_or_default();
        let value = percent_decode_str(chars.as_str())
            .decode_utf8()
            .map_err(|_| EngineError::invalid_token("field is not UTF-8"))?
            .into_owned();
        apply_field(&mut params, tag, value)?;
    }

    Ok(params)
}

/// Parse one decoded field into `params`.
fn apply_field(params: &mut ListParameters, tag: char, value: String) -> EngineResult<()> {
    let duplicate = || EngineError::invalid_token(format!("field {tag} repeated"));
    match tag {
        DELIMITER_TAG => {
            let mut chars = value.chars();
            let delimiter = match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => return Err(EngineError::invalid_token("delimiter must be one character")),
            };
            if params.delimiter.replace(delimiter).is_some() {
                return Err(duplicate());
            }
        }
        ENCODING_TYPE_TAG => {
            if params.encoding_type.replace(value).is_some() {
                return Err(duplicate());
            }
        }
        FETCH_OWNER_TAG => {
            let fetch_owner = value
                .parse::<bool>()
                .map_err(|_| EngineError::invalid_token("fetch-owner is not a boolean"))?;
            if params.fetch_owner.replace(fetch_owner).is_some() {
                return Err(duplicate());
            }
        }
        MAX_KEYS_TAG => {
            let max_keys = value
                .parse::<i32>()
                .map_err(|_| EngineError::invalid_token("max-keys is not an integer"))?;
            if params.max_keys.replace(max_keys).is_some() {
                return Err(duplicate());
            }
        }
        PREFIX_TAG => {
            if params.prefix.replace(value).is_some() {
                return Err(duplicate());
            }
        }
        START_AFTER_TAG => {
            if params.start_after.replace(value).is_some() {
                return Err(duplicate());
            }
        }
        other => {
            return Err(EngineError::invalid_token(format!(
                "unknown field tag {other:?}"
            )));
        }
    }
    Ok(())
}

fn tagged(tag: char, value: &str) -> String {
    format!("{tag}{}", utf8_percent_encode(value, NON_ALPHANUMERIC))
}

/// Polynomial (base 31) string hash with wrapping 32-bit arithmetic.
fn content_hash(s: &str) -> i32 {
    s.chars()
        .fold(0_i32, |h, c| h.wrapping_mul(31).wrapping_add_unsigned(u32::from(c)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_params() -> ListParameters {
        ListParameters::builder()
            .delimiter('/')
            .encoding_type("url".to_owned())
            .fetch_owner(true)
            .max_keys(250)
            .prefix("photos/2024/ä b&c=d".to_owned())
            .start_after("photos/2024/ä b&c=d/img-0042.jpg".to_owned())
            .build()
    }

    fn raw_token(raw: &str) -> String {
        TOKEN_ENGINE.encode(raw.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Round trips
    // -----------------------------------------------------------------------

    #[test]
    fn test_should_roundtrip_empty_parameters() {
        let params = ListParameters::default();
        let token = encode(&params);
        assert_eq!(decode(&token).unwrap_or_else(|e| panic!("decode: {e}")), params);
    }

    #[test]
    fn test_should_roundtrip_all_parameters() {
        let params = full_params();
        let token = encode(&params);
        assert_eq!(decode(&token).unwrap_or_else(|e| panic!("decode: {e}")), params);
    }

    #[test]
    fn test_should_roundtrip_partial_and_empty_values() {
        let cases = [
            ListParameters::builder().prefix(String::new()).build(),
            ListParameters::builder().delimiter('ü').max_keys(-1).build(),
            ListParameters::builder().fetch_owner(false).start_after("/".to_owned()).build(),
            ListParameters::builder().encoding_type("%2F".to_owned()).build(),
        ];
        for params in cases {
            let token = encode(&params);
            assert_eq!(
                decode(&token).unwrap_or_else(|e| panic!("decode {params:?}: {e}")),
                params
            );
        }
    }

    #[test]
    fn test_should_produce_url_safe_tokens() {
        let token = encode(&full_params());
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "unexpected character in {token}"
        );
    }

    #[test]
    fn test_should_accept_padded_tokens() {
        let params = ListParameters::builder().max_keys(7).build();
        let mut token = encode(&params);
        while token.len() % 4 != 0 {
            token.push('=');
        }
        assert_eq!(decode(&token).unwrap_or_else(|e| panic!("decode: {e}")), params);
    }

    // -----------------------------------------------------------------------
    // Rejections
    // -----------------------------------------------------------------------

    fn assert_invalid(token: &str) {
        assert!(
            matches!(
                decode(token),
                Err(EngineError::InvalidContinuationToken { .. })
            ),
            "token {token:?} should be rejected"
        );
    }

    #[test]
    fn test_should_reject_non_base64() {
        assert_invalid("!!!not-base64!!!");
    }

    #[test]
    fn test_should_reject_appended_character() {
        let mut token = encode(&full_params());
        token.push('A');
        assert_invalid(&token);

        let mut token = encode(&ListParameters::default());
        token.push('A');
        assert_invalid(&token);
    }

    #[test]
    fn test_should_reject_edited_body() {
        let body = "5abc";
        let forged = format!("5abd/{}", content_hash(body));
        assert_invalid(&raw_token(&forged));
    }

    #[test]
    fn test_should_reject_non_numeric_hash() {
        assert_invalid(&raw_token("5abc/xyz"));
        assert_invalid(&raw_token("5abc"));
    }

    #[test]
    fn test_should_reject_unknown_tag() {
        let body = "7abc";
        assert_invalid(&raw_token(&format!("{body}/{}", content_hash(body))));
    }

    #[test]
    fn test_should_reject_malformed_field_values() {
        for body in ["1ab", "3maybe", "4lots", "5a/5b"] {
            assert_invalid(&raw_token(&format!("{body}/{}", content_hash(body))));
        }
    }

    #[test]
    fn test_should_hash_like_a_base31_polynomial() {
        assert_eq!(content_hash(""), 0);
        assert_eq!(content_hash("a"), 97);
        assert_eq!(content_hash("ab"), 97 * 31 + 98);
    }
}
