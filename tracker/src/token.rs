//! Reversible tracking tokens.
//!
//! A token binds `(post_id, recipient_index)` into one opaque string
//! embedded in each recipient's tracking-pixel URL. The payload is base64
//! with the URL-safe alphabet and no padding, so the token needs no
//! escaping in a URL path segment, and a truncated HMAC-SHA256 tag under a
//! configured key stops casual tampering: a recipient cannot mint tokens
//! for other indices by editing their own. The key comes from
//! configuration, so tokens stay valid across process restarts.
//!
//! Decode is total over attacker-controlled input: any garbage yields a
//! typed error, never a panic and never a wrong pair.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Hex characters of the HMAC tag kept on the wire.
const TAG_LEN: usize = 16;

/// Separator between payload and tag; not part of the base64 alphabet.
const TAG_SEPARATOR: char = '.';

/// Delimiter between post id and recipient index inside the payload.
const PAYLOAD_DELIMITER: char = '_';

/// Error returned when a token cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The token does not match the expected structure: missing or wrong
    /// tag, invalid base64, or a payload that is not UTF-8.
    #[error("malformed tracking token")]
    Malformed,

    /// The payload decoded but does not split into an id/index pair.
    #[error("token payload is not an id/index pair")]
    Encoding,
}

/// Encoder/decoder for tracking tokens, keyed by a stable signing key.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    key: String,
}

impl TokenCodec {
    /// Create a codec with the given signing key.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Encode `(post_id, index)` into an opaque URL-safe token.
    pub fn encode(&self, post_id: &str, index: u64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!("{post_id}{PAYLOAD_DELIMITER}{index}"));
        let tag = self.tag(&payload);
        format!("{payload}{TAG_SEPARATOR}{tag}")
    }

    /// Decode a token back into `(post_id, index)`.
    pub fn decode(&self, token: &str) -> Result<(String, u64), TokenError> {
        let (payload, tag) = token
            .rsplit_once(TAG_SEPARATOR)
            .ok_or(TokenError::Malformed)?;

        if !constant_time_compare(&self.tag(payload), tag) {
            return Err(TokenError::Malformed);
        }

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let text = String::from_utf8(raw).map_err(|_| TokenError::Malformed)?;

        // Post ids may contain the delimiter, the index never does, so the
        // pair splits on the last occurrence.
        let (post_id, index) = text
            .rsplit_once(PAYLOAD_DELIMITER)
            .ok_or(TokenError::Encoding)?;
        if post_id.is_empty() {
            return Err(TokenError::Encoding);
        }
        let index: u64 = index.parse().map_err(|_| TokenError::Encoding)?;

        Ok((post_id.to_string(), index))
    }

    /// Build the tracking-pixel URL for one recipient of one post.
    pub fn pixel_url(&self, base_url: &str, post_id: &str, index: u64) -> String {
        format!(
            "{}/{}.gif",
            base_url.trim_end_matches('/'),
            self.encode(post_id, index)
        )
    }

    /// Truncated hex HMAC-SHA256 of the encoded payload.
    fn tag(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());

        let digest = hex::encode(mac.finalize().into_bytes());
        digest[..TAG_LEN].to_string()
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
