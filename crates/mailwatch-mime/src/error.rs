//! Decoding failures.
//!
//! Public entry points such as [`crate::decode_header_value`] and
//! [`crate::Message::text_content`] never return these; they fall back to
//! the undecoded text. The errors surface only from the lower-level
//! decoders.

/// Result of a lower-level decoder.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a header, body or content type could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed quoted-printable or encoded-word payload.
    #[error("malformed encoded text: {0}")]
    InvalidEncoding(String),

    /// Malformed base64 payload.
    #[error("malformed base64: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Structurally invalid header value.
    #[error("unparseable {0}")]
    Parse(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use base64::Engine;

    use super::*;

    #[test]
    fn test_base64_error_converts() {
        let err: Error = base64::engine::general_purpose::STANDARD
            .decode("@@@")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Base64Decode(_)));
        assert!(err.to_string().starts_with("malformed base64"));
    }
}
