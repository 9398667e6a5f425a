//! Data-URL request bodies: `<mime-prefix>,<base64>`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("request body is empty")]
    Empty,
    #[error("request body is not valid UTF-8")]
    NotUtf8,
    #[error("request body could not be read: {0}")]
    Unreadable(String),
    #[error("expected `<mime-prefix>,<base64>`")]
    MissingSeparator,
    #[error("base64 decode failed: {0}")]
    Base64(String),
}

/// Decode the base64 part of a data URL. Whitespace inside the encoded part
/// (line-wrapped uploads) is ignored.
pub fn decode_data_url(body: &[u8]) -> Result<Vec<u8>, PayloadError> {
    let body = std::str::from_utf8(body)
        .map_err(|_| PayloadError::NotUtf8)?
        .trim();
    if body.is_empty() {
        return Err(PayloadError::Empty);
    }
    let (_, encoded) = body.split_once(',').ok_or(PayloadError::MissingSeparator)?;
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(PayloadError::Empty);
    }
    STANDARD
        .decode(compact)
        .map_err(|e| PayloadError::Base64(e.to_string()))
}
