//! Opaque pagination cursors.
//!
//! A cursor round-trips to an offset into the relationship list it was
//! derived from. The encoding is versioned so the token stays opaque to
//! clients while remaining forward-evolvable to a sequence-number scheme.

use crate::error::{Result, ServiceError};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

const CURSOR_VERSION: &str = "v1";

/// Encode an offset as an opaque cursor token.
pub fn encode(offset: u64) -> String {
    URL_SAFE_NO_PAD.encode(format!("{CURSOR_VERSION}:{offset}"))
}

/// Decode a cursor back to its offset. The empty string denotes the start
/// of the list.
pub fn decode(cursor: &str) -> Result<u64> {
    if cursor.is_empty() {
        return Ok(0);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| ServiceError::InvalidCursor(cursor.to_string()))?;
    let decoded =
        String::from_utf8(bytes).map_err(|_| ServiceError::InvalidCursor(cursor.to_string()))?;

    let offset = decoded
        .strip_prefix(CURSOR_VERSION)
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|offset| offset.parse::<u64>().ok())
        .ok_or_else(|| ServiceError::InvalidCursor(cursor.to_string()))?;

    Ok(offset)
}
