//! Early-data decoding from the `sec-websocket-protocol` header.
//!
//! Clients that want to avoid a round trip before sending the VLESS header
//! stuff it into the WebSocket subprotocol header instead, URL-safe
//! base64-encoded. We decode it back into raw bytes and prepend it to the
//! inbound byte stream as if it had arrived as the first WebSocket message.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::{Error, Result};

/// Decode the `sec-websocket-protocol` header value, if present, into early
/// data bytes. An absent or empty header yields no early data. A malformed
/// value is a fatal connection error — the caller must close the WebSocket
/// before attempting any upstream dial.
pub fn decode_early_data(header_value: Option<&str>) -> Result<Vec<u8>> {
    let Some(value) = header_value else {
        return Ok(Vec::new());
    };
    let value = value.trim();
    if value.is_empty() {
        return Ok(Vec::new());
    }

    // Some clients send RFC-standard base64 characters despite the
    // URL-safe convention; normalize before decoding so either form works.
    let normalized = value.replace('+', "-").replace('/', "_");

    URL_SAFE_NO_PAD
        .decode(normalized.trim_end_matches('='))
        .map_err(|e| Error::protocol(format!("invalid early-data base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_absent_header() {
        assert_eq!(decode_early_data(None).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_empty_header() {
        assert_eq!(decode_early_data(Some("")).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_round_trip() {
        let payload = b"hello vless early data";
        let encoded = URL_SAFE_NO_PAD.encode(payload);
        assert_eq!(decode_early_data(Some(&encoded)).unwrap(), payload);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_early_data(Some("!!!not-base64!!!")).is_err());
    }
}
