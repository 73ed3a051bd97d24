//! Canonical UUID parsing and constant-time wire comparison.
//!
//! The server validates the *configured* UUID's form at startup (version
//! nibble `4`, variant nibble in `{8,9,a,b}`) but never re-validates bytes
//! arriving on the wire — those are only compared.

use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{Error, Result};

/// Parse a canonical `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` UUID and
/// validate that it looks like a v4 UUID (version nibble 4, variant nibble
/// in {8,9,a,b}).
pub fn parse_validated(text: &str) -> Result<[u8; 16]> {
    let uuid = Uuid::parse_str(text).map_err(|e| Error::config(format!("invalid UUID: {e}")))?;
    let bytes = *uuid.as_bytes();

    let version = bytes[6] >> 4;
    let variant = bytes[8] >> 4;
    if version != 4 || !matches!(variant, 0x8..=0xb) {
        return Err(Error::config(format!(
            "UUID {text} is not a valid v4 UUID (version={version}, variant nibble={variant:#x})"
        )));
    }

    Ok(bytes)
}

/// Compare 16 raw wire bytes against the configured UUID in constant time.
///
/// Unlike `parse_validated`, this never inspects version/variant nibbles —
/// the wire bytes are opaque and only equality matters.
pub fn wire_matches(wire: &[u8; 16], configured: &[u8; 16]) -> bool {
    wire.ct_eq(configured).into()
}

/// Render 16 raw bytes as the canonical lowercase hyphenated form.
pub fn format_canonical(bytes: &[u8; 16]) -> String {
    Uuid::from_bytes(*bytes).hyphenated().to_string()
}
