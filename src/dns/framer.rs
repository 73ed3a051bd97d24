//! Length-prefixed datagram framing for the DNS-over-HTTPS sub-channel.
//!
//! Each datagram on the wire is a 2-byte big-endian length followed by
//! that many payload bytes. Multiple datagrams may be packed into one
//! WebSocket frame; a datagram never spans two frames (client promise),
//! so the decoder does not need to be re-entrant across frame boundaries.

use bytes::{BufMut, BytesMut};

use crate::common::net::peek_u16_be;
use crate::{Error, Result};

/// Decode every complete `[len][payload]` record out of `buf`. Returns an
/// error if a declared length would run past the end of the buffer —
/// datagrams must not span frames, so a short buffer here is a protocol
/// violation rather than a "need more" condition — and rejects `len == 0`
/// as a framing error rather than forwarding an empty datagram.
pub fn decode_datagrams(buf: &[u8]) -> Result<Vec<&[u8]>> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < buf.len() {
        let len = peek_u16_be(buf, offset)
            .ok_or_else(|| Error::protocol("truncated datagram length prefix"))?
            as usize;
        if len == 0 {
            return Err(Error::protocol("zero-length datagram"));
        }
        let start = offset + 2;
        let end = start + len;
        if end > buf.len() {
            return Err(Error::protocol("datagram length prefix exceeds frame"));
        }
        out.push(&buf[start..end]);
        offset = end;
    }
    Ok(out)
}

/// Encode one payload as a `[len][payload]` record appended to `out`.
pub fn encode_datagram(out: &mut BytesMut, payload: &[u8]) {
    out.put_u16(payload.len() as u16);
    out.put_slice(payload);
}
