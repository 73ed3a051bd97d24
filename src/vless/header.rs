//! Re-entrant VLESS request header parser.
//!
//! Unlike a stream-based reader (`AsyncRead::read_exact`), this parser
//! never blocks waiting for bytes: it inspects whatever has accumulated in
//! a caller-owned buffer and reports either a complete parse or "need more
//! bytes", so the relay can keep feeding it WebSocket message fragments as
//! they arrive.
//!
//! Layout (big-endian where numeric), mirrors the wire format byte for
//! byte:
//!
//! ```text
//! offset  size        field
//! 0       1           version
//! 1       16          client UUID
//! 17      1           addon length K
//! 18      K           addons (ignored)
//! 18+K    1           command: 1=TCP, 2=UDP
//! 19+K    2           port (big-endian u16)
//! 21+K    1           address type: 1=IPv4, 2=domain, 3=IPv6
//! 22+K    variable    address bytes
//! ```

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::common::uuid_codec;
use crate::{Error, Result};

const MIN_HEADER_LEN: usize = 24;

const CMD_TCP: u8 = 0x01;
const CMD_UDP: u8 = 0x02;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x02;
const ATYP_IPV6: u8 = 0x03;

/// The requested protocol for the upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VlessCommand {
    Tcp,
    Udp,
}

/// A parsed upstream target: an address plus a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Ipv4 { addr: Ipv4Addr, port: u16 },
    Ipv6 { addr: Ipv6Addr, port: u16 },
    Domain { host: String, port: u16 },
}

impl Endpoint {
    pub fn port(&self) -> u16 {
        match self {
            Endpoint::Ipv4 { port, .. } => *port,
            Endpoint::Ipv6 { port, .. } => *port,
            Endpoint::Domain { port, .. } => *port,
        }
    }

    /// A `host:port` string suitable for `tokio::net::lookup_host`/`TcpStream::connect`.
    pub fn to_dial_string(&self) -> String {
        match self {
            Endpoint::Ipv4 { addr, port } => format!("{addr}:{port}"),
            Endpoint::Ipv6 { addr, port } => format!("[{addr}]:{port}"),
            Endpoint::Domain { host, port } => format!("{host}:{port}"),
        }
    }
}

/// A fully parsed VLESS request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlessRequest {
    pub version: u8,
    pub command: VlessCommand,
    pub endpoint: Endpoint,
    /// Offset into the buffer that was parsed, immediately past the last
    /// header byte. Bytes from this offset onward are application payload.
    pub payload_offset: usize,
}

/// Result of one parse attempt.
pub enum ParseOutcome {
    /// Not enough bytes yet; re-invoke after more have arrived.
    NeedMore,
    Parsed(VlessRequest),
}

/// Holds the configured UUID and exposes the re-entrant parse entry point.
pub struct HeaderParser {
    user_uuid: [u8; 16],
}

impl HeaderParser {
    pub fn new(user_uuid: [u8; 16]) -> Self {
        Self { user_uuid }
    }

    /// Attempt to parse a VLESS request header out of `buf`. Never consumes
    /// `buf` itself — callers advance their own cursor using
    /// `VlessRequest::payload_offset` once `Parsed` is returned.
    pub fn parse(&self, buf: &[u8]) -> Result<ParseOutcome> {
        if buf.len() < MIN_HEADER_LEN {
            return Ok(ParseOutcome::NeedMore);
        }

        let version = buf[0];

        let mut wire_uuid = [0u8; 16];
        wire_uuid.copy_from_slice(&buf[1..17]);
        if !uuid_codec::wire_matches(&wire_uuid, &self.user_uuid) {
            return Err(Error::auth("VLESS UUID does not match configured user"));
        }

        let addon_len = buf[17] as usize;
        let addons_end = 18 + addon_len;
        // +1 cmd +2 port +1 atyp = 4 more bytes needed past the addons.
        if buf.len() < addons_end + 4 {
            return Ok(ParseOutcome::NeedMore);
        }

        let command = match buf[addons_end] {
            CMD_TCP => VlessCommand::Tcp,
            CMD_UDP => VlessCommand::Udp,
            other => {
                return Err(Error::protocol(format!(
                    "unsupported VLESS command byte {other:#04x}"
                )))
            }
        };

        let port = u16::from_be_bytes([buf[addons_end + 1], buf[addons_end + 2]]);
        let atyp = buf[addons_end + 3];
        let addr_start = addons_end + 4;

        let (endpoint, payload_offset) = match atyp {
            ATYP_IPV4 => {
                if buf.len() < addr_start + 4 {
                    return Ok(ParseOutcome::NeedMore);
                }
                let mut octets = [0u8; 4];
                octets.copy_from_slice(&buf[addr_start..addr_start + 4]);
                (
                    Endpoint::Ipv4 {
                        addr: Ipv4Addr::from(octets),
                        port,
                    },
                    addr_start + 4,
                )
            }
            ATYP_IPV6 => {
                if buf.len() < addr_start + 16 {
                    return Ok(ParseOutcome::NeedMore);
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[addr_start..addr_start + 16]);
                (
                    Endpoint::Ipv6 {
                        addr: Ipv6Addr::from(octets),
                        port,
                    },
                    addr_start + 16,
                )
            }
            ATYP_DOMAIN => {
                if buf.len() < addr_start + 1 {
                    return Ok(ParseOutcome::NeedMore);
                }
                let domain_len = buf[addr_start] as usize;
                if domain_len == 0 {
                    return Err(Error::protocol("empty domain address"));
                }
                let domain_start = addr_start + 1;
                if buf.len() < domain_start + domain_len {
                    return Ok(ParseOutcome::NeedMore);
                }
                let host = String::from_utf8(buf[domain_start..domain_start + domain_len].to_vec())
                    .map_err(|_| Error::protocol("domain address is not valid UTF-8"))?;
                (Endpoint::Domain { host, port }, domain_start + domain_len)
            }
            other => {
                return Err(Error::protocol(format!(
                    "unknown VLESS address type {other:#04x}"
                )))
            }
        };

        if command == VlessCommand::Udp && port != 53 {
            return Err(Error::protocol(format!(
                "UDP command only permitted on port 53, got {port}"
            )));
        }

        Ok(ParseOutcome::Parsed(VlessRequest {
            version,
            command,
            endpoint,
            payload_offset,
        }))
    }
}
