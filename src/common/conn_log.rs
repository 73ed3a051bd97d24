//! Per-connection correlation tag used to tie together every log line a
//! single relayed connection emits.

use std::fmt;
use std::net::SocketAddr;

use rand::Rng;
use tracing::Span;

/// Short random nonce so two connections from the same peer:port (e.g. a
/// client reconnecting quickly) don't interleave in the logs.
fn nonce() -> u32 {
    rand::thread_rng().gen()
}

/// Identifies one relayed connection across its lifetime: who dialed in,
/// what transport carried the VLESS header, and a nonce to disambiguate
/// repeat connections from the same peer.
#[derive(Clone, Copy)]
pub struct ConnTag {
    pub peer: SocketAddr,
    pub transport: &'static str,
    pub nonce: u32,
}

impl ConnTag {
    pub fn new(peer: SocketAddr, transport: &'static str) -> Self {
        Self {
            peer,
            transport,
            nonce: nonce(),
        }
    }

    /// Open a tracing span carrying this tag's fields. Every event emitted
    /// while the span is entered picks them up automatically.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "conn",
            peer = %self.peer,
            transport = self.transport,
            nonce = format_args!("{:08x}", self.nonce),
        )
    }
}

impl fmt::Display for ConnTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{:08x}", self.peer, self.transport, self.nonce)
    }
}
