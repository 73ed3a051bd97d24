//! vless-ws-relay — a VLESS-over-WebSocket relay.
//!
//! One inbound WebSocket upgrade carries a VLESS request header followed
//! by application bytes; the relay parses the header, dials (or resolves,
//! for the DNS sub-protocol) the requested upstream, and pipes bytes both
//! ways until either side closes.
//!
//! ```text
//!                     +----------------+
//!                     |   hub/ (WS +   |
//!                     |   landing page)|
//!                     +-------+--------+
//!                             |
//!        +--------------------+--------------------+
//!        |                                          |
//! +------v------+                           +-------v-------+
//! |   config/   |                           |    relay/     |
//! +-------------+                           +-------+-------+
//!                                                    |
//!                             +----------------------+----------------------+
//!                             |                                             |
//!                       +-----v-----+                                 +-----v-----+
//!                       |  vless/   |                                 |   dns/    |
//!                       +-----------+                                 +-----------+
//! ```

pub mod common;
pub mod config;
pub mod dns;
pub mod hub;
pub mod relay;
pub mod vless;

pub use common::error::{Error, Result};
pub use config::ServerConfig;
