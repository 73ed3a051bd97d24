//! DNS-over-HTTPS emulation for the VLESS UDP/53 sub-protocol.

pub mod doh;
pub mod framer;

pub use doh::DoHResolver;
