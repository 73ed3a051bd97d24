//! Opens TCP connections to the endpoint parsed out of a VLESS request,
//! with an optional fallback retry.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::vless::Endpoint;
use crate::{Error, Result};

const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Dials the parsed endpoint, and on request, the configured fallback.
pub struct TCPDialer;

impl TCPDialer {
    /// Resolve + connect to `endpoint`. Domains are resolved by the OS
    /// resolver via `TcpStream::connect`'s `ToSocketAddrs` machinery.
    pub async fn dial(endpoint: &Endpoint) -> Result<TcpStream> {
        let dial_string = endpoint.to_dial_string();
        let stream = timeout(DIAL_TIMEOUT, TcpStream::connect(&dial_string))
            .await
            .map_err(|_| Error::timeout(format!("dial to {dial_string} timed out")))?
            .map_err(|e| Error::upstream(format!("dial to {dial_string} failed: {e}")))?;
        stream.set_nodelay(true).ok();
        debug!(target = %dial_string, "dialed upstream TCP");
        Ok(stream)
    }

    /// Dial the fallback host on the same port the client originally asked
    /// for. Used only after a first connection that closed without ever
    /// sending a byte back to the client.
    pub async fn dial_fallback(fallback_host: &str, port: u16) -> Result<TcpStream> {
        let dial_string = format!("{fallback_host}:{port}");
        let stream = timeout(DIAL_TIMEOUT, TcpStream::connect(&dial_string))
            .await
            .map_err(|_| Error::timeout(format!("fallback dial to {dial_string} timed out")))?
            .map_err(|e| Error::upstream(format!("fallback dial to {dial_string} failed: {e}")))?;
        stream.set_nodelay(true).ok();
        debug!(target = %dial_string, "dialed fallback upstream TCP");
        Ok(stream)
    }
}
