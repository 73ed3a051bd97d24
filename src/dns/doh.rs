//! DNS-over-HTTPS client (RFC 8484) for the UDP/53 sub-protocol.
//!
//! One POST per decoded datagram. Transport and 4xx/5xx failures are
//! logged and the datagram dropped — they are not fatal to the
//! connection, matching the rest of the DNS path (clients retry over
//! their own transaction id).

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::Result;

const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";
const DEFAULT_DOH_ENDPOINT: &str = "https://1.1.1.1/dns-query";
const MAX_IN_FLIGHT: usize = 8;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends DNS wire-format queries to a DoH endpoint and returns wire-format
/// replies. Bounded to `MAX_IN_FLIGHT` concurrent requests per resolver
/// instance — callers construct one resolver per connection.
pub struct DoHResolver {
    client: Client,
    endpoint: String,
    permits: Arc<Semaphore>,
}

impl DoHResolver {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_DOH_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            permits: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
        })
    }

    /// Resolve one DNS wire-format query. Returns `None` if the request
    /// failed transport-wise or the upstream returned a non-2xx status —
    /// in both cases the caller should simply drop the datagram.
    pub async fn resolve(&self, query: &[u8]) -> Option<Vec<u8>> {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return None,
        };

        let response = match self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
            .header(reqwest::header::ACCEPT, DNS_MESSAGE_CONTENT_TYPE)
            .body(query.to_vec())
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, endpoint = %self.endpoint, "DoH request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), endpoint = %self.endpoint, "DoH endpoint returned non-success status");
            return None;
        }

        match response.bytes().await {
            Ok(body) => Some(body.to_vec()),
            Err(e) => {
                warn!(error = %e, "failed to read DoH response body");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructs_with_default_endpoint() {
        let resolver = DoHResolver::new().unwrap();
        assert_eq!(resolver.endpoint, DEFAULT_DOH_ENDPOINT);
    }

    #[test]
    fn test_constructs_with_custom_endpoint() {
        let resolver = DoHResolver::with_endpoint("https://dns.google/dns-query").unwrap();
        assert_eq!(resolver.endpoint, "https://dns.google/dns-query");
    }

    #[tokio::test]
    async fn test_semaphore_starts_at_max_in_flight() {
        let resolver = DoHResolver::new().unwrap();
        assert_eq!(resolver.permits.available_permits(), MAX_IN_FLIGHT);
    }

    async fn echo_doh_server() -> (String, tokio::task::JoinHandle<()>) {
        use axum::body::Bytes;
        use axum::routing::post;

        async fn handler(body: Bytes) -> Vec<u8> {
            // A real resolver would parse the query and answer it; this
            // mock just reflects the query back, which is enough to prove
            // the POST/Content-Type/body plumbing round-trips intact.
            body.to_vec()
        }

        let app = axum::Router::new().route("/dns-query", post(handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/dns-query"), handle)
    }

    #[tokio::test]
    async fn test_resolve_round_trips_through_mock_doh_server() {
        let (endpoint, server) = echo_doh_server().await;
        let resolver = DoHResolver::with_endpoint(endpoint).unwrap();

        let query = b"\x00\x1cfake-dns-query-bytes";
        let reply = resolver.resolve(query).await.unwrap();
        assert_eq!(reply, query);

        server.abort();
    }

    #[tokio::test]
    async fn test_resolve_returns_none_on_connection_refused() {
        // Nothing is listening on this port.
        let resolver = DoHResolver::with_endpoint("http://127.0.0.1:1").unwrap();
        assert!(resolver.resolve(b"query").await.is_none());
    }
}
