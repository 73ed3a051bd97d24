//! End-to-end scenarios exercising the relay over a real WebSocket
//! connection, a real loopback TCP upstream, and (for the DNS-over-HTTPS
//! path) a real local mock DoH server wired through `ServerConfig`'s
//! `doh_endpoint` override.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use vless_ws_relay::hub::{self, AppState};
use vless_ws_relay::ServerConfig;

const UUID: [u8; 16] = [
    0xe5, 0x18, 0x53, 0x05, 0x19, 0x84, 0x40, 0x84, 0x81, 0xe0, 0xf7, 0x72, 0x71, 0x15, 0x9c, 0x62,
];

fn vless_header(uuid: [u8; 16], command: u8, atyp: u8, addr: &[u8], port: u16) -> Vec<u8> {
    let mut req = vec![0x00];
    req.extend_from_slice(&uuid);
    req.push(0x00); // addon length
    req.push(command);
    req.extend_from_slice(&port.to_be_bytes());
    req.push(atyp);
    req.extend_from_slice(addr);
    req
}

async fn start_relay(fallback_upstream: Option<String>, doh_endpoint: Option<String>) -> SocketAddr {
    let config = Arc::new(ServerConfig {
        user_uuid: UUID,
        fallback_upstream,
        credit: None,
        port: 0,
        doh_endpoint,
    });
    let state = AppState::new(config);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = hub::create_router(state);
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

async fn connect(
    addr: SocketAddr,
) -> tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
> {
    let url = format!("ws://{addr}/");
    let (ws, _response) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        loop {
            let n = match sock.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            if sock.write_all(&buf[..n]).await.is_err() {
                break;
            }
        }
    });
    addr
}

fn ipv4_octets(addr: SocketAddr) -> [u8; 4] {
    match addr.ip() {
        std::net::IpAddr::V4(v4) => v4.octets(),
        std::net::IpAddr::V6(_) => panic!("expected an IPv4 loopback address"),
    }
}

/// A DoH server that echoes whatever DNS-message body it's POSTed — enough
/// to prove the relay's UDP branch frames, dispatches, and reframes a real
/// reply rather than re-testing `DoHResolver` in isolation.
async fn spawn_mock_doh_server() -> String {
    use axum::body::Bytes;
    use axum::routing::post;

    async fn handler(body: Bytes) -> Vec<u8> {
        body.to_vec()
    }

    let app = axum::Router::new().route("/dns-query", post(handler));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/dns-query")
}

fn encode_datagram(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + payload.len());
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// S1 — TCP IPv4 happy path: dial the upstream, echo the payload, expect
/// the one-shot `00 00` response header prefixed to the first reply.
#[tokio::test]
async fn s1_tcp_ipv4_happy_path() {
    let upstream = spawn_echo_server().await;
    let relay = start_relay(None, None).await;
    let mut ws = connect(relay).await;

    let mut req = vless_header(UUID, 0x01, 0x01, &ipv4_octets(upstream), upstream.port());
    req.extend_from_slice(b"HI");
    ws.send(Message::Binary(req)).await.unwrap();

    match ws.next().await.unwrap().unwrap() {
        Message::Binary(bytes) => {
            assert_eq!(&bytes[..2], &[0x00, 0x00]);
            assert_eq!(&bytes[2..], b"HI");
        }
        other => panic!("expected a binary reply, got {other:?}"),
    }
}

/// S2 — Auth failure: UUID bytes all zero. The WebSocket closes with
/// AuthError's code (1008) and no upstream dial occurs.
#[tokio::test]
async fn s2_auth_failure_closes_with_1008() {
    let relay = start_relay(None, None).await;
    let mut ws = connect(relay).await;

    let req = vless_header([0u8; 16], 0x01, 0x01, &[1, 2, 3, 4], 443);
    ws.send(Message::Binary(req)).await.unwrap();

    match ws.next().await.unwrap().unwrap() {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1008),
        other => panic!("expected a close frame with code 1008, got {other:?}"),
    }
}

/// S3 — Domain address: dial `localhost:port`, forward the payload,
/// confirm the reply carries the same one-shot response header.
#[tokio::test]
async fn s3_domain_address_dials_by_hostname() {
    let upstream = spawn_echo_server().await;
    let relay = start_relay(None, None).await;
    let mut ws = connect(relay).await;

    let domain = b"localhost";
    let mut addr_bytes = vec![domain.len() as u8];
    addr_bytes.extend_from_slice(domain);

    let mut req = vless_header(UUID, 0x01, 0x02, &addr_bytes, upstream.port());
    req.extend_from_slice(b"GET / HTTP/1.0\r\n\r\n");
    ws.send(Message::Binary(req)).await.unwrap();

    match ws.next().await.unwrap().unwrap() {
        Message::Binary(bytes) => {
            assert_eq!(&bytes[..2], &[0x00, 0x00]);
            assert_eq!(&bytes[2..], b"GET / HTTP/1.0\r\n\r\n");
        }
        other => panic!("expected a binary reply, got {other:?}"),
    }
}

/// S4 — UDP DNS: a 28-byte DNS query framed as one datagram arrives on
/// port 53. Expected: the relay POSTs the raw query to the configured DoH
/// endpoint and the reply comes back as `00 00 | [len] | reply`.
#[tokio::test]
async fn s4_udp_dns_round_trips_through_doh() {
    let doh_endpoint = spawn_mock_doh_server().await;
    let relay = start_relay(None, Some(doh_endpoint)).await;
    let mut ws = connect(relay).await;

    let query = b"fake-28-byte-dns-query-bytes"; // mock server echoes it verbatim
    let domain = b"dns.local";
    let mut addr_bytes = vec![domain.len() as u8];
    addr_bytes.extend_from_slice(domain);

    let mut req = vless_header(UUID, 0x02, 0x02, &addr_bytes, 53);
    req.extend_from_slice(&encode_datagram(query));
    ws.send(Message::Binary(req)).await.unwrap();

    match ws.next().await.unwrap().unwrap() {
        Message::Binary(bytes) => {
            assert_eq!(&bytes[..2], &[0x00, 0x00]);
            let reply_len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
            assert_eq!(reply_len, query.len());
            assert_eq!(&bytes[4..4 + reply_len], &query[..]);
        }
        other => panic!("expected a binary reply, got {other:?}"),
    }
}

/// S5 — UDP rejected on non-53: a UDP command on port 443 is a protocol
/// error, closed before any DoH call is attempted.
#[tokio::test]
async fn s5_udp_rejected_on_non_53_closes_with_1002() {
    let relay = start_relay(None, None).await;
    let mut ws = connect(relay).await;

    let req = vless_header(UUID, 0x02, 0x01, &[1, 2, 3, 4], 443);
    ws.send(Message::Binary(req)).await.unwrap();

    match ws.next().await.unwrap().unwrap() {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1002),
        other => panic!("expected a close frame with code 1002, got {other:?}"),
    }
}

/// S6 — Fallback retry: the first dial connects then closes without ever
/// sending a byte back; the relay retries once against `PROXYIP` on the
/// same port and the single response header is not re-sent.
#[tokio::test]
async fn s6_fallback_retry_on_silent_first_upstream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // First connection (the primary dial): accept and drop immediately,
        // so the client never sees a byte from it.
        let (first, _) = listener.accept().await.unwrap();
        drop(first);

        // Second connection (the fallback retry, dialing the same
        // host:port since PROXYIP is configured as 127.0.0.1 here): echo.
        let (mut second, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        loop {
            let n = match second.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            if second.write_all(&buf[..n]).await.is_err() {
                break;
            }
        }
    });

    let relay = start_relay(Some("127.0.0.1".to_string()), None).await;
    let mut ws = connect(relay).await;

    let mut req = vless_header(UUID, 0x01, 0x01, &ipv4_octets(addr), addr.port());
    req.extend_from_slice(b"RETRY");
    ws.send(Message::Binary(req)).await.unwrap();

    match ws.next().await.unwrap().unwrap() {
        Message::Binary(bytes) => {
            assert_eq!(&bytes[..2], &[0x00, 0x00]);
            assert_eq!(&bytes[2..], b"RETRY");
        }
        other => panic!("expected a binary reply, got {other:?}"),
    }
}

/// The landing page and `/status` boundary endpoints stay reachable
/// alongside the WS gate (§6 non-core surface).
#[tokio::test]
async fn landing_and_status_pages_respond() {
    let relay = start_relay(None, None).await;

    let body = reqwest::get(format!("http://{relay}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("It works"));

    let status_body = reqwest::get(format!("http://{relay}/status"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let status: serde_json::Value = serde_json::from_str(&status_body).unwrap();
    assert_eq!(status["status"], "ok");
    assert_eq!(status["uuid"], "e5185305-1984-4084-81e0-f77271159c62");
}
