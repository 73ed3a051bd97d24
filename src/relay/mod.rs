//! Per-connection relay state machine: the heart of the proxy.
//!
//! One `handle_connection` call owns one accepted WebSocket end to end —
//! parses the VLESS header out of the inbound byte stream, dials (or
//! frames-and-resolves) the requested upstream, and pipes bytes both ways
//! until either side closes.

pub mod dialer;

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn, Instrument};

use crate::common::conn_log::ConnTag;
use crate::config::ServerConfig;
use crate::dns::{doh::DoHResolver, framer};
use crate::vless::header::{Endpoint, HeaderParser, ParseOutcome, VlessCommand};
use crate::vless::VlessResponse;
use crate::{Error, Result};

use dialer::TCPDialer;

const READ_BUF_SIZE: usize = 16 * 1024;

/// Whether the one-shot VLESS response header still needs to be prefixed
/// to the next batch of upstream-to-client bytes.
enum ResponseHeader {
    Pending,
    Sent,
}

impl ResponseHeader {
    fn prefix_if_pending(&mut self, out: &mut Vec<u8>) {
        if let ResponseHeader::Pending = self {
            out.extend_from_slice(&VlessResponse::bytes());
            *self = ResponseHeader::Sent;
        }
    }
}

/// Accept a WebSocket already upgraded by the hub layer and run it to
/// completion, closing it with a code appropriate to how the connection
/// ended.
pub async fn handle_connection(
    mut ws: WebSocket,
    early_data: Vec<u8>,
    config: Arc<ServerConfig>,
    tag: ConnTag,
) {
    let span = tag.span();
    async move {
        let result = run(&mut ws, early_data, &config).await;
        match result {
            Ok(()) => {
                info!("connection closed normally");
                let _ = ws
                    .send(Message::Close(Some(CloseFrame {
                        code: 1000,
                        reason: "".into(),
                    })))
                    .await;
            }
            Err(e) => {
                warn!(error = %e, "connection closed with error");
                let code = e.close_code();
                let _ = ws
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: e.to_string().into(),
                    })))
                    .await;
            }
        }
    }
    .instrument(span)
    .await
}

async fn run(ws: &mut WebSocket, early_data: Vec<u8>, config: &ServerConfig) -> Result<()> {
    let parser = HeaderParser::new(config.user_uuid);
    let mut buf = BytesMut::from(&early_data[..]);

    let request = loop {
        match parser.parse(&buf)? {
            ParseOutcome::Parsed(request) => break request,
            ParseOutcome::NeedMore => match ws.recv().await {
                Some(Ok(Message::Binary(bytes))) => buf.extend_from_slice(&bytes),
                Some(Ok(Message::Text(_))) => {
                    return Err(Error::protocol("text frame received before VLESS header"))
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(Error::client("WebSocket closed before header was complete"))
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(Error::client(e.to_string())),
            },
        }
    };

    let payload = buf[request.payload_offset..].to_vec();

    match request.command {
        VlessCommand::Tcp => run_tcp(ws, payload, request.endpoint, config).await,
        VlessCommand::Udp => run_dns(ws, payload, config).await,
    }
}

enum TcpPumpOutcome {
    Done,
    RetryFallback,
}

async fn pump_tcp(
    ws: &mut WebSocket,
    stream: &mut TcpStream,
    payload: Vec<u8>,
    response_header: &mut ResponseHeader,
    ever_received: &mut bool,
    allow_fallback: bool,
) -> Result<TcpPumpOutcome> {
    if !payload.is_empty() {
        stream.write_all(&payload).await?;
    }

    let mut buf = [0u8; READ_BUF_SIZE];
    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                let n = result?;
                if n == 0 {
                    if !*ever_received && allow_fallback {
                        return Ok(TcpPumpOutcome::RetryFallback);
                    }
                    return Ok(TcpPumpOutcome::Done);
                }
                let mut out = Vec::with_capacity(n + VlessResponse::LEN);
                response_header.prefix_if_pending(&mut out);
                out.extend_from_slice(&buf[..n]);
                *ever_received = true;
                ws.send(Message::Binary(out)).await.map_err(|e| Error::client(e.to_string()))?;
            }
            msg = ws.recv() => {
                match msg {
                    Some(Ok(Message::Binary(bytes))) => {
                        stream.write_all(&bytes).await?;
                    }
                    Some(Ok(Message::Text(_))) => {
                        return Err(Error::protocol("text frame received mid-stream"));
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(TcpPumpOutcome::Done),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(Error::client(e.to_string())),
                }
            }
        }
    }
}

async fn run_tcp(
    ws: &mut WebSocket,
    initial_payload: Vec<u8>,
    endpoint: Endpoint,
    config: &ServerConfig,
) -> Result<()> {
    let port = endpoint.port();
    let mut stream = TCPDialer::dial(&endpoint).await?;

    let mut response_header = ResponseHeader::Pending;
    let mut ever_received = false;
    let allow_fallback = config.fallback_upstream.is_some();

    let outcome = pump_tcp(
        ws,
        &mut stream,
        initial_payload.clone(),
        &mut response_header,
        &mut ever_received,
        allow_fallback,
    )
    .await?;
    let _ = stream.shutdown().await;

    if let TcpPumpOutcome::RetryFallback = outcome {
        let fallback_host = config
            .fallback_upstream
            .as_ref()
            .expect("allow_fallback implies fallback_upstream is set");
        info!(fallback = %fallback_host, "retrying via fallback upstream");
        let mut fallback_stream = TCPDialer::dial_fallback(fallback_host, port).await?;
        pump_tcp(
            ws,
            &mut fallback_stream,
            initial_payload,
            &mut response_header,
            &mut ever_received,
            false,
        )
        .await?;
        let _ = fallback_stream.shutdown().await;
    }

    Ok(())
}

fn spawn_datagrams(
    payload: &[u8],
    resolver: &Arc<DoHResolver>,
    reply_tx: &mpsc::Sender<Vec<u8>>,
    pending: &mut JoinSet<()>,
) -> Result<()> {
    for datagram in framer::decode_datagrams(payload)? {
        let datagram = datagram.to_vec();
        let resolver = resolver.clone();
        let reply_tx = reply_tx.clone();
        pending.spawn(async move {
            if let Some(reply) = resolver.resolve(&datagram).await {
                let _ = reply_tx.send(reply).await;
            }
        });
    }
    Ok(())
}

async fn run_dns(ws: &mut WebSocket, initial_payload: Vec<u8>, config: &ServerConfig) -> Result<()> {
    let resolver = Arc::new(match &config.doh_endpoint {
        Some(endpoint) => DoHResolver::with_endpoint(endpoint.clone())?,
        None => DoHResolver::new()?,
    });
    let mut response_header = ResponseHeader::Pending;
    let (reply_tx, mut reply_rx) = mpsc::channel::<Vec<u8>>(32);
    let mut pending = JoinSet::new();

    spawn_datagrams(&initial_payload, &resolver, &reply_tx, &mut pending)?;

    loop {
        tokio::select! {
            Some(reply) = reply_rx.recv() => {
                let mut framed = BytesMut::new();
                framer::encode_datagram(&mut framed, &reply);
                let mut out = Vec::with_capacity(framed.len() + VlessResponse::LEN);
                response_header.prefix_if_pending(&mut out);
                out.extend_from_slice(&framed);
                ws.send(Message::Binary(out)).await.map_err(|e| Error::client(e.to_string()))?;
            }
            msg = ws.recv() => {
                match msg {
                    Some(Ok(Message::Binary(bytes))) => {
                        spawn_datagrams(&bytes, &resolver, &reply_tx, &mut pending)?;
                    }
                    Some(Ok(Message::Text(_))) => {
                        return Err(Error::protocol("text frame received mid-stream"));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(Error::client(e.to_string())),
                }
            }
            Some(_) = pending.join_next(), if !pending.is_empty() => {}
        }
    }

    pending.shutdown().await;
    Ok(())
}
