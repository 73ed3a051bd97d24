//! Gate that fires the relay on any WebSocket upgrade request, regardless
//! of path — §6's "any request with `Upgrade: websocket` triggers the
//! Relay" requirement, applied as a `middleware::from_fn` layer so it runs
//! before normal route matching.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::common::conn_log::ConnTag;
use crate::relay;
use crate::vless::decode_early_data;

use super::AppState;

pub async fn ws_gate(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let is_websocket = req
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_websocket {
        return next.run(req).await;
    }

    let early_data_header = req
        .headers()
        .get("sec-websocket-protocol")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));

    let (mut parts, _body) = req.into_parts();
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let early_data = match decode_early_data(early_data_header.as_deref()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "rejecting WebSocket upgrade: invalid early data");
            return (StatusCode::BAD_REQUEST, "invalid early data").into_response();
        }
    };

    let config = state.config.clone();
    let tag = ConnTag::new(peer, "ws");

    upgrade.on_upgrade(move |socket| relay::handle_connection(socket, early_data, config, tag))
}
