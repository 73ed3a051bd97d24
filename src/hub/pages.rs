//! Landing/config pages and the `/status` endpoint.
//!
//! None of this is on the proxy core's data path — it's the boundary
//! surface §6 specifies only loosely (plain `format!` templates, no
//! templating engine needed for three small pages).

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Host, Path, State};
use axum::response::{Html, IntoResponse, Json};
use serde_json::json;

use crate::common::uuid_codec;

use super::AppState;

pub async fn landing() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html><head><title>vless-ws-relay</title></head>
<body><h1>It works.</h1><p>See <a href="/config">/config</a> for client setup.</p></body>
</html>"#,
    )
}

pub async fn config_root(host: Host, state: State<AppState>) -> Html<String> {
    render_config(host, state).await
}

pub async fn config_with_uuid(
    host: Host,
    state: State<AppState>,
    Path(_user_uuid): Path<String>,
) -> Html<String> {
    render_config(host, state).await
}

async fn render_config(Host(host): Host, State(state): State<AppState>) -> Html<String> {
    let uuid = uuid_codec::format_canonical(&state.config.user_uuid);
    let credit = state.config.credit.clone().unwrap_or_default();

    let vless_url = format!(
        "vless://{uuid}@{host}:443?encryption=none&security=tls&sni={host}&fp=chrome&type=ws&host={host}&path=%2F%3Fed%3D2048#{credit}"
    );

    let clash_yaml = clash_snippet(&uuid, &host, &credit);
    let singbox_json = singbox_snippet(&uuid, &host, &credit);

    Html(format!(
        r#"<!DOCTYPE html>
<html><head><title>vless-ws-relay config</title></head>
<body>
<h1>VLESS client config</h1>
<pre>{vless_url}</pre>
<h2>Clash</h2>
<pre>{clash_yaml}</pre>
<h2>Sing-Box</h2>
<pre>{singbox_json}</pre>
</body></html>"#
    ))
}

fn clash_snippet(uuid: &str, host: &str, credit: &str) -> String {
    format!(
        r#"proxies:
  - name: {credit}
    type: vless
    server: {host}
    port: 443
    uuid: {uuid}
    network: ws
    tls: true
    udp: true
    servername: {host}
    ws-opts:
      path: "/?ed=2048"
      headers:
        Host: {host}"#
    )
}

fn singbox_snippet(uuid: &str, host: &str, credit: &str) -> String {
    json!({
        "type": "vless",
        "tag": credit,
        "server": host,
        "server_port": 443,
        "uuid": uuid,
        "tls": { "enabled": true, "server_name": host },
        "transport": { "type": "ws", "path": "/?ed=2048", "headers": { "Host": host } }
    })
    .to_string()
}

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let uuid = uuid_codec::format_canonical(&state.config.user_uuid);
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Json(json!({
        "status": "ok",
        "uuid": uuid,
        "timestamp": timestamp,
    }))
}

pub async fn not_found() -> impl IntoResponse {
    (axum::http::StatusCode::NOT_FOUND, "Not found")
}
