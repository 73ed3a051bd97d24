//! Listen surface: landing pages, the `/status` endpoint, and the
//! WebSocket gate that dispatches into the relay core.

pub mod pages;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::Result;

/// Shared, read-only application state. `ServerConfig` is the only
/// process-wide state and never mutates after startup (§5).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::landing))
        .route("/config", get(pages::config_root))
        .route("/status", get(pages::status))
        .route("/api/status", get(pages::status))
        .route("/:user_uuid", get(pages::config_with_uuid))
        .fallback(pages::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), ws::ws_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<()> {
    let router = create_router(state);
    info!(%addr, "starting listen surface");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
