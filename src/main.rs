//! vless-ws-relay — CLI entry point.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vless_ws_relay::hub::{self, AppState};
use vless_ws_relay::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "vless-ws-relay")]
#[command(author = "Tsang")]
#[command(version)]
#[command(about = "VLESS-over-WebSocket relay server")]
struct Args {
    /// Path to config.json
    #[arg(short = 'c', long = "config", default_value = "config.json")]
    config: PathBuf,

    /// Listen port (overrides config.json and the PORT env var)
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().max(2))
        .max_blocking_threads(32)
        .enable_all()
        .event_interval(61)
        .global_queue_interval(31)
        .thread_name("vless-relay-worker")
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vless_ws_relay=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let server_config = match ServerConfig::load(&args.config, args.port).await {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to build server configuration");
            std::process::exit(1);
        }
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], server_config.port));
    info!(port = server_config.port, "vless-ws-relay starting");

    let state = AppState::new(Arc::new(server_config));
    if let Err(e) = hub::start_server(state, addr).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }

    Ok(())
}
