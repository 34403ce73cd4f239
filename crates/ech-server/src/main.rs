//! Editor Connection Hub binary: binds the hub's WebSocket transport, serves
//! the upgrade endpoint, and drains on shutdown signal.

mod cli;
mod handler;
mod shutdown;
mod ws_transport;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use ech_hub::EditorHub;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            args.log_filter
                .clone()
                .map(EnvFilter::new)
                .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))),
        )
        .init();

    info!(bind = %args.bind, "starting ech-server");

    let hub = EditorHub::new(args.hub_config());

    let app = Router::new()
        .route("/connect", get(handler::connect))
        .with_state(hub.clone());

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!(addr = %listener.local_addr()?, "listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown::wait_for_signal());

    server.await?;

    info!("http server stopped accepting, draining hub");
    hub.close_all();
    tokio::time::sleep(shutdown::SHUTDOWN_GRACE_PERIOD).await;
    info!("shutdown complete");

    Ok(())
}
