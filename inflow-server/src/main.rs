//! Inflow upload broker daemon.
//!
//! Accepts browser uploads over websocket connections, stages them in the
//! storage directory, and hands finished files over to the web-app backend.
//!
//! Usage:
//!   inflow-server --listen 0.0.0.0:4000 --storage-dir /var/spool/inflow

use std::sync::Arc;

// ---

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

// ---

use inflow_server::{handle_connection, init_storage_dir, Broker, Config};

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---

    let cfg = Config::parse();

    let no_color = std::env::var("EMACS").is_ok()
        || std::env::var("NO_COLOR").is_ok()
        || std::env::var("CARGO_TERM_COLOR").as_deref() == Ok("never")
        || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    tracing_subscriber::fmt()
        .with_target(false)
        .with_ansi(!no_color)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "inflow-server starting",
    );

    // Any partials left by a previous run belong to dead sessions.
    init_storage_dir(&cfg.storage_dir).await?;

    let listener = TcpListener::bind(cfg.listen).await?;
    info!("upload endpoint listening on {}", cfg.listen);

    let broker = Arc::new(Broker::new(cfg));

    let accept_broker = Arc::clone(&broker);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(Arc::clone(&accept_broker), stream, peer));
                }
                Err(e) => {
                    tracing::warn!("accept failed: {e}");
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    Ok(())
}
