//! ICY/Icecast-compatible audio streaming relay — process entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use icy_core::{log_info, log_warn, logging, Config, PagePool, ServerState};
use tokio::net::TcpListener;
use tokio::signal;

/// Command-line arguments for the relay server.
#[derive(Parser, Debug)]
#[command(name = "icy-relay-server", about = "ICY/Icecast-compatible audio streaming relay")]
struct Cli {
    /// Path to a TOML configuration file. Falls back to an in-process default configuration
    /// (one demo mount, conservative limits) if omitted or unreadable.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();
    log_info!("starting icy relay server");

    let config = Config::load_or_default(cli.config.as_deref());
    let pool = Arc::new(PagePool::new());
    let state = Arc::new(ServerState::new(&config, pool)?);

    let addr = format!("{}:{}", config.host, config.socket.port);
    let listener = TcpListener::bind(&addr).await?;
    log_info!(addr = %addr, mounts = ?state.mount_names(), "listening");

    let accept_state = state.clone();
    let accept_handle = tokio::spawn(async move {
        loop {
            if !accept_state.is_running() {
                break;
            }
            match listener.accept().await {
                Ok((socket, peer)) => {
                    let state = accept_state.clone();
                    tokio::spawn(async move {
                        icy_server::dispatch::dispatch(socket, peer, state).await;
                    });
                }
                Err(err) => {
                    log_warn!(error = %err, "accept failed");
                }
            }
        }
    });

    signal::ctrl_c().await?;
    log_warn!("received shutdown signal, draining in-flight sessions");
    state.shutdown();
    accept_handle.abort();

    log_info!("shutdown complete");
    Ok(())
}
