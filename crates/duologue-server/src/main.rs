//! `duologued`: the duologue conversation server binary.

use anyhow::Context;
use clap::Parser;
use tracing::info;

use duologue_server::config::ServerConfig;
use duologue_server::{DuologueServer, metrics};
use duologue_store::{ChatStore, ConnectionConfig};

#[derive(Parser, Debug)]
#[command(name = "duologued", about = "Couple conversation session server")]
struct Args {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind.
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database path.
    #[arg(long)]
    db: Option<String>,

    /// Log level (overridden by RUST_LOG).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    duologue_core::logging::init_subscriber(&args.log_level);

    let mut config = ServerConfig::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(db) = args.db {
        config.db_path = db;
    }

    let metrics_handle = metrics::install_recorder()?;

    let store = ChatStore::open(&config.db_path, &ConnectionConfig::default())
        .with_context(|| format!("opening database at {}", config.db_path))?;
    info!(db_path = %config.db_path, "database ready");

    let addr = format!("{}:{}", config.host, config.port);
    let server = DuologueServer::new(config, store, metrics_handle);
    let shutdown = server.shutdown();
    let router = server.router();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            // Unblocks every connection's read loop; axum then waits for
            // the handlers to finish.
            shutdown.shutdown();
        })
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}
