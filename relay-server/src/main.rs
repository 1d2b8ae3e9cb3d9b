//! sealed-relay binary entry point.
//!
//! Usage:
//! ```bash
//! sealed-relay --config relay.toml
//! RUST_LOG=debug sealed-relay
//! ```

use anyhow::Context;
use clap::Parser;
use relay_server::config::Config;
use relay_server::credentials::CredentialStore;
use relay_server::server::SealedRelay;
use relay_server::source::HttpDataSource;
use relay_server::{cleanup, http, protocol};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sealed-relay")]
#[command(about = "Authenticated encrypted WebSocket relay", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::load_or_default(&args.config)?;
    http::health::init_start_time();

    let store_config = config.store.clone();
    let store = tokio::task::spawn_blocking(move || CredentialStore::load(&store_config))
        .await
        .context("credential store task failed")?
        .with_context(|| format!("refusing to start: store {}", config.store.path.display()))?;
    tracing::info!(
        "Loaded credential store {} ({} users)",
        store.path().display(),
        store.user_count().await
    );

    let source = HttpDataSource::new(&config.source).context("building HTTP client")?;
    let relay = Arc::new(SealedRelay::new(config, store, Arc::new(source)));

    let listener = TcpListener::bind(&relay.config().server.bind_address)
        .await
        .with_context(|| format!("binding {}", relay.config().server.bind_address))?;

    let cleanup = cleanup::spawn_cleanup_task(relay.clone(), relay.config().cleanup.clone());

    let http_task = if relay.config().http.enabled {
        let http_listener = TcpListener::bind(&relay.config().http.bind_address)
            .await
            .with_context(|| format!("binding {}", relay.config().http.bind_address))?;
        let relay = relay.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = http::serve(relay, http_listener).await {
                tracing::error!("HTTP server error: {}", e);
            }
        }))
    } else {
        None
    };

    tokio::select! {
        result = protocol::serve(relay.clone(), listener) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    cleanup.abort();
    if let Some(task) = http_task {
        task.abort();
    }

    Ok(())
}
