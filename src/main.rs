//! Mudis server binary
//!
//! Serves one cache over a local unix-domain or TCP socket, speaking
//! newline-delimited JSON.
//!
//! # Startup Sequence
//! 1. Initialize the tracing subscriber
//! 2. Load configuration from environment variables
//! 3. Build the cache (loads a snapshot when persistence is enabled and
//!    starts the TTL sweeper)
//! 4. Bind the listener and serve connections
//! 5. On SIGINT/SIGTERM, stop the sweeper and flush a final snapshot

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mudis::cache::Cache;
use mudis::config::Config;
use mudis::server;

#[tokio::main]
async fn main() {
    // Defaults to "info", overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mudis=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Mudis");

    let config = Config::from_env();
    info!(
        shards = config.shard_count,
        max_bytes = config.max_bytes,
        hard_limit = config.hard_memory_limit,
        persistence = config.persistence.enabled,
        "configuration loaded"
    );

    let server_config = config.server.clone();
    let socket_path = server_config.socket_path.clone();
    let cache = match Cache::new(config) {
        Ok(cache) => cache,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = server::serve(cache.clone(), server_config) => {
            if let Err(e) = result {
                error!(error = %e, "server failed");
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    cache.shutdown();
    if cfg!(unix) {
        let _ = std::fs::remove_file(&socket_path);
    }
    info!("shutdown complete");
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
