//! s402 facilitator HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in the current directory)
//! cargo run -p s402-facilitator --release
//!
//! # Run with a custom config path
//! CONFIG=/path/to/config.toml cargo run -p s402-facilitator
//!
//! # Configure logging
//! RUST_LOG=info cargo run -p s402-facilitator
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use axum::Router;
use tower_http::cors;
use tracing_subscriber::EnvFilter;

use s402::store::{DiscoveryStore, MemoryStore, ReplayStore};
use s402_facilitator::config::FacilitatorConfig;
use s402_facilitator::handlers::{facilitator_router, AppState};
use s402_facilitator::store::SqliteStore;
use s402_stellar::ledger::LedgerOps;
use s402_stellar::signer::TransactionSigner;
use s402_stellar::{ExactStellarConfig, ExactStellarFacilitator, HttpLedger, LocalKeySigner};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Facilitator failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = FacilitatorConfig::load()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        network = %config.network,
        store = %config.store_path,
        "Loaded configuration"
    );

    // The shared store backs both replay protection and discovery. The
    // in-process fallback loses state on restart, so it needs an explicit
    // opt-in meant for non-production testing.
    let (replay, discovery): (Arc<dyn ReplayStore>, Arc<dyn DiscoveryStore>) =
        match SqliteStore::open(&config.store_path) {
            Ok(store) => {
                let store = Arc::new(store);
                let replay: Arc<dyn ReplayStore> = store.clone();
                let discovery: Arc<dyn DiscoveryStore> = store;
                (replay, discovery)
            }
            Err(e) if config.allow_memory_store => {
                tracing::warn!(
                    error = %e,
                    "store unavailable; using in-memory fallback (NOT for production)"
                );
                let store = Arc::new(MemoryStore::new());
                let replay: Arc<dyn ReplayStore> = store.clone();
                let discovery: Arc<dyn DiscoveryStore> = store;
                (replay, discovery)
            }
            Err(e) => {
                return Err(format!(
                    "replay store {} unavailable ({e}); refusing to start without \
                     persistent replay protection",
                    config.store_path
                )
                .into());
            }
        };

    let ledger = match (&config.horizon_url, &config.soroban_rpc_url) {
        (None, None) => HttpLedger::new(config.network),
        (horizon, soroban) => HttpLedger::with_urls(
            config.network,
            horizon
                .clone()
                .unwrap_or_else(|| config.network.horizon_url().to_owned()),
            soroban
                .clone()
                .unwrap_or_else(|| config.network.soroban_rpc_url().to_owned()),
        ),
    };

    // Startup probe: reachability only, never fatal.
    match ledger.latest_ledger().await {
        Ok(sequence) => {
            tracing::info!(ledger = sequence, "RPC health check passed");
        }
        Err(e) => {
            tracing::warn!(error = %e, "RPC health check failed; continuing anyway");
        }
    }

    let mut engine = ExactStellarFacilitator::new(
        ledger,
        ExactStellarConfig::new(config.network),
        replay,
    );
    if let Some(secret) = &config.signer_secret_key {
        let sponsor = LocalKeySigner::from_secret(secret)?;
        tracing::info!(fee_payer = %sponsor.public_key(), "fee sponsorship enabled");
        engine = engine.with_fee_sponsor(sponsor);
    }

    let state = AppState {
        facilitator: Arc::new(engine),
        discovery,
    };

    let app = Router::new().merge(facilitator_router(state)).layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(cors::Any),
    );

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Facilitator listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Facilitator shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
