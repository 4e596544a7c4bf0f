//! OnAir Caster (onair-caster) - Main entry point
//!
//! Loads configuration, starts the broadcast engine and serves the stream
//! and admin API until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use onair_caster::api::{self, AppContext, StationInfo};
use onair_caster::BroadcastEngine;
use onair_common::StationConfig;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for onair-caster
///
/// Anything given here overrides the config file.
#[derive(Parser, Debug)]
#[command(name = "onair-caster")]
#[command(about = "Single-program audio broadcast server")]
#[command(version)]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "ONAIR_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "ONAIR_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "ONAIR_BIND_ADDRESS")]
    bind_address: Option<String>,

    /// Filler audio played while the queue is empty
    #[arg(long, env = "ONAIR_FILLER")]
    filler: Option<PathBuf>,

    /// Directory queued files must live in
    #[arg(long, env = "ONAIR_MEDIA_DIR")]
    media_dir: Option<PathBuf>,

    /// Station name sent as icy-name
    #[arg(long, env = "ONAIR_STATION_NAME")]
    station_name: Option<String>,

    /// Keep queued files on disk after they play
    #[arg(long, env = "ONAIR_KEEP_PLAYED_FILES")]
    keep_played_files: bool,
}

impl Args {
    fn apply(&self, config: &mut StationConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind_address) = &self.bind_address {
            config.bind_address = bind_address.clone();
        }
        if let Some(filler) = &self.filler {
            config.filler_path = filler.clone();
        }
        if let Some(media_dir) = &self.media_dir {
            config.media_dir = media_dir.clone();
        }
        if let Some(name) = &self.station_name {
            config.station_name = name.clone();
        }
        if self.keep_played_files {
            config.delete_played_files = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onair_caster=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = StationConfig::resolve(args.config.as_deref(), "ONAIR_CONFIG")
        .context("Failed to load configuration")?;
    args.apply(&mut config);

    info!(
        "Starting {} ({}) on {}:{}",
        config.station_name, config.station_genre, config.bind_address, config.port
    );

    // Invalid settings or a missing filler are fatal
    let engine = Arc::new(
        BroadcastEngine::start(&config)
            .await
            .context("Failed to start broadcast engine")?,
    );

    let ctx = AppContext::new(Arc::clone(&engine), StationInfo::from_config(&config));
    let shutdown = {
        let engine = Arc::clone(&engine);
        async move {
            shutdown_signal().await;
            engine.shutdown().await;
        }
    };

    api::run(&config, ctx, shutdown)
        .await
        .context("HTTP server failed")?;

    engine.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
