//! PipeCast Relay Server
//!
//! Accepts browser media chunks over WebSocket and pipes them into one
//! encoder subprocess per connection, which publishes to an RTMP ingest.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use pipecast_relay::encoder::FfmpegTranscoder;
use pipecast_relay::registry::SessionRegistry;
use pipecast_relay::server::{AppState, build_router};

#[derive(Parser, Debug)]
#[command(name = "pipecast-relay")]
#[command(version, about = "PipeCast relay - browser media to RTMP via an encoder subprocess")]
struct Args {
    /// JSON config file (defaults to the global config path if present).
    #[arg(long, env = "PIPECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Bind host. Overrides the config file.
    #[arg(long)]
    host: Option<String>,

    /// Listen port. Overrides the config file and `PORT`.
    #[arg(long)]
    port: Option<u16>,

    /// Path to the encoder binary. Overrides the config file.
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Log level filter for the relay (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "PIPECAST_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "PIPECAST_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    pipecast_core::tracing_init::init_tracing(env!("CARGO_PKG_NAME"), &args.log_level, args.log_json)?;

    let mut config = pipecast_core::config::load_config(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ffmpeg) = args.ffmpeg {
        config.encoder.program = ffmpeg;
    }
    config.validate()?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {e}"))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        %addr,
        encoder = %config.encoder.program.display(),
        socket_path = %config.server.socket_path,
        startup_timeout_secs = config.session.startup_timeout_secs,
        max_pending_bytes = config.session.max_pending_bytes,
        "Starting pipecast-relay"
    );

    let transcoder = Arc::new(FfmpegTranscoder::new(config.encoder.clone()));
    let registry = SessionRegistry::new(transcoder, config.session.clone());
    let app = build_router(
        AppState {
            registry: registry.clone(),
        },
        &config.server.socket_path,
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Streaming relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await?;

    let killed = registry.shutdown_all().await;
    info!(sessions = killed, "Relay stopped");
    Ok(())
}
