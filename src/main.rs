use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use voxrelay::{
    create_router, AppState, Config, RecordingStore, SessionRegistry, TcpSpeechBackend,
};

#[derive(Parser, Debug)]
#[command(name = "voxrelay", about = "Streaming transcription relay service")]
struct Args {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/voxrelay")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v0.1.0", cfg.service.name);
    info!(
        "Speech backend at {}, silence timeout {}s, stream ceiling {}s",
        cfg.speech.backend_addr, cfg.session.silence_secs, cfg.session.max_stream_secs
    );

    let backend = Arc::new(TcpSpeechBackend::new(cfg.speech.backend_addr.clone()));
    let registry = Arc::new(SessionRegistry::new(backend.clone(), cfg.session));
    let store = Arc::new(RecordingStore::new(
        &cfg.storage.recordings_path,
        Duration::from_secs(cfg.storage.access_ttl_secs),
    )?);

    let state = AppState::new(registry, backend, store);
    let router = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .context("HTTP server failed")?;

    Ok(())
}
