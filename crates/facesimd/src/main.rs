use anyhow::{Context, Result};
use clap::Parser;
use facesim_core::OnnxVerifier;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod engine;
mod error;
mod staging;
mod verdict;

#[derive(Parser)]
#[command(name = "facesimd", about = "facesim face verification HTTP daemon")]
struct Args {
    /// Listen address, overrides FACESIM_BIND
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// ONNX model directory, overrides FACESIM_MODEL_DIR
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = config::Config::from_env().context("invalid configuration")?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(model_dir) = args.model_dir {
        config.model_dir = model_dir;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        model_dir = %config.model_dir.display(),
        predict_threshold = config.predict_threshold,
        compare_threshold = config.compare_threshold,
        "facesimd starting"
    );

    let mut verifier = OnnxVerifier::new(&config.model_dir)
        .with_context(|| format!("failed to load detector from {}", config.model_dir.display()))?;
    for model in &config.preload_models {
        verifier
            .preload(*model)
            .with_context(|| format!("failed to preload {model}"))?;
    }

    let engine = engine::spawn_engine(verifier, config.engine_queue)?;
    serve(engine, config).await
}

async fn serve(engine: engine::EngineHandle, config: config::Config) -> Result<()> {
    let bind = config.bind;
    let router = api::build_router(api::AppState::new(engine, config));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(addr = %bind, "facesimd ready");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("facesimd shutting down");
        })
        .await?;

    Ok(())
}
