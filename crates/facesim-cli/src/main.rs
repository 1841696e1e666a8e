use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facesim_core::{
    BoundingBox, DistanceMetric, FaceVerifier, ModelName, OnnxVerifier, VerifyRequest,
};
use serde::Serialize;
use std::path::PathBuf;

/// Threshold applied when `--threshold` is not given.
const DEFAULT_THRESHOLD: f64 = 0.35;

#[derive(Parser)]
#[command(name = "facesim", about = "facesim face verification CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the faces in two image files
    Verify {
        img1: PathBuf,
        img2: PathBuf,
        /// Recognition model (see `facesim models`)
        #[arg(short, long, default_value_t = ModelName::default(), value_parser = parse_model)]
        model: ModelName,
        /// cosine, euclidean or euclidean_l2
        #[arg(long, default_value_t = DistanceMetric::Cosine)]
        metric: DistanceMetric,
        /// Distances strictly below this verify
        #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,
        /// Embed the whole image when no face is found instead of failing
        #[arg(long)]
        no_enforce_detection: bool,
        /// ONNX model directory
        #[arg(long, env = "FACESIM_MODEL_DIR")]
        model_dir: Option<PathBuf>,
    },
    /// List supported recognition models
    Models,
}

#[derive(Serialize)]
struct VerifyReport {
    model: ModelName,
    metric: DistanceMetric,
    distance: f64,
    threshold: f64,
    verified: bool,
    facial_areas: [Option<BoundingBox>; 2],
}

fn parse_model(s: &str) -> Result<ModelName, String> {
    s.parse().map_err(|e: facesim_core::UnsupportedModel| e.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            img1,
            img2,
            model,
            metric,
            threshold,
            no_enforce_detection,
            model_dir,
        } => {
            let model_dir = model_dir.unwrap_or_else(facesim_core::default_model_dir);
            tracing::debug!(model_dir = %model_dir.display(), %model, %metric, "verifying image pair");
            let mut verifier = OnnxVerifier::new(&model_dir)
                .with_context(|| format!("failed to load models from {}", model_dir.display()))?;

            let request = VerifyRequest {
                img1_path: img1,
                img2_path: img2,
                model,
                metric,
                enforce_detection: !no_enforce_detection,
            };
            let output = verifier.verify(&request)?;
            tracing::info!(model = %output.model, distance = output.distance, "verification complete");

            let report = VerifyReport {
                model: output.model,
                metric: output.metric,
                distance: output.distance,
                threshold,
                verified: output.distance < threshold,
                facial_areas: output.facial_areas,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Models => {
            for model in ModelName::ALL {
                let marker = if model == ModelName::default() { " (default)" } else { "" };
                println!("{model}{marker}");
            }
        }
    }

    Ok(())
}
