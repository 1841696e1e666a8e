use facesim_core::ModelName;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_BIND: &str = "127.0.0.1:8000";
const DEFAULT_PREDICT_THRESHOLD: f64 = 0.40;
const DEFAULT_COMPARE_THRESHOLD: f64 = 0.35;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid bind address {value:?}: {source}")]
    Bind {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("cannot read thresholds file {path}: {source}")]
    ThresholdsIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid thresholds file {path}: {reason}")]
    ThresholdsParse { path: PathBuf, reason: String },
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 127.0.0.1:8000).
    pub bind: SocketAddr,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Distance threshold for the fixed-model `/predict` route.
    pub predict_threshold: f64,
    /// Default distance threshold for the `/compare` route.
    pub compare_threshold: f64,
    /// Per-model `/compare` thresholds overriding `compare_threshold`.
    pub model_thresholds: HashMap<ModelName, f64>,
    /// Timeout in seconds for one verification, including queueing.
    pub verify_timeout_secs: u64,
    /// Maximum accepted request body size.
    pub max_upload_bytes: usize,
    /// Pending verifications the engine accepts before callers wait.
    pub engine_queue: usize,
    /// Models to load at startup instead of on first request.
    pub preload_models: Vec<ModelName>,
}

/// `[thresholds]` table of the optional TOML file.
#[derive(Debug, Default, Deserialize)]
struct ThresholdsFile {
    #[serde(default)]
    thresholds: HashMap<String, f64>,
}

impl Config {
    /// Load configuration from `FACESIM_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_raw = std::env::var("FACESIM_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .parse()
            .map_err(|source| ConfigError::Bind { value: bind_raw.clone(), source })?;

        let model_dir = std::env::var("FACESIM_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facesim_core::default_model_dir());

        let model_thresholds = match std::env::var("FACESIM_THRESHOLDS_FILE") {
            Ok(path) => load_thresholds(Path::new(&path))?,
            Err(_) => HashMap::new(),
        };

        let preload_models = std::env::var("FACESIM_PRELOAD_MODELS")
            .map(|v| parse_model_list(&v))
            .unwrap_or_default();

        Ok(Self {
            bind,
            model_dir,
            predict_threshold: env_f64("FACESIM_PREDICT_THRESHOLD", DEFAULT_PREDICT_THRESHOLD),
            compare_threshold: env_f64("FACESIM_COMPARE_THRESHOLD", DEFAULT_COMPARE_THRESHOLD),
            model_thresholds,
            verify_timeout_secs: env_u64("FACESIM_VERIFY_TIMEOUT_SECS", 30),
            max_upload_bytes: env_usize("FACESIM_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            engine_queue: env_usize("FACESIM_ENGINE_QUEUE", 8).max(1),
            preload_models,
        })
    }

    /// Threshold the `/compare` route applies for `model`.
    pub fn compare_threshold_for(&self, model: ModelName) -> f64 {
        self.model_thresholds
            .get(&model)
            .copied()
            .unwrap_or(self.compare_threshold)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            model_dir: facesim_core::default_model_dir(),
            predict_threshold: DEFAULT_PREDICT_THRESHOLD,
            compare_threshold: DEFAULT_COMPARE_THRESHOLD,
            model_thresholds: HashMap::new(),
            verify_timeout_secs: 30,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            engine_queue: 8,
            preload_models: Vec::new(),
        }
    }
}

fn load_thresholds(path: &Path) -> Result<HashMap<ModelName, f64>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ThresholdsIo {
        path: path.to_path_buf(),
        source,
    })?;
    parse_thresholds(&raw).map_err(|reason| ConfigError::ThresholdsParse {
        path: path.to_path_buf(),
        reason,
    })
}

fn parse_thresholds(raw: &str) -> Result<HashMap<ModelName, f64>, String> {
    let file: ThresholdsFile = toml::from_str(raw).map_err(|e| e.to_string())?;
    file.thresholds
        .into_iter()
        .map(|(name, threshold)| {
            let model = name.parse::<ModelName>().map_err(|e| e.to_string())?;
            Ok((model, threshold))
        })
        .collect()
}

/// Comma-separated model identifiers; unknown entries are logged and skipped.
fn parse_model_list(raw: &str) -> Vec<ModelName> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(model) => Some(model),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring FACESIM_PRELOAD_MODELS entry");
                None
            }
        })
        .collect()
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
