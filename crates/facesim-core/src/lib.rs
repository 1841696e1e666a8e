//! facesim-core: pairwise face verification engine.
//!
//! Uses SCRFD for face detection and a selectable recognition model
//! (VGG-Face, Facenet, Facenet512, OpenFace, DeepID, ArcFace, SFace) for
//! embeddings, all running via ONNX Runtime for CPU inference.

pub mod alignment;
pub mod detector;
pub mod models;
pub mod recognizer;
pub mod types;
pub mod verifier;

pub use detector::FaceDetector;
pub use models::{ModelName, UnsupportedModel};
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, DistanceMetric, Embedding};
pub use verifier::{FaceVerifier, OnnxVerifier, VerifyError, VerifyOutput, VerifyRequest};

use std::path::PathBuf;

/// Default location of the ONNX model files: `$XDG_DATA_HOME/facesim/models`,
/// falling back to `~/.local/share/facesim/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facesim")
        .join("models")
}
