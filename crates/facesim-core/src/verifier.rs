//! Pairwise face verification.
//!
//! [`FaceVerifier`] is the seam callers program against: two image paths in,
//! a distance out. [`OnnxVerifier`] is the production implementation built on
//! the SCRFD detector and the per-model recognizers.

use crate::detector::{DetectorError, FaceDetector};
use crate::models::ModelName;
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, DistanceMetric, Embedding};
use image::RgbImage;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// SCRFD detection model file name inside the model directory.
pub const DETECTOR_FILE_NAME: &str = "det_10g.onnx";

#[derive(Error, Debug)]
pub enum VerifyError {
    /// `image` is 1 or 2.
    #[error("no face detected in image {image}")]
    NoFaceDetected { image: usize },
    #[error("unreadable image {path}: {reason}")]
    UnreadableImage { path: PathBuf, reason: String },
    #[error("failed to load model {model}: {reason}")]
    ModelLoadFailure { model: String, reason: String },
    #[error("inference failed: {0}")]
    Inference(String),
}

/// One verification call.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub img1_path: PathBuf,
    pub img2_path: PathBuf,
    pub model: ModelName,
    pub metric: DistanceMetric,
    /// Fail with [`VerifyError::NoFaceDetected`] instead of embedding the
    /// whole image when no face is found.
    pub enforce_detection: bool,
}

impl VerifyRequest {
    pub fn new(img1_path: impl Into<PathBuf>, img2_path: impl Into<PathBuf>, model: ModelName) -> Self {
        Self {
            img1_path: img1_path.into(),
            img2_path: img2_path.into(),
            model,
            metric: DistanceMetric::Cosine,
            enforce_detection: true,
        }
    }
}

/// Raw outcome of a verification call. Thresholding is left to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutput {
    pub distance: f64,
    pub model: ModelName,
    pub metric: DistanceMetric,
    /// Face used from each image; `None` when detection was skipped.
    pub facial_areas: [Option<BoundingBox>; 2],
}

/// Something that can compare the faces in two image files.
///
/// Implementations may keep mutable inference state, so calls take `&mut self`.
pub trait FaceVerifier: Send {
    fn verify(&mut self, req: &VerifyRequest) -> Result<VerifyOutput, VerifyError>;
}

impl<V: FaceVerifier + ?Sized> FaceVerifier for Box<V> {
    fn verify(&mut self, req: &VerifyRequest) -> Result<VerifyOutput, VerifyError> {
        (**self).verify(req)
    }
}

impl From<DetectorError> for VerifyError {
    fn from(e: DetectorError) -> Self {
        match e {
            DetectorError::ModelNotFound(path) => VerifyError::ModelLoadFailure {
                model: "SCRFD".into(),
                reason: format!("model file not found: {path}"),
            },
            other => VerifyError::Inference(other.to_string()),
        }
    }
}

fn recognizer_error(model: ModelName, e: RecognizerError) -> VerifyError {
    match e {
        RecognizerError::ModelNotFound(path) => VerifyError::ModelLoadFailure {
            model: model.to_string(),
            reason: format!("model file not found: {path}"),
        },
        RecognizerError::Ort(err) => VerifyError::ModelLoadFailure {
            model: model.to_string(),
            reason: err.to_string(),
        },
        other => VerifyError::Inference(other.to_string()),
    }
}

/// ONNX Runtime verifier.
///
/// The detector is loaded eagerly; recognizers are loaded on first use of
/// each model and cached for the lifetime of the verifier.
pub struct OnnxVerifier {
    model_dir: PathBuf,
    detector: FaceDetector,
    recognizers: HashMap<ModelName, FaceRecognizer>,
}

impl OnnxVerifier {
    pub fn new(model_dir: impl Into<PathBuf>) -> Result<Self, VerifyError> {
        let model_dir = model_dir.into();
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_FILE_NAME))?;
        Ok(Self {
            model_dir,
            detector,
            recognizers: HashMap::new(),
        })
    }

    /// Load a recognizer ahead of the first request.
    pub fn preload(&mut self, model: ModelName) -> Result<(), VerifyError> {
        self.recognizer(model).map(|_| ())
    }

    fn recognizer(&mut self, model: ModelName) -> Result<&mut FaceRecognizer, VerifyError> {
        if !self.recognizers.contains_key(&model) {
            let loaded = FaceRecognizer::load(&self.model_dir, model)
                .map_err(|e| recognizer_error(model, e))?;
            self.recognizers.insert(model, loaded);
        }
        self.recognizers
            .get_mut(&model)
            .ok_or_else(|| VerifyError::Inference(format!("recognizer {model} missing after load")))
    }

    /// Detect, align and embed the most confident face in one image.
    fn represent(
        &mut self,
        path: &Path,
        image_no: usize,
        model: ModelName,
        enforce_detection: bool,
    ) -> Result<(Embedding, Option<BoundingBox>), VerifyError> {
        let image = load_rgb(path)?;
        let face = self.detector.detect(&image)?.into_iter().next();

        let recognizer = self.recognizer(model)?;
        match face {
            Some(face) => {
                tracing::debug!(image = image_no, confidence = face.confidence, "face selected");
                let embedding = recognizer
                    .extract(&image, &face)
                    .map_err(|e| recognizer_error(model, e))?;
                Ok((embedding, Some(face)))
            }
            None if enforce_detection => Err(VerifyError::NoFaceDetected { image: image_no }),
            None => {
                tracing::debug!(image = image_no, "no face found, embedding whole image");
                let embedding = recognizer
                    .extract_unaligned(&image)
                    .map_err(|e| recognizer_error(model, e))?;
                Ok((embedding, None))
            }
        }
    }
}

impl FaceVerifier for OnnxVerifier {
    fn verify(&mut self, req: &VerifyRequest) -> Result<VerifyOutput, VerifyError> {
        let (emb1, area1) = self.represent(&req.img1_path, 1, req.model, req.enforce_detection)?;
        let (emb2, area2) = self.represent(&req.img2_path, 2, req.model, req.enforce_detection)?;

        let distance = emb1.distance(&emb2, req.metric);
        tracing::debug!(model = %req.model, metric = %req.metric, distance, "pair compared");

        Ok(VerifyOutput {
            distance,
            model: req.model,
            metric: req.metric,
            facial_areas: [area1, area2],
        })
    }
}

/// Decode an image file into RGB8 regardless of its on-disk format.
///
/// The format is sniffed from content, so a PNG staged under a `.jpg`
/// name still decodes.
pub fn load_rgb(path: &Path) -> Result<RgbImage, VerifyError> {
    let unreadable = |reason: String| VerifyError::UnreadableImage {
        path: path.to_path_buf(),
        reason,
    };
    let reader = image::ImageReader::open(path)
        .map_err(|e| unreadable(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| unreadable(e.to_string()))?;
    let decoded = reader.decode().map_err(|e| unreadable(e.to_string()))?;
    Ok(decoded.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_request_defaults() {
        let req = VerifyRequest::new("/a.jpg", "/b.jpg", ModelName::VggFace);
        assert_eq!(req.metric, DistanceMetric::Cosine);
        assert!(req.enforce_detection);
    }

    #[test]
    fn test_load_rgb_sniffs_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("really_a_png.jpg");
        RgbImage::from_pixel(4, 3, image::Rgb([1, 2, 3]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();

        let img = load_rgb(&path).unwrap();
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(img.get_pixel(0, 0).0, [1, 2, 3]);
    }

    #[test]
    fn test_load_rgb_garbage_is_unreadable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not an image").unwrap();
        let err = load_rgb(file.path()).unwrap_err();
        assert!(matches!(err, VerifyError::UnreadableImage { .. }));
    }

    #[test]
    fn test_missing_detector_is_model_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxVerifier::new(dir.path()).err().unwrap();
        match err {
            VerifyError::ModelLoadFailure { model, .. } => assert_eq!(model, "SCRFD"),
            other => panic!("unexpected error: {other}"),
        }
    }

    struct FixedDistance(f64);

    impl FaceVerifier for FixedDistance {
        fn verify(&mut self, req: &VerifyRequest) -> Result<VerifyOutput, VerifyError> {
            Ok(VerifyOutput {
                distance: self.0,
                model: req.model,
                metric: req.metric,
                facial_areas: [None, None],
            })
        }
    }

    #[test]
    fn test_boxed_verifier_delegates() {
        let mut boxed: Box<dyn FaceVerifier> = Box::new(FixedDistance(0.25));
        let out = boxed
            .verify(&VerifyRequest::new("a", "b", ModelName::ArcFace))
            .unwrap();
        assert_eq!(out.distance, 0.25);
        assert_eq!(out.model, ModelName::ArcFace);
    }
}
