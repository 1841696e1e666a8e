//! Face recognizer via ONNX Runtime.
//!
//! Extracts face embeddings from aligned RGB crops. Input size, normalization,
//! tensor layout and embedding width come from the model's [`RecognizerProfile`].

use crate::alignment;
use crate::models::{ModelName, RecognizerProfile, TensorLayout};
use crate::types::{l2_normalize, BoundingBox, Embedding};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks; detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Embedding extractor for one recognition model.
pub struct FaceRecognizer {
    session: Session,
    model: ModelName,
    profile: RecognizerProfile,
}

impl FaceRecognizer {
    /// Load the ONNX file for `model` from `model_dir`.
    pub fn load(model_dir: &Path, model: ModelName) -> Result<Self, RecognizerError> {
        let profile = model.profile();
        let model_path = model_dir.join(profile.file_name);
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(&model_path)?;

        tracing::info!(
            model = %model,
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded recognition model"
        );

        Ok(Self { session, model, profile })
    }

    /// Extract an embedding for a detected face.
    ///
    /// The face must carry landmarks; it is aligned to the model's canonical
    /// crop before inference.
    pub fn extract(
        &mut self,
        image: &RgbImage,
        face: &BoundingBox,
    ) -> Result<Embedding, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;
        let aligned = alignment::align_face(
            image.as_raw(),
            image.width(),
            image.height(),
            3,
            landmarks,
            self.profile.input_width,
            self.profile.input_height,
        );
        self.embed(&aligned)
    }

    /// Extract an embedding from the whole image, resized to the model input.
    ///
    /// Used when face detection is not enforced and nothing was found.
    pub fn extract_unaligned(&mut self, image: &RgbImage) -> Result<Embedding, RecognizerError> {
        let resized = imageops::resize(
            image,
            self.profile.input_width as u32,
            self.profile.input_height as u32,
            FilterType::Triangle,
        );
        self.embed(resized.as_raw())
    }

    fn embed(&mut self, crop: &[u8]) -> Result<Embedding, RecognizerError> {
        let input = preprocess(crop, &self.profile);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != self.profile.embedding_dim {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {}-dim embedding from {}, got {}",
                self.profile.embedding_dim,
                self.model,
                raw.len()
            )));
        }

        Ok(Embedding {
            values: l2_normalize(raw),
            model_version: Some(self.model.to_string()),
        })
    }
}

/// Convert an interleaved RGB crop into the model's float tensor.
fn preprocess(crop: &[u8], profile: &RecognizerProfile) -> Array4<f32> {
    let (w, h) = (profile.input_width, profile.input_height);
    let mut tensor = match profile.layout {
        TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, h, w)),
        TensorLayout::Nhwc => Array4::<f32>::zeros((1, h, w, 3)),
    };

    for y in 0..h {
        for x in 0..w {
            for c in 0..3 {
                let pixel = crop.get((y * w + x) * 3 + c).copied().unwrap_or(0) as f32;
                let normalized = (pixel - profile.mean) / profile.std;
                match profile.layout {
                    TensorLayout::Nchw => tensor[[0, c, y, x]] = normalized,
                    TensorLayout::Nhwc => tensor[[0, y, x, c]] = normalized,
                }
            }
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crop_for(profile: &RecognizerProfile, rgb: [u8; 3]) -> Vec<u8> {
        rgb.repeat(profile.input_width * profile.input_height)
    }

    #[test]
    fn test_preprocess_nchw_shape() {
        let profile = ModelName::ArcFace.profile();
        let tensor = preprocess(&crop_for(&profile, [128, 128, 128]), &profile);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
    }

    #[test]
    fn test_preprocess_nhwc_non_square_shape() {
        let profile = ModelName::DeepID.profile();
        let tensor = preprocess(&crop_for(&profile, [0, 0, 0]), &profile);
        assert_eq!(tensor.shape(), &[1, 55, 47, 3]);
    }

    #[test]
    fn test_preprocess_arcface_normalization() {
        let profile = ModelName::ArcFace.profile();
        let tensor = preprocess(&crop_for(&profile, [128, 128, 128]), &profile);
        let expected = (128.0 - 127.5) / 127.5;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_keeps_channel_order() {
        let profile = ModelName::Facenet512.profile();
        let tensor = preprocess(&crop_for(&profile, [255, 0, 128]), &profile);
        let norm = |v: f32| (v - profile.mean) / profile.std;
        assert!((tensor[[0, 10, 20, 0]] - norm(255.0)).abs() < 1e-6);
        assert!((tensor[[0, 10, 20, 1]] - norm(0.0)).abs() < 1e-6);
        assert!((tensor[[0, 10, 20, 2]] - norm(128.0)).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_short_crop_pads_with_zero_pixels() {
        let profile = ModelName::OpenFace.profile();
        let tensor = preprocess(&[], &profile);
        assert!(tensor.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_load_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let err = FaceRecognizer::load(dir.path(), ModelName::SFace).err().unwrap();
        assert!(matches!(err, RecognizerError::ModelNotFound(ref p) if p.ends_with("face_recognition_sface.onnx")));
    }
}
