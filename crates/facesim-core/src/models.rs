//! Supported recognition models and their input/output profiles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Tensor memory layout expected by a recognition model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// [batch, channel, height, width] (PyTorch / insightface exports).
    Nchw,
    /// [batch, height, width, channel] (Keras exports).
    Nhwc,
}

/// Static description of how to feed a recognition model.
#[derive(Debug, Clone, Copy)]
pub struct RecognizerProfile {
    /// ONNX file name inside the model directory.
    pub file_name: &'static str,
    pub input_width: usize,
    pub input_height: usize,
    pub mean: f32,
    pub std: f32,
    pub layout: TensorLayout,
    pub embedding_dim: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Model '{0}' is not supported.")]
pub struct UnsupportedModel(pub String);

/// The closed set of recognition models the verifier accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelName {
    #[serde(rename = "VGG-Face")]
    VggFace,
    Facenet,
    #[default]
    Facenet512,
    OpenFace,
    DeepID,
    ArcFace,
    SFace,
}

impl ModelName {
    pub const ALL: [ModelName; 7] = [
        ModelName::VggFace,
        ModelName::Facenet,
        ModelName::Facenet512,
        ModelName::OpenFace,
        ModelName::DeepID,
        ModelName::ArcFace,
        ModelName::SFace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelName::VggFace => "VGG-Face",
            ModelName::Facenet => "Facenet",
            ModelName::Facenet512 => "Facenet512",
            ModelName::OpenFace => "OpenFace",
            ModelName::DeepID => "DeepID",
            ModelName::ArcFace => "ArcFace",
            ModelName::SFace => "SFace",
        }
    }

    pub fn profile(&self) -> RecognizerProfile {
        match self {
            ModelName::VggFace => RecognizerProfile {
                file_name: "vgg_face.onnx",
                input_width: 224,
                input_height: 224,
                mean: 0.0,
                std: 255.0,
                layout: TensorLayout::Nhwc,
                embedding_dim: 4096,
            },
            ModelName::Facenet => RecognizerProfile {
                file_name: "facenet128.onnx",
                input_width: 160,
                input_height: 160,
                mean: 127.5,
                std: 128.0,
                layout: TensorLayout::Nhwc,
                embedding_dim: 128,
            },
            ModelName::Facenet512 => RecognizerProfile {
                file_name: "facenet512.onnx",
                input_width: 160,
                input_height: 160,
                mean: 127.5,
                std: 128.0,
                layout: TensorLayout::Nhwc,
                embedding_dim: 512,
            },
            ModelName::OpenFace => RecognizerProfile {
                file_name: "openface.onnx",
                input_width: 96,
                input_height: 96,
                mean: 0.0,
                std: 255.0,
                layout: TensorLayout::Nhwc,
                embedding_dim: 128,
            },
            ModelName::DeepID => RecognizerProfile {
                file_name: "deepid.onnx",
                input_width: 47,
                input_height: 55,
                mean: 0.0,
                std: 255.0,
                layout: TensorLayout::Nhwc,
                embedding_dim: 160,
            },
            // NOT 128.0: ArcFace uses symmetric normalization
            ModelName::ArcFace => RecognizerProfile {
                file_name: "w600k_r50.onnx",
                input_width: 112,
                input_height: 112,
                mean: 127.5,
                std: 127.5,
                layout: TensorLayout::Nchw,
                embedding_dim: 512,
            },
            ModelName::SFace => RecognizerProfile {
                file_name: "face_recognition_sface.onnx",
                input_width: 112,
                input_height: 112,
                mean: 0.0,
                std: 1.0,
                layout: TensorLayout::Nchw,
                embedding_dim: 128,
            },
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelName {
    type Err = UnsupportedModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelName::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnsupportedModel(s.to_string()))
    }
}
