use crate::engine::EngineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use facesim_core::VerifyError;
use serde_json::json;
use thiserror::Error;

/// Everything a verification request can fail with, as seen by clients.
///
/// The `Display` text is the message returned in the `error` field; full
/// failure detail stays in the server log.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Please provide both img1 and img2")]
    MissingInput,
    #[error("Model '{0}' is not supported.")]
    UnsupportedModel(String),
    #[error("Uploaded images exceed the size limit.")]
    PayloadTooLarge,
    /// `image` is 1 or 2.
    #[error("Face could not be detected in img{image}. Please confirm that the picture is a face photo.")]
    NoFaceDetected { image: usize },
    #[error("Uploaded image could not be read.")]
    UnreadableImage,
    #[error("Model '{0}' could not be loaded.")]
    ModelLoadFailure(String),
    #[error("Verification timed out.")]
    Timeout,
    #[error("Internal server error.")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingInput | ApiError::UnsupportedModel(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable identifier for the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingInput => "missing_input",
            ApiError::UnsupportedModel(_) => "unsupported_model",
            ApiError::PayloadTooLarge => "payload_too_large",
            ApiError::NoFaceDetected { .. } => "no_face_detected",
            ApiError::UnreadableImage => "unreadable_image",
            ApiError::ModelLoadFailure(_) => "model_load_failure",
            ApiError::Timeout => "timeout",
            ApiError::Internal => "internal_error",
        }
    }

    /// Log an unexpected failure with full detail and hide it from the client.
    pub fn internal(context: &str, detail: impl std::fmt::Display) -> Self {
        tracing::error!(error = %detail, "{context}");
        ApiError::Internal
    }
}

impl From<VerifyError> for ApiError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::NoFaceDetected { image } => ApiError::NoFaceDetected { image },
            VerifyError::UnreadableImage { .. } => ApiError::UnreadableImage,
            VerifyError::ModelLoadFailure { model, .. } => ApiError::ModelLoadFailure(model),
            VerifyError::Inference(detail) => ApiError::internal("inference failed", detail),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Verify(inner) => inner.into(),
            other => ApiError::internal("verification engine unavailable", other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        (self.status(), Json(body)).into_response()
    }
}
