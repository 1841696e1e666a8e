//! HTTP surface: `/predict` (fixed model) and `/compare` (selectable model)
//! over one shared verification pipeline.

use crate::config::Config;
use crate::engine::EngineHandle;
use crate::error::ApiError;
use crate::staging::StagedPair;
use crate::verdict::Verdict;
use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use facesim_core::{DistanceMetric, ModelName, VerifyRequest};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

/// Model used by the fixed-model `/predict` route.
pub const PREDICT_MODEL: ModelName = ModelName::VggFace;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    engine: EngineHandle,
    config: Arc<Config>,
    verify_timeout: Duration,
}

impl AppState {
    pub fn new(engine: EngineHandle, config: Config) -> Self {
        let verify_timeout = Duration::from_secs(config.verify_timeout_secs);
        Self {
            engine,
            config: Arc::new(config),
            verify_timeout,
        }
    }
}

/// Which model a route verifies with and how the threshold is chosen.
#[derive(Debug, Clone, Copy)]
enum Route {
    /// `/predict`: always [`PREDICT_MODEL`], `model_name` is ignored.
    Predict,
    /// `/compare`: `model_name` form field, echoed back as `model_used`.
    Compare,
}

impl Route {
    fn name(&self) -> &'static str {
        match self {
            Route::Predict => "predict",
            Route::Compare => "compare",
        }
    }
}

/// Fields read from the multipart body.
#[derive(Debug, Default)]
struct VerifyForm {
    img1: Option<Bytes>,
    img2: Option<Bytes>,
    model_name: Option<String>,
}

/// Build the router with explicit route→handler bindings.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/predict", post(predict))
        .route("/compare", post(compare))
        .route("/health", get(health))
        .route("/models", get(list_models))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Verdict>, ApiError> {
    verify(state, multipart, Route::Predict).await
}

async fn compare(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Verdict>, ApiError> {
    verify(state, multipart, Route::Compare).await
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_models() -> Json<Value> {
    Json(json!({
        "models": ModelName::ALL.iter().map(ModelName::as_str).collect::<Vec<_>>(),
        "default": ModelName::default().as_str(),
    }))
}

async fn verify(
    state: AppState,
    multipart: Result<Multipart, MultipartRejection>,
    route: Route,
) -> Result<Json<Verdict>, ApiError> {
    let span = tracing::info_span!("verify", request_id = %Uuid::new_v4(), route = route.name());
    run_verification(state, multipart, route).instrument(span).await
}

/// Validate → stage → verify → shape. Staged files are removed on every
/// exit path when `staged` goes out of scope.
async fn run_verification(
    state: AppState,
    multipart: Result<Multipart, MultipartRejection>,
    route: Route,
) -> Result<Json<Verdict>, ApiError> {
    let form = match multipart {
        Ok(multipart) => read_form(multipart).await?,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "request is not multipart");
            VerifyForm::default()
        }
    };

    let (img1, img2) = match (form.img1, form.img2) {
        (Some(img1), Some(img2)) if !img1.is_empty() && !img2.is_empty() => (img1, img2),
        _ => return Err(ApiError::MissingInput),
    };

    let (model, threshold, model_used) = match route {
        Route::Predict => (PREDICT_MODEL, state.config.predict_threshold, None),
        Route::Compare => {
            let model = match form.model_name {
                Some(name) => name
                    .parse::<ModelName>()
                    .map_err(|_| ApiError::UnsupportedModel(name))?,
                None => ModelName::default(),
            };
            let threshold = state.config.compare_threshold_for(model);
            (model, threshold, Some(model.to_string()))
        }
    };

    let staged = tokio::task::spawn_blocking(move || StagedPair::write(&img1, &img2))
        .await
        .map_err(|e| ApiError::internal("staging task panicked", e))?
        .map_err(|e| ApiError::internal("failed to stage uploads", e))?;

    let request = VerifyRequest {
        img1_path: staged.img1.path().to_path_buf(),
        img2_path: staged.img2.path().to_path_buf(),
        model,
        metric: DistanceMetric::Cosine,
        enforce_detection: true,
    };

    let output = tokio::time::timeout(state.verify_timeout, state.engine.verify(request))
        .await
        .map_err(|_| {
            tracing::warn!(timeout = ?state.verify_timeout, "verification timed out");
            ApiError::Timeout
        })??;
    drop(staged);

    if !output.distance.is_finite() {
        return Err(ApiError::internal("verifier returned a non-finite distance", output.distance));
    }

    let verdict = Verdict::from_distance(output.distance, threshold, model_used);
    tracing::info!(
        model = %model,
        distance = verdict.distance,
        threshold,
        verified = verdict.verified,
        "verification answered"
    );
    Ok(Json(verdict))
}

/// Collect the known fields. A malformed body stops reading; whatever was
/// read so far is kept, so validation reports the missing images. A body
/// over the upload limit fails outright.
async fn read_form(mut multipart: Multipart) -> Result<VerifyForm, ApiError> {
    let mut form = VerifyForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                check_too_large(&e)?;
                tracing::warn!(error = %e, "malformed multipart body");
                break;
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        let result = match name.as_str() {
            "img1" => field.bytes().await.map(|b| form.img1 = Some(b)),
            "img2" => field.bytes().await.map(|b| form.img2 = Some(b)),
            "model_name" => field.text().await.map(|t| form.model_name = Some(t)),
            _ => Ok(()),
        };
        if let Err(e) = result {
            check_too_large(&e)?;
            tracing::warn!(field = %name, error = %e, "failed to read multipart field");
            break;
        }
    }
    Ok(form)
}

fn check_too_large(e: &MultipartError) -> Result<(), ApiError> {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::warn!(error = %e, "upload exceeds the size limit");
        return Err(ApiError::PayloadTooLarge);
    }
    Ok(())
}
