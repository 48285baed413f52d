//! HTTP surface: image classification and disease information endpoints.

use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use skinsight_ai::{DiseaseInfoService, PipelineError, PredictionPipeline, UploadArchive};
use skinsight_core::{
    ClassifyRequest, DiseaseInfo, DiseaseInfoRequest, Prediction, PredictionResponse,
    ValidationError,
};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Headroom for multipart framing on top of the image byte limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub struct AppState {
    pub pipeline: Arc<PredictionPipeline>,
    pub archive: Option<UploadArchive>,
    pub disease_info: Option<Arc<DiseaseInfoService>>,
}

pub fn router(state: Arc<AppState>, max_image_bytes: usize) -> Router {
    Router::new()
        .route("/analytics/prediction/", post(predict))
        .route("/analytics/details/", post(details))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_image_bytes + MULTIPART_OVERHEAD))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Errors ──

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Prediction failed: {0}")]
    Prediction(String),
    #[error("Failed to get disease details: {0}")]
    Details(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Prediction(_) | ApiError::Details(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Prediction(err.to_string())
    }
}

// ── Classification ──

async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let request = read_upload(multipart).await?;
    info!(
        bytes = request.image.len(),
        top_k = request.top_k.get(),
        "classify request"
    );

    let ranked = tokio::task::spawn_blocking(move || classify(&state, request))
        .await
        .map_err(|e| ApiError::Prediction(e.to_string()))??;

    Ok(Json(PredictionResponse::from_ranked(&ranked)))
}

/// Runs on the blocking pool. The archive commit happens only after the
/// pipeline has returned and its transient file is gone.
fn classify(state: &AppState, request: ClassifyRequest) -> Result<Vec<Prediction>, ApiError> {
    let ranked = state.pipeline.predict(&request.image, request.top_k)?;

    if let Some(archive) = &state.archive {
        match archive.commit(&request.image, request.file_name.as_deref()) {
            Ok(path) => info!(path = %path.display(), "archived upload"),
            Err(e) => warn!(error = %e, dir = %archive.dir().display(), "archive commit failed"),
        }
    }
    Ok(ranked)
}

async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ClassifyRequest, ApiError> {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "request is not a multipart upload");
            return Err(ValidationError::MissingImage.into());
        }
    };

    let mut image = None;
    let mut file_name = None;
    let mut top_k = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(ApiError::PayloadTooLarge(e.body_text()));
            }
            Err(e) => {
                warn!(error = %e, "malformed multipart body");
                return Err(ValidationError::MissingImage.into());
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") if image.is_none() => {
                file_name = field.file_name().map(str::to_string);
                match field.bytes().await {
                    Ok(bytes) => image = Some(bytes.to_vec()),
                    Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                        return Err(ApiError::PayloadTooLarge(e.body_text()));
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read image part");
                        return Err(ValidationError::MissingImage.into());
                    }
                }
            }
            Some("top_k") => match field.text().await {
                Ok(text) => top_k = Some(text),
                Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                    return Err(ApiError::PayloadTooLarge(e.body_text()));
                }
                Err(e) => {
                    warn!(error = %e, "failed to read top_k part");
                    return Err(ValidationError::InvalidTopK(e.body_text()).into());
                }
            },
            _ => {}
        }
    }

    Ok(ClassifyRequest::from_parts(
        image,
        file_name,
        top_k.as_deref(),
    )?)
}

// ── Disease information ──

#[derive(Debug, Default, Deserialize)]
struct NameField {
    #[serde(default)]
    name: Option<String>,
}

/// The `name` of a details request, from a JSON or url-encoded form body.
///
/// A body that is neither yields no name, which validation then rejects.
struct DetailsPayload {
    name: Option<String>,
}

impl<S: Send + Sync> FromRequest<S> for DetailsPayload {
    type Rejection = std::convert::Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        let body = if is_form {
            Form::<NameField>::from_request(req, state)
                .await
                .ok()
                .map(|Form(b)| b)
        } else {
            Json::<NameField>::from_request(req, state)
                .await
                .ok()
                .map(|Json(b)| b)
        };
        Ok(Self {
            name: body.and_then(|b| b.name),
        })
    }
}

async fn details(
    State(state): State<Arc<AppState>>,
    payload: DetailsPayload,
) -> Result<Json<DiseaseInfo>, ApiError> {
    let request = DiseaseInfoRequest::from_name(payload.name.as_deref())?;
    let service = state
        .disease_info
        .as_ref()
        .ok_or_else(|| ApiError::Details("no LLM provider is configured".into()))?;

    let info = service
        .describe(&request.query)
        .await
        .map_err(|e| ApiError::Details(e.to_string()))?;
    Ok(Json(info))
}

// ── Health ──

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub labels: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let classifier = state.pipeline.classifier();
    Json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: classifier.is_loaded(),
        labels: classifier.get().map(|c| c.labels().len()).unwrap_or(0),
    })
}
