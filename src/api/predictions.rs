use axum::{
    extract::{multipart::Field, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::models::{EchoAssessment, EfPredictionPayload, EfPredictionRequest, EfPredictionResponse};
use crate::services::{interpret, EchoAssessmentService, EfPredictor};

/// Largest accepted request body (500MB)
pub const MAX_UPLOAD_BYTES: usize = 500 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<EfPredictor>,
    pub assessment: EchoAssessmentService,
}

impl AppState {
    pub fn new(predictor: Arc<EfPredictor>) -> Self {
        Self {
            assessment: EchoAssessmentService::new(Arc::clone(&predictor)),
            predictor,
        }
    }
}

/// A multipart upload spooled to disk; the file is removed on drop
struct UploadedEcho {
    _video: NamedTempFile,
    request: EfPredictionRequest,
}

/// Predict EF for an uploaded echocardiogram
pub async fn predict_ef(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<EfPredictionResponse>, ApiError> {
    let upload = read_upload(multipart).await?;
    info!("EF prediction request for {} view", upload.request.view);

    let ejection_fraction = state.predictor.predict(&upload.request).await?;

    Ok(Json(EfPredictionResponse {
        id: Uuid::new_v4(),
        ejection_fraction,
        view: upload.request.view,
        interpretation: interpret(ejection_fraction),
        predicted_at: Utc::now(),
    }))
}

/// Assess an uploaded echocardiogram; prediction failures leave EF empty
pub async fn assess_echo(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<EchoAssessment>, ApiError> {
    let upload = read_upload(multipart).await?;
    Ok(Json(state.assessment.assess(&upload.request).await))
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadedEcho, ApiError> {
    let mut video: Option<NamedTempFile> = None;
    let mut payload: Option<EfPredictionPayload> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error!("Failed to read multipart field: {}", e);
        ApiError::InvalidRequest("Failed to read upload data".to_string())
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "video" => {
                video = Some(spool_video(field).await?);
            }
            "payload" => {
                let bytes = field.bytes().await.map_err(|_| {
                    ApiError::InvalidRequest("Failed to read payload".to_string())
                })?;
                payload = Some(serde_json::from_slice(&bytes).map_err(|e| {
                    ApiError::InvalidRequest(format!("Invalid payload: {}", e))
                })?);
            }
            _ => {}
        }
    }

    let video = video
        .ok_or_else(|| ApiError::InvalidRequest("Video file is required".to_string()))?;
    let payload = payload
        .ok_or_else(|| ApiError::InvalidRequest("Payload is required".to_string()))?;

    let request = payload.into_request(video.path().to_path_buf());
    Ok(UploadedEcho {
        _video: video,
        request,
    })
}

async fn spool_video(mut field: Field<'_>) -> Result<NamedTempFile, ApiError> {
    // ffmpeg probes the container, the extension only helps when debugging
    let suffix = field
        .file_name()
        .and_then(|name| Path::new(name).extension())
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let temp = tempfile::Builder::new()
        .prefix("echo-upload-")
        .suffix(&suffix)
        .tempfile()?;
    let mut file = tokio::fs::File::from_std(temp.reopen()?);

    let mut written = 0usize;
    while let Some(chunk) = field.chunk().await.map_err(|e| {
        error!("Failed to read video bytes: {}", e);
        ApiError::InvalidRequest("Failed to read video data".to_string())
    })? {
        written += chunk.len();
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    if written == 0 {
        return Err(ApiError::InvalidRequest("Video file is empty".to_string()));
    }
    info!("Spooled {} byte upload to {}", written, temp.path().display());
    Ok(temp)
}

/// Inference API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("Failed to store upload: {0}")]
    Upload(#[from] std::io::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(e) => match e {
                PipelineError::InvalidArgument(_) | PipelineError::InvalidDemographics(_) => {
                    StatusCode::BAD_REQUEST
                }
                e if e.is_input_error() => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                PipelineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                PipelineError::Remote(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Upload(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Upload(_) => "upload_failed",
            ApiError::Pipeline(e) => match e {
                PipelineError::VideoNotFound(_) => "video_not_found",
                PipelineError::VideoDecode { .. } => "video_decode",
                PipelineError::EmptyFrameSequence => "empty_frame_sequence",
                PipelineError::EmptyTracing(_)
                | PipelineError::NonFiniteTracing(_)
                | PipelineError::DegenerateTracing => "invalid_tracing",
                PipelineError::InvalidDemographics(_) => "invalid_demographics",
                PipelineError::InvalidArgument(_) => "invalid_argument",
                PipelineError::ModelLoad { .. } | PipelineError::ModelUnavailable(_) => {
                    "model_unavailable"
                }
                PipelineError::ShapeMismatch { .. } => "shape_mismatch",
                PipelineError::Inference(_) | PipelineError::Runtime(_) => "inference",
                PipelineError::Timeout(_) => "timeout",
                PipelineError::Remote(_) => "remote_service",
                PipelineError::Io(_) => "io",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("EF request failed: {}", self);
        } else {
            warn!("EF request rejected: {}", self);
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ViewType;
    use std::time::Duration;

    #[test]
    fn test_input_errors_are_client_errors() {
        let cases = [
            (PipelineError::DegenerateTracing, StatusCode::UNPROCESSABLE_ENTITY),
            (PipelineError::EmptyFrameSequence, StatusCode::UNPROCESSABLE_ENTITY),
            (
                PipelineError::InvalidDemographics("age".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                PipelineError::ModelUnavailable(ViewType::Psax),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                PipelineError::Timeout(Duration::from_secs(1)),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (PipelineError::Remote("down".to_string()), StatusCode::BAD_GATEWAY),
            (
                PipelineError::Inference("nan".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status(), expected);
        }
    }

    #[test]
    fn test_missing_video_is_bad_request() {
        let response = ApiError::InvalidRequest("Video file is required".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
