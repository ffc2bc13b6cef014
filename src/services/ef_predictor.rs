use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use crate::config::{PipelineConfig, PredictorMode};
use crate::errors::{PipelineError, PipelineResult};
use crate::models::{EfPredictionPayload, EfPredictionRequest};
use crate::services::ef_pipeline::resolve_video_reference;
use crate::services::model_registry::ModelRegistry;

/// EF prediction capability, in-process or delegated to another service
pub enum EfPredictor {
    Local(LocalEfPredictor),
    Remote(RemoteEfPredictor),
}

impl EfPredictor {
    /// Build the variant selected by `EF_PREDICTOR`
    ///
    /// The local variant loads every model up front.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        match &config.mode {
            PredictorMode::Local => {
                let registry =
                    ModelRegistry::load(config).context("Failed to load EF prediction models")?;
                Ok(EfPredictor::Local(LocalEfPredictor::new(
                    Arc::new(registry),
                    config.prediction_timeout,
                )))
            }
            PredictorMode::Remote { base_url } => Ok(EfPredictor::Remote(RemoteEfPredictor::new(
                base_url.clone(),
                config.media_root.clone(),
                config.prediction_timeout,
            )?)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EfPredictor::Local(_) => "local",
            EfPredictor::Remote(_) => "remote",
        }
    }

    pub async fn predict(&self, request: &EfPredictionRequest) -> PipelineResult<i32> {
        match self {
            EfPredictor::Local(predictor) => predictor.predict(request).await,
            EfPredictor::Remote(predictor) => predictor.predict(request).await,
        }
    }
}

/// Runs the pipeline on tokio's blocking pool with a deadline
pub struct LocalEfPredictor {
    registry: Arc<ModelRegistry>,
    timeout: Duration,
}

impl LocalEfPredictor {
    pub fn new(registry: Arc<ModelRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub async fn predict(&self, request: &EfPredictionRequest) -> PipelineResult<i32> {
        let pipeline = self.registry.pipeline(request.view)?;
        let request = request.clone();

        // The blocking task is not cancelled on timeout; it runs to completion
        // and its result is discarded.
        let task = tokio::task::spawn_blocking(move || {
            pipeline.predict_ef(&request.video, &request.demographics, &request.tracings)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(PipelineError::Inference(format!(
                "prediction task failed: {}",
                join_error
            ))),
            Err(_) => {
                error!("EF prediction exceeded {:?}", self.timeout);
                Err(PipelineError::Timeout(self.timeout))
            }
        }
    }
}

/// Client for the `/api/ef/predict` endpoint of a remote inference service
pub struct RemoteEfPredictor {
    client: Client,
    base_url: String,
    media_root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RemotePrediction {
    ejection_fraction: i32,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    error: String,
}

impl RemoteEfPredictor {
    pub fn new(base_url: String, media_root: PathBuf, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            media_root,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Upload the video and payload, returning the remote EF
    pub async fn predict(&self, request: &EfPredictionRequest) -> PipelineResult<i32> {
        let video_path = resolve_video_reference(&self.media_root, &request.video)?;
        let video = tokio::fs::File::open(&video_path).await?;
        let video_len = video.metadata().await?.len();
        let file_name = video_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "echo.avi".to_string());

        let payload = serde_json::to_string(&EfPredictionPayload::from(request))
            .map_err(|e| PipelineError::Remote(format!("failed to encode payload: {}", e)))?;

        // the video is streamed from disk, never held in memory whole
        let body = Body::wrap_stream(ReaderStream::new(video));
        let video_part = Part::stream_with_length(body, video_len)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(|e| PipelineError::Remote(e.to_string()))?;
        let form = Form::new()
            .part("video", video_part)
            .text("payload", payload);

        let url = format!("{}/api/ef/predict", self.base_url);
        info!("Requesting remote EF prediction from {}", url);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::Remote(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<RemoteError>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            error!("Remote EF prediction failed: {} - {}", status, message);
            return Err(PipelineError::Remote(format!("{}: {}", status, message)));
        }

        let prediction = response
            .json::<RemotePrediction>()
            .await
            .map_err(|e| PipelineError::Remote(format!("failed to parse response: {}", e)))?;

        Ok(prediction.ejection_fraction)
    }
}
