use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::ViewType;

/// Failures of a single EF prediction.
///
/// Every variant is local to the request that produced it. Loaded models are
/// never left in a bad state by any of these.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Video not found: {}", .0.display())]
    VideoNotFound(PathBuf),
    #[error("Failed to decode video {}: {message}", .path.display())]
    VideoDecode { path: PathBuf, message: String },
    #[error("No frames could be sampled from the video")]
    EmptyFrameSequence,
    #[error("Volume tracing axis {0} is empty")]
    EmptyTracing(char),
    #[error("Volume tracing axis {0} contains non-finite values")]
    NonFiniteTracing(char),
    #[error("Volume tracing Y range is zero, aspect ratio is undefined")]
    DegenerateTracing,
    #[error("Invalid demographics: {0}")]
    InvalidDemographics(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Failed to load model {}: {message}", .path.display())]
    ModelLoad { path: PathBuf, message: String },
    #[error("No model loaded for view {0}")]
    ModelUnavailable(ViewType),
    #[error("Shape mismatch for {input}: expected {expected}, got {actual}")]
    ShapeMismatch {
        input: &'static str,
        expected: String,
        actual: String,
    },
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("ONNX runtime error: {0}")]
    Runtime(#[from] ort::Error),
    #[error("Prediction exceeded deadline of {0:?}")]
    Timeout(Duration),
    #[error("Remote inference service error: {0}")]
    Remote(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the failure was caused by the request's own data rather than
    /// by the service.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            PipelineError::VideoNotFound(_)
                | PipelineError::VideoDecode { .. }
                | PipelineError::EmptyFrameSequence
                | PipelineError::EmptyTracing(_)
                | PipelineError::NonFiniteTracing(_)
                | PipelineError::DegenerateTracing
                | PipelineError::InvalidDemographics(_)
                | PipelineError::InvalidArgument(_)
        )
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
