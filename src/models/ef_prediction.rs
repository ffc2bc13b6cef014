use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::echo::{DemographicRecord, ViewType, VolumeTracings};

/// Everything one EF prediction needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EfPredictionRequest {
    /// Path to the echocardiogram, absolute or relative to the media root
    pub video: PathBuf,
    pub view: ViewType,
    pub demographics: DemographicRecord,
    pub tracings: VolumeTracings,
}

/// The non-video part of a request, sent as JSON next to the uploaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EfPredictionPayload {
    pub view: ViewType,
    pub demographics: DemographicRecord,
    pub tracings: VolumeTracings,
}

impl EfPredictionPayload {
    pub fn into_request(self, video: PathBuf) -> EfPredictionRequest {
        EfPredictionRequest {
            video,
            view: self.view,
            demographics: self.demographics,
            tracings: self.tracings,
        }
    }
}

impl From<&EfPredictionRequest> for EfPredictionPayload {
    fn from(request: &EfPredictionRequest) -> Self {
        Self {
            view: request.view,
            demographics: request.demographics.clone(),
            tracings: request.tracings.clone(),
        }
    }
}

/// Detailed outcome of a local pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct EfPrediction {
    pub ejection_fraction: i32,
    /// Unrounded regressor output
    pub raw_output: f32,
    /// Number of frames that came from the video, the rest is padding
    pub frames_sampled: usize,
    pub view: ViewType,
}

/// Clinical categories for an ejection fraction value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EfCategory {
    CriticallyElevated,
    Normal,
    BorderlineLow,
    ModeratelyAbnormal,
    SeverelyAbnormal,
}

impl EfCategory {
    pub fn label(&self) -> &'static str {
        match self {
            EfCategory::CriticallyElevated => "critically elevated",
            EfCategory::Normal => "normal",
            EfCategory::BorderlineLow => "borderline low",
            EfCategory::ModeratelyAbnormal => "moderately abnormal",
            EfCategory::SeverelyAbnormal => "severely abnormal",
        }
    }
}

impl std::fmt::Display for EfCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Human-readable reading of an EF value, attached to a diagnosis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EfInterpretation {
    pub ejection_fraction: i32,
    pub category: EfCategory,
    pub note: String,
}

/// Response of the predict endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EfPredictionResponse {
    pub id: Uuid,
    pub ejection_fraction: i32,
    pub view: ViewType,
    pub interpretation: EfInterpretation,
    pub predicted_at: DateTime<Utc>,
}

/// Outcome of an assessment; EF stays empty when the prediction failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoAssessment {
    pub id: Uuid,
    pub view: ViewType,
    pub ejection_fraction: Option<i32>,
    pub interpretation: Option<EfInterpretation>,
    pub error: Option<String>,
    pub assessed_at: DateTime<Utc>,
}
