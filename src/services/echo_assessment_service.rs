use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{EchoAssessment, EfPredictionRequest};
use crate::services::ef_predictor::EfPredictor;
use crate::services::interpretation::interpret;

/// Wraps EF prediction for callers that treat EF as one optional finding
/// among many: failures are recorded on the assessment instead of returned.
#[derive(Clone)]
pub struct EchoAssessmentService {
    predictor: Arc<EfPredictor>,
}

impl EchoAssessmentService {
    pub fn new(predictor: Arc<EfPredictor>) -> Self {
        Self { predictor }
    }

    pub async fn assess(&self, request: &EfPredictionRequest) -> EchoAssessment {
        let id = Uuid::new_v4();

        match self.predictor.predict(request).await {
            Ok(ejection_fraction) => {
                info!("Assessment {} recorded EF {}%", id, ejection_fraction);
                EchoAssessment {
                    id,
                    view: request.view,
                    ejection_fraction: Some(ejection_fraction),
                    interpretation: Some(interpret(ejection_fraction)),
                    error: None,
                    assessed_at: Utc::now(),
                }
            }
            Err(e) => {
                warn!("Assessment {} completed without EF: {}", id, e);
                EchoAssessment {
                    id,
                    view: request.view,
                    ejection_fraction: None,
                    interpretation: None,
                    error: Some(e.to_string()),
                    assessed_at: Utc::now(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DemographicRecord, EfCategory, ViewType, VolumeTracings};
    use crate::services::ef_pipeline::SamplingSettings;
    use crate::services::ef_predictor::LocalEfPredictor;
    use crate::services::feature_extractor::FrameEmbedder;
    use crate::services::frame_sampler::FrameSource;
    use crate::services::fusion_regressor::{MockSequenceRegressor, SequenceRegressor};
    use crate::services::model_registry::ModelRegistry;
    use crate::errors::PipelineResult;
    use image::RgbImage;
    use ndarray::{arr1, ArrayD};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    struct OneFrame;

    impl FrameSource for OneFrame {
        fn sample_frames(&self, _: &Path, _: usize, _: usize) -> PipelineResult<Vec<RgbImage>> {
            Ok(vec![RgbImage::new(2, 2)])
        }
    }

    struct UnitEmbedder;

    impl FrameEmbedder for UnitEmbedder {
        fn embed(&self, _: &RgbImage) -> PipelineResult<ArrayD<f32>> {
            Ok(arr1(&[1.0_f32]).into_dyn())
        }
    }

    fn service(output: f32) -> EchoAssessmentService {
        let mut regressor = MockSequenceRegressor::new();
        regressor.expect_regress().returning(move |_, _| Ok(output));

        let mut regressors: HashMap<ViewType, Arc<dyn SequenceRegressor>> = HashMap::new();
        regressors.insert(ViewType::A4c, Arc::new(regressor));

        let registry = ModelRegistry::from_parts(
            Arc::new(OneFrame),
            Arc::new(UnitEmbedder),
            regressors,
            SamplingSettings::default(),
            PathBuf::from("media"),
        );
        let predictor = EfPredictor::Local(LocalEfPredictor::new(
            Arc::new(registry),
            Duration::from_secs(5),
        ));
        EchoAssessmentService::new(Arc::new(predictor))
    }

    fn request(video: &Path, view: ViewType) -> EfPredictionRequest {
        EfPredictionRequest {
            video: video.to_path_buf(),
            view,
            demographics: DemographicRecord::new(64, 80.0, 175.0),
            tracings: VolumeTracings::new(vec![10.0, 20.0, 30.0], vec![5.0, 25.0, 45.0]),
        }
    }

    #[tokio::test]
    async fn test_successful_assessment_is_interpreted() {
        let video = tempfile::NamedTempFile::new().unwrap();

        let assessment = service(37.9).assess(&request(video.path(), ViewType::A4c)).await;

        assert_eq!(assessment.ejection_fraction, Some(37));
        assert_eq!(
            assessment.interpretation.map(|i| i.category),
            Some(EfCategory::ModeratelyAbnormal)
        );
        assert!(assessment.error.is_none());
    }

    #[tokio::test]
    async fn test_failed_prediction_leaves_ef_empty() {
        let video = tempfile::NamedTempFile::new().unwrap();

        let assessment = service(60.0).assess(&request(video.path(), ViewType::Psax)).await;

        assert_eq!(assessment.view, ViewType::Psax);
        assert!(assessment.ejection_fraction.is_none());
        assert!(assessment.interpretation.is_none());
        assert!(assessment.error.is_some());
    }
}
