use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::errors::{PipelineError, PipelineResult};
use crate::models::{DemographicRecord, EfPrediction, ViewType, VolumeTracings};
use crate::services::demographic_features::{DemographicFeatureEngineer, DEMOGRAPHIC_FEATURE_COUNT};
use crate::services::feature_extractor::{FrameEmbedder, FrameFeatureExtractor};
use crate::services::frame_sampler::FrameSource;
use crate::services::fusion_regressor::{to_ejection_fraction, SequenceRegressor};

/// How frames are drawn from a video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingSettings {
    /// Number of embeddings the regressor expects
    pub sequence_length: usize,
    /// Keep every Nth decoded frame
    pub frame_interval: usize,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            sequence_length: 30,
            frame_interval: 1,
        }
    }
}

/// EF prediction for a single view: sampler, backbone, feature engineer and
/// the view's regressor wired together
#[derive(Clone)]
pub struct EfPredictionPipeline {
    view: ViewType,
    sampler: Arc<dyn FrameSource>,
    extractor: FrameFeatureExtractor,
    engineer: DemographicFeatureEngineer,
    regressor: Arc<dyn SequenceRegressor>,
    frame_interval: usize,
    media_root: PathBuf,
}

impl EfPredictionPipeline {
    pub fn new(
        view: ViewType,
        sampler: Arc<dyn FrameSource>,
        embedder: Arc<dyn FrameEmbedder>,
        regressor: Arc<dyn SequenceRegressor>,
        settings: SamplingSettings,
        media_root: PathBuf,
    ) -> Self {
        Self {
            view,
            sampler,
            extractor: FrameFeatureExtractor::new(embedder, settings.sequence_length),
            engineer: DemographicFeatureEngineer::new(),
            regressor,
            frame_interval: settings.frame_interval,
            media_root,
        }
    }

    pub fn view(&self) -> ViewType {
        self.view
    }

    /// Resolve a stored video reference against this pipeline's media root
    pub fn resolve_video(&self, reference: &Path) -> PipelineResult<PathBuf> {
        resolve_video_reference(&self.media_root, reference)
    }

    /// Predict the ejection fraction as an integer percentage
    pub fn predict_ef(
        &self,
        video: &Path,
        demographics: &DemographicRecord,
        tracings: &VolumeTracings,
    ) -> PipelineResult<i32> {
        self.predict_ef_detailed(video, demographics, tracings)
            .map(|prediction| prediction.ejection_fraction)
    }

    pub fn predict_ef_detailed(
        &self,
        video: &Path,
        demographics: &DemographicRecord,
        tracings: &VolumeTracings,
    ) -> PipelineResult<EfPrediction> {
        let started = Instant::now();

        // cheap validation before any decoding
        let features = self.engineer.engineer(demographics, tracings, self.view)?;
        let path = self.resolve_video(video)?;

        let frames = self.sampler.sample_frames(
            &path,
            self.frame_interval,
            self.extractor.sequence_length(),
        )?;
        let sequence = self.extractor.extract(&frames)?;
        drop(frames);

        let sequence_batch = sequence.to_batch()?;
        let demographic_batch = features.to_batch();
        check_input_shapes(
            sequence_batch.shape(),
            demographic_batch.shape(),
            self.extractor.sequence_length(),
        )?;
        debug!(
            "Regressor inputs: sequence {:?}, demographics {:?}",
            sequence_batch.shape(),
            demographic_batch.shape()
        );

        let raw_output = self.regressor.regress(&sequence_batch, &demographic_batch)?;
        let ejection_fraction = to_ejection_fraction(raw_output)?;

        info!(
            "Predicted EF {}% for {} view from {} frames in {}ms",
            ejection_fraction,
            self.view,
            sequence.real_frames(),
            started.elapsed().as_millis()
        );

        Ok(EfPrediction {
            ejection_fraction,
            raw_output,
            frames_sampled: sequence.real_frames(),
            view: self.view,
        })
    }
}

/// Resolve a stored video reference to a readable file
///
/// Absolute references are used as they are. Relative ones live under
/// `media_root` and may not contain `..`.
pub fn resolve_video_reference(media_root: &Path, reference: &Path) -> PipelineResult<PathBuf> {
    if reference.as_os_str().is_empty() {
        return Err(PipelineError::InvalidArgument(
            "video reference is empty".to_string(),
        ));
    }

    let path = if reference.is_absolute() {
        reference.to_path_buf()
    } else {
        if reference
            .components()
            .any(|component| matches!(component, Component::ParentDir))
        {
            return Err(PipelineError::InvalidArgument(format!(
                "video reference {} leaves the media root",
                reference.display()
            )));
        }
        media_root.join(reference)
    };

    if !path.is_file() {
        return Err(PipelineError::VideoNotFound(path));
    }
    Ok(path)
}

/// Both regressor inputs must be single-example batches of the trained size
fn check_input_shapes(
    sequence: &[usize],
    demographics: &[usize],
    sequence_length: usize,
) -> PipelineResult<()> {
    if sequence.len() < 3 || sequence[0] != 1 || sequence[1] != sequence_length {
        return Err(PipelineError::ShapeMismatch {
            input: "frame sequence",
            expected: format!("[1, {}, ...]", sequence_length),
            actual: format!("{:?}", sequence),
        });
    }
    if demographics != [1, DEMOGRAPHIC_FEATURE_COUNT] {
        return Err(PipelineError::ShapeMismatch {
            input: "demographic features",
            expected: format!("[1, {}]", DEMOGRAPHIC_FEATURE_COUNT),
            actual: format!("{:?}", demographics),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fusion_regressor::MockSequenceRegressor;
    use assert_matches::assert_matches;
    use image::{Rgb, RgbImage};
    use ndarray::{arr1, ArrayD};

    struct FixedFrames(usize);

    impl FrameSource for FixedFrames {
        fn sample_frames(
            &self,
            _video: &Path,
            _interval: usize,
            max_frames: usize,
        ) -> PipelineResult<Vec<RgbImage>> {
            Ok((0..self.0.min(max_frames))
                .map(|i| RgbImage::from_pixel(2, 2, Rgb([i as u8, 0, 0])))
                .collect())
        }
    }

    struct RedChannelEmbedder;

    impl FrameEmbedder for RedChannelEmbedder {
        fn embed(&self, frame: &RgbImage) -> PipelineResult<ArrayD<f32>> {
            Ok(arr1(&[frame.get_pixel(0, 0)[0] as f32 + 1.0, 0.5]).into_dyn())
        }
    }

    fn pipeline(frames: usize, regressor: MockSequenceRegressor) -> EfPredictionPipeline {
        EfPredictionPipeline::new(
            ViewType::A4c,
            Arc::new(FixedFrames(frames)),
            Arc::new(RedChannelEmbedder),
            Arc::new(regressor),
            SamplingSettings::default(),
            PathBuf::from("media"),
        )
    }

    fn demographics() -> DemographicRecord {
        DemographicRecord::new(58, 72.5, 168.0)
    }

    fn tracings() -> VolumeTracings {
        VolumeTracings::new(vec![31.0, 35.5, 40.2, 44.0], vec![12.0, 20.0, 58.0, 60.5])
    }

    #[test]
    fn test_regressor_receives_padded_batches() {
        let video = tempfile::NamedTempFile::new().unwrap();
        let mut regressor = MockSequenceRegressor::new();
        regressor
            .expect_regress()
            .withf(|sequence, demographics| {
                sequence.shape() == [1, 30, 2]
                    && sequence[[0, 9, 0]] == 10.0
                    && sequence[[0, 10, 0]] == 0.0
                    && demographics.shape() == [1, DEMOGRAPHIC_FEATURE_COUNT]
                    && demographics[[0, 26]] == 1.0
            })
            .times(1)
            .returning(|_, _| Ok(61.8));

        let prediction = pipeline(10, regressor)
            .predict_ef_detailed(video.path(), &demographics(), &tracings())
            .unwrap();

        assert_eq!(prediction.ejection_fraction, 61);
        assert_eq!(prediction.frames_sampled, 10);
        assert_eq!(prediction.view, ViewType::A4c);
    }

    #[test]
    fn test_video_without_frames_fails() {
        let video = tempfile::NamedTempFile::new().unwrap();
        let mut regressor = MockSequenceRegressor::new();
        regressor.expect_regress().never();

        assert_matches!(
            pipeline(0, regressor).predict_ef(video.path(), &demographics(), &tracings()),
            Err(PipelineError::EmptyFrameSequence)
        );
    }

    #[test]
    fn test_bad_tracings_fail_before_decoding() {
        let mut regressor = MockSequenceRegressor::new();
        regressor.expect_regress().never();
        let flat = VolumeTracings::new(vec![1.0, 2.0], vec![5.0, 5.0]);

        assert_matches!(
            pipeline(10, regressor).predict_ef(Path::new("missing.avi"), &demographics(), &flat),
            Err(PipelineError::DegenerateTracing)
        );
    }

    #[test]
    fn test_video_references_resolve_under_media_root() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("echocardiograms")).unwrap();
        std::fs::write(root.path().join("echocardiograms/echo.avi"), b"stub").unwrap();

        let pipeline = EfPredictionPipeline::new(
            ViewType::Psax,
            Arc::new(FixedFrames(1)),
            Arc::new(RedChannelEmbedder),
            Arc::new(MockSequenceRegressor::new()),
            SamplingSettings::default(),
            root.path().to_path_buf(),
        );

        let resolved = pipeline
            .resolve_video(Path::new("echocardiograms/echo.avi"))
            .unwrap();
        assert_eq!(resolved, root.path().join("echocardiograms/echo.avi"));

        assert_matches!(
            pipeline.resolve_video(Path::new("../etc/passwd")),
            Err(PipelineError::InvalidArgument(_))
        );
        assert_matches!(
            pipeline.resolve_video(Path::new("echocardiograms/other.avi")),
            Err(PipelineError::VideoNotFound(_))
        );
    }

    #[test]
    fn test_input_shape_check() {
        assert!(check_input_shapes(&[1, 30, 512], &[1, 27], 30).is_ok());
        assert_matches!(
            check_input_shapes(&[1, 29, 512], &[1, 27], 30),
            Err(PipelineError::ShapeMismatch { input: "frame sequence", .. })
        );
        assert_matches!(
            check_input_shapes(&[1, 30, 512], &[1, 26], 30),
            Err(PipelineError::ShapeMismatch { input: "demographic features", .. })
        );
    }
}
