use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::PipelineConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::models::ViewType;
use crate::services::ef_pipeline::{EfPredictionPipeline, SamplingSettings};
use crate::services::feature_extractor::{FrameEmbedder, OnnxFrameEmbedder};
use crate::services::frame_sampler::{FrameSource, VideoFrameSampler};
use crate::services::fusion_regressor::{OnnxFusionRegressor, SequenceRegressor};

/// Process-wide owner of the loaded models
///
/// Built once at startup and never mutated afterwards. The backbone is shared
/// by every view; each view has its own regressor.
pub struct ModelRegistry {
    sampler: Arc<dyn FrameSource>,
    backbone: Arc<dyn FrameEmbedder>,
    regressors: HashMap<ViewType, Arc<dyn SequenceRegressor>>,
    settings: SamplingSettings,
    media_root: PathBuf,
}

impl ModelRegistry {
    /// Load the backbone and a regressor for every view
    pub fn load(config: &PipelineConfig) -> PipelineResult<Self> {
        let backbone = OnnxFrameEmbedder::load(config.backbone_path(), config.inference_threads)?;

        let mut regressors: HashMap<ViewType, Arc<dyn SequenceRegressor>> = HashMap::new();
        for view in ViewType::ALL {
            let regressor = OnnxFusionRegressor::load(
                config.regressor_path(view),
                view,
                config.inference_threads,
            )?;
            regressors.insert(view, Arc::new(regressor));
        }

        let sampler = VideoFrameSampler::with_paths(
            config.ffmpeg_path.clone(),
            config.ffprobe_path.clone(),
            config.frame_size,
        );

        info!(
            "Model registry ready: {} view(s), sequence length {}, frame interval {}",
            regressors.len(),
            config.sequence_length,
            config.frame_interval
        );

        Ok(Self {
            sampler: Arc::new(sampler),
            backbone: Arc::new(backbone),
            regressors,
            settings: SamplingSettings {
                sequence_length: config.sequence_length,
                frame_interval: config.frame_interval,
            },
            media_root: config.media_root.clone(),
        })
    }

    /// Assemble a registry from already constructed components
    pub fn from_parts(
        sampler: Arc<dyn FrameSource>,
        backbone: Arc<dyn FrameEmbedder>,
        regressors: HashMap<ViewType, Arc<dyn SequenceRegressor>>,
        settings: SamplingSettings,
        media_root: PathBuf,
    ) -> Self {
        Self {
            sampler,
            backbone,
            regressors,
            settings,
            media_root,
        }
    }

    /// Views with a loaded regressor
    pub fn views(&self) -> Vec<ViewType> {
        ViewType::ALL
            .into_iter()
            .filter(|view| self.regressors.contains_key(view))
            .collect()
    }

    /// Pipeline using the regressor trained for `view`
    pub fn pipeline(&self, view: ViewType) -> PipelineResult<EfPredictionPipeline> {
        let regressor = self
            .regressors
            .get(&view)
            .cloned()
            .ok_or(PipelineError::ModelUnavailable(view))?;

        Ok(EfPredictionPipeline::new(
            view,
            Arc::clone(&self.sampler),
            Arc::clone(&self.backbone),
            regressor,
            self.settings,
            self.media_root.clone(),
        ))
    }
}
