#![allow(dead_code)]

use echo_ef::errors::{PipelineError, PipelineResult};
use echo_ef::models::{DemographicRecord, EfPredictionRequest, ViewType, VolumeTracings};
use echo_ef::services::{
    FrameEmbedder, FrameSource, ModelRegistry, SamplingSettings, SequenceRegressor,
};
use image::{Rgb, RgbImage};
use ndarray::{arr1, Array2, ArrayD};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

/// Initialize test logging
pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .init();
    });
}

/// Yields a fixed number of frames; videos whose name contains "corrupt"
/// fail to decode
pub struct StubFrameSource {
    pub frames: usize,
    pub delay: Option<Duration>,
}

impl StubFrameSource {
    pub fn new(frames: usize) -> Self {
        Self { frames, delay: None }
    }

    pub fn slow(frames: usize, delay: Duration) -> Self {
        Self {
            frames,
            delay: Some(delay),
        }
    }
}

impl FrameSource for StubFrameSource {
    fn sample_frames(
        &self,
        video: &Path,
        _interval: usize,
        max_frames: usize,
    ) -> PipelineResult<Vec<RgbImage>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if video.to_string_lossy().contains("corrupt") {
            return Err(PipelineError::VideoDecode {
                path: video.to_path_buf(),
                message: "moov atom not found".to_string(),
            });
        }
        Ok((0..self.frames.min(max_frames))
            .map(|i| RgbImage::from_pixel(4, 4, Rgb([i as u8 + 1, 0, 0])))
            .collect())
    }
}

/// Embeds a frame as [red, 1.0, 1.0, 1.0]
pub struct ConstantEmbedder;

impl FrameEmbedder for ConstantEmbedder {
    fn embed(&self, frame: &RgbImage) -> PipelineResult<ArrayD<f32>> {
        let red = frame.get_pixel(0, 0)[0] as f32;
        Ok(arr1(&[red, 1.0, 1.0, 1.0]).into_dyn())
    }
}

/// Captured regressor inputs
#[derive(Debug, Clone)]
pub struct RegressorCall {
    pub sequence: ArrayD<f32>,
    pub demographics: Array2<f32>,
}

/// Returns a fixed output and records every call
pub struct RecordingRegressor {
    output: f32,
    calls: Mutex<Vec<RegressorCall>>,
}

impl RecordingRegressor {
    pub fn new(output: f32) -> Self {
        Self {
            output,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RegressorCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl SequenceRegressor for RecordingRegressor {
    fn regress(&self, sequence: &ArrayD<f32>, demographics: &Array2<f32>) -> PipelineResult<f32> {
        self.calls.lock().unwrap().push(RegressorCall {
            sequence: sequence.clone(),
            demographics: demographics.clone(),
        });
        Ok(self.output)
    }
}

/// Registry with both views backed by the same recording regressor
pub fn stub_registry(
    source: StubFrameSource,
    regressor: Arc<RecordingRegressor>,
    media_root: &Path,
) -> ModelRegistry {
    let mut regressors: HashMap<ViewType, Arc<dyn SequenceRegressor>> = HashMap::new();
    for view in ViewType::ALL {
        regressors.insert(view, regressor.clone());
    }

    ModelRegistry::from_parts(
        Arc::new(source),
        Arc::new(ConstantEmbedder),
        regressors,
        SamplingSettings::default(),
        media_root.to_path_buf(),
    )
}

pub fn demographics() -> DemographicRecord {
    DemographicRecord::new(67, 82.0, 171.0)
}

pub fn tracings() -> VolumeTracings {
    VolumeTracings::new(
        vec![38.2, 41.7, 45.0, 49.3, 52.8, 50.1, 44.6],
        vec![22.4, 35.9, 51.2, 63.0, 70.5, 48.8, 30.3],
    )
}

/// Write a placeholder video file under `dir`
pub fn video_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"RIFF....AVI ").unwrap();
    path
}

pub fn request(video: PathBuf, view: ViewType) -> EfPredictionRequest {
    EfPredictionRequest {
        video,
        view,
        demographics: demographics(),
        tracings: tracings(),
    }
}
