use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::models::ViewType;

/// Which EF predictor variant the service runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictorMode {
    /// In-process ONNX inference
    Local,
    /// HTTP call to another instance of this service
    Remote { base_url: String },
}

/// Configuration of the EF prediction pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: PredictorMode,
    pub models_dir: PathBuf,
    pub backbone_model: String,
    pub a4c_model: String,
    pub psax_model: String,
    pub sequence_length: usize,
    pub frame_interval: usize,
    pub frame_size: u32,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub media_root: PathBuf,
    pub prediction_timeout: Duration,
    pub inference_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: PredictorMode::Local,
            models_dir: PathBuf::from("models"),
            backbone_model: "vgg16_backbone.onnx".to_string(),
            a4c_model: "a4c_model.onnx".to_string(),
            psax_model: "psax_model.onnx".to_string(),
            sequence_length: 30,
            frame_interval: 1,
            frame_size: 224,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            media_root: PathBuf::from("media"),
            prediction_timeout: Duration::from_secs(120),
            inference_threads: 4,
        }
    }
}

impl PipelineConfig {
    /// Create pipeline configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let mode = match env::var("EF_PREDICTOR")
            .unwrap_or_else(|_| "local".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "local" => PredictorMode::Local,
            "remote" => {
                let base_url = env::var("EF_REMOTE_URL")
                    .context("EF_REMOTE_URL is required when EF_PREDICTOR=remote")?;
                PredictorMode::Remote {
                    base_url: base_url.trim_end_matches('/').to_string(),
                }
            }
            other => return Err(anyhow!("Unknown EF_PREDICTOR '{}', expected local or remote", other)),
        };

        let config = Self {
            mode,
            models_dir: env::var("MODELS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.models_dir),
            backbone_model: env::var("BACKBONE_MODEL").unwrap_or(defaults.backbone_model),
            a4c_model: env::var("A4C_MODEL").unwrap_or(defaults.a4c_model),
            psax_model: env::var("PSAX_MODEL").unwrap_or(defaults.psax_model),
            sequence_length: parse_var("SEQUENCE_LENGTH", defaults.sequence_length)?,
            frame_interval: parse_var("FRAME_INTERVAL", defaults.frame_interval)?,
            frame_size: parse_var("FRAME_SIZE", defaults.frame_size)?,
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
            media_root: env::var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_root),
            prediction_timeout: Duration::from_secs(parse_var(
                "PREDICTION_TIMEOUT_SECS",
                defaults.prediction_timeout.as_secs(),
            )?),
            inference_threads: parse_var("INFERENCE_THREADS", defaults.inference_threads)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sequence_length == 0 {
            return Err(anyhow!("SEQUENCE_LENGTH must be at least 1"));
        }
        if self.frame_interval == 0 {
            return Err(anyhow!("FRAME_INTERVAL must be at least 1"));
        }
        if self.frame_size == 0 {
            return Err(anyhow!("FRAME_SIZE must be at least 1"));
        }
        Ok(())
    }

    pub fn backbone_path(&self) -> PathBuf {
        self.models_dir.join(&self.backbone_model)
    }

    /// Weight file of the regressor trained for `view`
    pub fn regressor_path(&self, view: ViewType) -> PathBuf {
        match view {
            ViewType::A4c => self.models_dir.join(&self.a4c_model),
            ViewType::Psax => self.models_dir.join(&self.psax_model),
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", name, value)),
        Err(_) => Ok(default),
    }
}
