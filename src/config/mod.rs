pub mod app;
pub mod pipeline;

pub use app::AppConfig;
pub use pipeline::{PipelineConfig, PredictorMode};
