// EF prediction pipeline and the services built on it

pub mod demographic_features;
pub mod echo_assessment_service;
pub mod ef_pipeline;
pub mod ef_predictor;
pub mod feature_extractor;
pub mod frame_sampler;
pub mod fusion_regressor;
pub mod interpretation;
pub mod model_registry;
pub mod onnx_session;

pub use demographic_features::{DemographicFeatureEngineer, DemographicFeatures};
pub use echo_assessment_service::EchoAssessmentService;
pub use ef_pipeline::{EfPredictionPipeline, SamplingSettings};
pub use ef_predictor::{EfPredictor, LocalEfPredictor, RemoteEfPredictor};
pub use feature_extractor::{FrameEmbedder, FrameFeatureExtractor, OnnxFrameEmbedder};
pub use frame_sampler::{FrameSource, VideoFrameSampler};
pub use fusion_regressor::{OnnxFusionRegressor, SequenceRegressor};
pub use interpretation::{categorize, interpret};
pub use model_registry::ModelRegistry;
