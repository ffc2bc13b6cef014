//! Fusion regressors
//!
//! One trained sequence model per view. Each consumes the padded embedding
//! sequence `[1, sequence_length, ...]` and the demographic vector `[1, 27]`
//! and emits a single EF value.
use ndarray::{Array2, ArrayD};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;

use crate::errors::{PipelineError, PipelineResult};
use crate::models::ViewType;
use crate::services::onnx_session;

#[cfg_attr(test, mockall::automock)]
pub trait SequenceRegressor: Send + Sync {
    /// Predict EF from a batched sequence and a batched demographic vector
    fn regress(&self, sequence: &ArrayD<f32>, demographics: &Array2<f32>) -> PipelineResult<f32>;
}

/// Truncate the regressor output toward zero, as an integer percentage
///
/// The value is not clamped to [0, 100].
pub fn to_ejection_fraction(raw_output: f32) -> PipelineResult<i32> {
    if !raw_output.is_finite() {
        return Err(PipelineError::Inference(format!(
            "regressor produced a non-finite value: {}",
            raw_output
        )));
    }
    Ok(raw_output.trunc() as i32)
}

/// Regressor backed by an ONNX export of the trained LSTM model
pub struct OnnxFusionRegressor {
    session: Mutex<Session>,
    view: ViewType,
    sequence_input: String,
    demographic_input: String,
    output_name: String,
}

impl OnnxFusionRegressor {
    /// Load the regressor trained for `view`
    ///
    /// The first declared input takes the frame sequence and the second the
    /// demographic vector.
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        view: ViewType,
        intra_threads: usize,
    ) -> PipelineResult<Self> {
        let model_path = model_path.as_ref();
        let session = onnx_session::load_session(model_path, intra_threads)?;

        let inputs = onnx_session::input_names(&session);
        let (sequence_input, demographic_input) = match inputs.as_slice() {
            [sequence, demographics] => (sequence.clone(), demographics.clone()),
            other => {
                return Err(onnx_session::load_error(
                    model_path,
                    format!("expected 2 inputs, found {}", other.len()),
                ))
            }
        };
        let output_name = onnx_session::output_names(&session)
            .into_iter()
            .next()
            .ok_or_else(|| onnx_session::load_error(model_path, "regressor declares no outputs"))?;

        tracing::info!(
            "Fusion regressor for {} uses inputs ({}, {})",
            view,
            sequence_input,
            demographic_input
        );

        Ok(Self {
            session: Mutex::new(session),
            view,
            sequence_input,
            demographic_input,
            output_name,
        })
    }

    pub fn view(&self) -> ViewType {
        self.view
    }
}

impl SequenceRegressor for OnnxFusionRegressor {
    fn regress(&self, sequence: &ArrayD<f32>, demographics: &Array2<f32>) -> PipelineResult<f32> {
        let sequence_tensor = Tensor::from_array(sequence.clone())?;
        let demographic_tensor = Tensor::from_array(demographics.clone())?;

        let mut session = self.session.lock().map_err(|_| {
            PipelineError::Inference(format!("{} regressor session lock poisoned", self.view))
        })?;
        let outputs = session.run(ort::inputs![
            self.sequence_input.as_str() => sequence_tensor,
            self.demographic_input.as_str() => demographic_tensor
        ])?;
        let (_, data) = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;

        data.first()
            .copied()
            .ok_or_else(|| PipelineError::Inference("regressor produced an empty output".to_string()))
    }
}
