use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;

use crate::errors::{PipelineError, PipelineResult};

/// Load an ONNX model with graph optimizations enabled
///
/// Missing or unreadable weight files become `PipelineError::ModelLoad`.
pub fn load_session(model_path: &Path, intra_threads: usize) -> PipelineResult<Session> {
    if !model_path.is_file() {
        return Err(load_error(model_path, "weight file not found"));
    }

    let builder = Session::builder().map_err(|e| load_error(model_path, e))?;
    let builder = builder
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| load_error(model_path, e))?;
    let builder = builder
        .with_intra_threads(intra_threads.max(1))
        .map_err(|e| load_error(model_path, e))?;
    let session = builder
        .commit_from_file(model_path)
        .map_err(|e| load_error(model_path, e))?;

    tracing::info!(
        "Loaded ONNX model from {} ({} inputs, {} outputs)",
        model_path.display(),
        session.inputs.len(),
        session.outputs.len()
    );

    Ok(session)
}

pub fn input_names(session: &Session) -> Vec<String> {
    session.inputs.iter().map(|input| input.name.clone()).collect()
}

pub fn output_names(session: &Session) -> Vec<String> {
    session.outputs.iter().map(|output| output.name.clone()).collect()
}

pub fn load_error(model_path: &Path, error: impl std::fmt::Display) -> PipelineError {
    PipelineError::ModelLoad {
        path: model_path.to_path_buf(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_missing_weights_fail_to_load() {
        assert_matches!(
            load_session(Path::new("models/does_not_exist.onnx"), 1).err(),
            Some(PipelineError::ModelLoad { .. })
        );
    }

    #[test]
    fn test_corrupt_weights_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.onnx");
        std::fs::write(&path, b"definitely not a protobuf").unwrap();

        assert_matches!(
            load_session(&path, 1).err(),
            Some(PipelineError::ModelLoad { .. })
        );
    }
}
