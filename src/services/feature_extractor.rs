//! Frame Feature Extraction
//!
//! Runs the convolutional backbone (VGG16 without its classifier head) over
//! every sampled frame and assembles the fixed-length temporal sequence the
//! fusion regressors consume.
//!
//! Model Details:
//! - Input: [1, 224, 224, 3] FP32 (NHWC, channel means subtracted, no scaling)
//! - Output: [1, 7, 7, 512] FP32 feature map per frame
use image::RgbImage;
use ndarray::{Array4, ArrayD, Axis, Dimension, IxDyn};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::errors::{PipelineError, PipelineResult};
use crate::services::onnx_session;

/// Per-channel means subtracted before inference, in tensor channel order
///
/// The backbone was fed decoder-native BGR frames flipped to RGB, so channel
/// 0 holds red and has 103.939 subtracted.
pub const CHANNEL_MEANS: [f32; 3] = [103.939, 116.779, 123.68];

/// Maps one frame to its embedding
pub trait FrameEmbedder: Send + Sync {
    fn embed(&self, frame: &RgbImage) -> PipelineResult<ArrayD<f32>>;
}

/// ONNX backbone shared by every view's pipeline
pub struct OnnxFrameEmbedder {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxFrameEmbedder {
    /// Load the backbone from an ONNX export
    pub fn load<P: AsRef<Path>>(model_path: P, intra_threads: usize) -> PipelineResult<Self> {
        let model_path = model_path.as_ref();
        let session = onnx_session::load_session(model_path, intra_threads)?;

        let input_name = onnx_session::input_names(&session)
            .into_iter()
            .next()
            .ok_or_else(|| onnx_session::load_error(model_path, "backbone declares no inputs"))?;
        let output_name = onnx_session::output_names(&session)
            .into_iter()
            .next()
            .ok_or_else(|| onnx_session::load_error(model_path, "backbone declares no outputs"))?;

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl FrameEmbedder for OnnxFrameEmbedder {
    fn embed(&self, frame: &RgbImage) -> PipelineResult<ArrayD<f32>> {
        let input = Tensor::from_array(preprocess_frame(frame))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| PipelineError::Inference("backbone session lock poisoned".to_string()))?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input])?;
        let (shape, data) = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;

        // drop the batch axis
        let dims: Vec<usize> = shape.iter().skip(1).map(|&d| d.max(0) as usize).collect();
        ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec()).map_err(|e| {
            PipelineError::Inference(format!("backbone output does not match its shape: {}", e))
        })
    }
}

/// Convert an RGB frame to the backbone's NHWC mean-centred input
pub fn preprocess_frame(frame: &RgbImage) -> Array4<f32> {
    let (width, height) = frame.dimensions();
    Array4::from_shape_fn((1, height as usize, width as usize, 3), |(_, y, x, c)| {
        let pixel = frame.get_pixel(x as u32, y as u32);
        pixel[c] as f32 - CHANNEL_MEANS[c]
    })
}

/// Temporally ordered embeddings, padded to the configured length
#[derive(Debug, Clone)]
pub struct FrameFeatureSequence {
    embeddings: Vec<ArrayD<f32>>,
    real_frames: usize,
}

impl FrameFeatureSequence {
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Number of leading embeddings that came from video frames
    pub fn real_frames(&self) -> usize {
        self.real_frames
    }

    pub fn embeddings(&self) -> &[ArrayD<f32>] {
        &self.embeddings
    }

    pub fn embedding_shape(&self) -> &[usize] {
        self.embeddings.first().map(|e| e.shape()).unwrap_or(&[])
    }

    /// Stack into a single-example batch `[1, len, ...embedding_shape]`
    pub fn to_batch(&self) -> PipelineResult<ArrayD<f32>> {
        let views: Vec<_> = self.embeddings.iter().map(|e| e.view()).collect();
        let stacked = ndarray::stack(Axis(0), &views).map_err(|e| PipelineError::ShapeMismatch {
            input: "frame sequence",
            expected: format!("{:?} per frame", self.embedding_shape()),
            actual: e.to_string(),
        })?;
        Ok(stacked.insert_axis(Axis(0)))
    }
}

/// Pad or trim embeddings to exactly `sequence_length` entries
///
/// Zero embeddings shaped like the first real one are appended at the tail.
pub fn pad_sequence(
    mut embeddings: Vec<ArrayD<f32>>,
    sequence_length: usize,
) -> PipelineResult<FrameFeatureSequence> {
    let template_shape = embeddings
        .first()
        .ok_or(PipelineError::EmptyFrameSequence)?
        .raw_dim();

    if let Some(odd) = embeddings.iter().find(|e| e.raw_dim() != template_shape) {
        return Err(PipelineError::ShapeMismatch {
            input: "frame embedding",
            expected: format!("{:?}", template_shape.slice()),
            actual: format!("{:?}", odd.shape()),
        });
    }

    embeddings.truncate(sequence_length);
    let real_frames = embeddings.len();
    embeddings.resize_with(sequence_length, || ArrayD::zeros(template_shape.clone()));

    Ok(FrameFeatureSequence {
        embeddings,
        real_frames,
    })
}

/// Drives the backbone over sampled frames
#[derive(Clone)]
pub struct FrameFeatureExtractor {
    embedder: Arc<dyn FrameEmbedder>,
    sequence_length: usize,
}

impl FrameFeatureExtractor {
    pub fn new(embedder: Arc<dyn FrameEmbedder>, sequence_length: usize) -> Self {
        Self {
            embedder,
            sequence_length,
        }
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn extract(&self, frames: &[RgbImage]) -> PipelineResult<FrameFeatureSequence> {
        let mut embeddings = Vec::with_capacity(self.sequence_length);
        for frame in frames.iter().take(self.sequence_length) {
            embeddings.push(self.embedder.embed(frame)?);
        }
        debug!(
            "Embedded {} frames, padding to {}",
            embeddings.len(),
            self.sequence_length
        );

        pad_sequence(embeddings, self.sequence_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use image::Rgb;
    use ndarray::arr1;

    struct MeanEmbedder;

    impl FrameEmbedder for MeanEmbedder {
        fn embed(&self, frame: &RgbImage) -> PipelineResult<ArrayD<f32>> {
            let first = frame.get_pixel(0, 0);
            Ok(arr1(&[first[0] as f32, 1.0, 2.0]).into_dyn())
        }
    }

    fn frame(value: u8) -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb([value, value, value]))
    }

    #[test]
    fn test_preprocess_keeps_rgb_order_and_centres() {
        let frame = RgbImage::from_pixel(2, 3, Rgb([200, 100, 50]));
        let tensor = preprocess_frame(&frame);

        assert_eq!(tensor.shape(), &[1, 3, 2, 3]);
        assert!((tensor[[0, 0, 0, 0]] - (200.0 - 103.939)).abs() < 1e-4);
        assert!((tensor[[0, 2, 1, 1]] - (100.0 - 116.779)).abs() < 1e-4);
        assert!((tensor[[0, 1, 0, 2]] - (50.0 - 123.68)).abs() < 1e-4);
    }

    #[test]
    fn test_preprocess_follows_pixel_position() {
        let mut frame = RgbImage::new(2, 1);
        frame.put_pixel(1, 0, Rgb([255, 0, 0]));
        let tensor = preprocess_frame(&frame);

        assert!((tensor[[0, 0, 1, 0]] - (255.0 - 103.939)).abs() < 1e-4);
        assert!((tensor[[0, 0, 0, 0]] + 103.939).abs() < 1e-4);
    }

    #[test]
    fn test_short_sequence_is_padded_at_tail() {
        let extractor = FrameFeatureExtractor::new(Arc::new(MeanEmbedder), 30);
        let frames: Vec<RgbImage> = (1..=10).map(frame).collect();

        let sequence = extractor.extract(&frames).unwrap();

        assert_eq!(sequence.len(), 30);
        assert_eq!(sequence.real_frames(), 10);
        for (i, embedding) in sequence.embeddings()[..10].iter().enumerate() {
            assert_eq!(embedding[[0]], (i + 1) as f32);
        }
        assert!(sequence.embeddings()[10..]
            .iter()
            .all(|e| e.shape() == [3] && e.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn test_long_sequence_is_trimmed() {
        let embeddings: Vec<ArrayD<f32>> = (0..40).map(|i| arr1(&[i as f32]).into_dyn()).collect();
        let sequence = pad_sequence(embeddings, 30).unwrap();
        assert_eq!(sequence.len(), 30);
        assert_eq!(sequence.real_frames(), 30);
        assert_eq!(sequence.embeddings()[29][[0]], 29.0);
    }

    #[test]
    fn test_empty_sequence_cannot_be_padded() {
        assert_matches!(pad_sequence(Vec::new(), 30), Err(PipelineError::EmptyFrameSequence));
    }

    #[test]
    fn test_mixed_embedding_shapes_are_rejected() {
        let embeddings = vec![arr1(&[1.0f32, 2.0]).into_dyn(), arr1(&[1.0f32]).into_dyn()];
        assert_matches!(
            pad_sequence(embeddings, 4),
            Err(PipelineError::ShapeMismatch { .. })
        );
    }

    #[test]
    fn test_batch_has_leading_unit_dimension() {
        let embeddings = vec![ArrayD::<f32>::ones(IxDyn(&[7, 7, 2]))];
        let sequence = pad_sequence(embeddings, 5).unwrap();
        let batch = sequence.to_batch().unwrap();
        assert_eq!(batch.shape(), &[1, 5, 7, 7, 2]);
        assert_eq!(batch.sum(), 98.0);
    }
}
