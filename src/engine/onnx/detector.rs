//! Text region detection with a DB-style segmentation model.
//!
//! The model produces a per-pixel text probability map; boxes are extracted
//! from it by [`extract_boxes`](super::postprocessor::extract_boxes).

use std::path::Path;

use image::DynamicImage;
use ndarray::{Array2, Array4};
use ort::session::Session;
use ort::value::TensorRef;
use parking_lot::Mutex;

use super::config::OnnxEngineConfig;
use super::postprocessor::{extract_boxes, BoxParams, DetectedBox};
use super::preprocessor::preprocess_for_detection;
use crate::error::{OcrError, OcrResult};

/// Build an ONNX Runtime session from model bytes.
pub(super) fn build_session(model_bytes: &[u8], num_threads: usize) -> OcrResult<Session> {
    Session::builder()
        .map_err(|e| OcrError::ModelLoad(format!("Failed to create session builder: {}", e)))?
        .with_intra_threads(num_threads)
        .map_err(|e| OcrError::ModelLoad(format!("Failed to set threads: {}", e)))?
        .commit_from_memory(model_bytes)
        .map_err(|e| OcrError::ModelLoad(format!("Failed to load model: {}", e)))
}

/// Text detector backed by an ONNX segmentation model.
pub struct TextDetector {
    session: Mutex<Session>,
    config: OnnxEngineConfig,
}

impl TextDetector {
    /// Load the detection model from a file.
    pub fn new(model_path: impl AsRef<Path>, config: OnnxEngineConfig) -> OcrResult<Self> {
        let model_bytes = std::fs::read(model_path.as_ref())
            .map_err(|e| OcrError::ModelLoad(format!("Failed to read model file: {}", e)))?;

        Self::from_bytes(&model_bytes, config)
    }

    /// Load the detection model from memory.
    pub fn from_bytes(model_bytes: &[u8], config: OnnxEngineConfig) -> OcrResult<Self> {
        let session = build_session(model_bytes, config.num_threads)?;
        Ok(Self {
            session: Mutex::new(session),
            config,
        })
    }

    /// Detect text regions.
    ///
    /// `low_text` is the per-pixel probability for a pixel to count as text;
    /// `text_threshold` the mean probability a region needs to be kept.
    pub fn detect(
        &self,
        image: &DynamicImage,
        low_text: f32,
        text_threshold: f32,
    ) -> OcrResult<Vec<DetectedBox>> {
        let (input_tensor, scale) = preprocess_for_detection(image, self.config.det_max_side)?;
        let prob_map = self.run_inference(&input_tensor)?;

        extract_boxes(
            prob_map.view(),
            &BoxParams {
                low_text,
                text_threshold,
                max_candidates: self.config.max_candidates,
                unclip_ratio: self.config.unclip_ratio,
                scale,
            },
        )
    }

    fn run_inference(&self, input: &Array4<f32>) -> OcrResult<Array2<f32>> {
        let mut session = self.session.lock();

        let input_tensor = TensorRef::from_array_view(input)
            .map_err(|e| OcrError::Inference(format!("Failed to create input tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs!["x" => input_tensor])
            .map_err(|e| OcrError::Inference(format!("Inference failed: {}", e)))?;

        let (_, output_tensor) = outputs
            .iter()
            .next()
            .ok_or_else(|| OcrError::Inference("No output tensor found".to_string()))?;

        let output_array = output_tensor
            .try_extract_array::<f32>()
            .map_err(|e| OcrError::Inference(format!("Failed to extract output: {}", e)))?;

        // [N, 1, H, W] -> [H, W]
        let shape = output_array.shape();
        if shape.len() != 4 {
            return Err(OcrError::Inference(format!(
                "Unexpected output shape: {:?}, expected 4D tensor",
                shape
            )));
        }

        let (height, width) = (shape[2], shape[3]);
        Ok(Array2::from_shape_fn((height, width), |(y, x)| output_array[[0, 0, y, x]]))
    }
}

impl std::fmt::Debug for TextDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextDetector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
