//! Text line recognition with a CTC sequence model.

use std::path::Path;

use image::DynamicImage;
use ndarray::{Array2, Array4};
use ort::session::Session;
use ort::value::TensorRef;
use parking_lot::Mutex;

use super::config::OnnxEngineConfig;
use super::ctc::{self, CtcOutput};
use super::detector::build_session;
use super::preprocessor::preprocess_for_recognition;
use crate::engine::Decoder;
use crate::error::{OcrError, OcrResult};

/// Result of recognising a single text region.
#[derive(Debug, Clone)]
pub struct RecognitionResult {
    /// Recognized text
    pub text: String,
    /// Geometric mean of the character confidences (0.0 - 1.0)
    pub confidence: f32,
}

/// Text recognizer backed by an ONNX CTC model.
pub struct TextRecognizer {
    session: Mutex<Session>,
    dictionary: Vec<char>,
    config: OnnxEngineConfig,
}

impl TextRecognizer {
    /// Load the recognition model and its dictionary from files.
    pub fn new(
        model_path: impl AsRef<Path>,
        dict_path: impl AsRef<Path>,
        config: OnnxEngineConfig,
    ) -> OcrResult<Self> {
        let model_bytes = std::fs::read(model_path.as_ref())
            .map_err(|e| OcrError::ModelLoad(format!("Failed to read model file: {}", e)))?;

        let dict_content = std::fs::read_to_string(dict_path.as_ref())
            .map_err(|e| OcrError::Dictionary(format!("Failed to read dictionary: {}", e)))?;

        Self::from_bytes(&model_bytes, &dict_content, config)
    }

    /// Load the recognition model and dictionary from memory.
    pub fn from_bytes(
        model_bytes: &[u8],
        dict_content: &str,
        config: OnnxEngineConfig,
    ) -> OcrResult<Self> {
        let dictionary = parse_dictionary(dict_content)?;
        let session = build_session(model_bytes, config.num_threads)?;

        Ok(Self {
            session: Mutex::new(session),
            dictionary,
            config,
        })
    }

    /// Recognize the text in one cropped region.
    pub fn recognize(&self, crop: &DynamicImage, decoder: Decoder) -> OcrResult<RecognitionResult> {
        let input_tensor = preprocess_for_recognition(crop, self.config.rec_target_height)?;
        let probs = self.run_inference(&input_tensor)?;

        let decoded = match decoder {
            Decoder::Greedy => ctc::greedy(probs.view()),
            Decoder::BeamSearch { width } => ctc::beam_search(probs.view(), width),
        };
        Ok(self.to_result(decoded))
    }

    fn to_result(&self, decoded: CtcOutput) -> RecognitionResult {
        let text = decoded
            .labels
            .iter()
            .filter_map(|&label| self.dictionary.get(label))
            .collect();

        RecognitionResult {
            text,
            confidence: decoded.confidence(),
        }
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

        let output = output_tensor
            .try_extract_array::<f32>()
            .map_err(|e| OcrError::Inference(format!("Failed to extract output: {}", e)))?;

        // [N, T, C] or [T, C] softmax scores
        let shape = output.shape().to_vec();
        match shape.len() {
            2 => Ok(Array2::from_shape_fn((shape[0], shape[1]), |(t, c)| output[[t, c]])),
            3 => Ok(Array2::from_shape_fn((shape[1], shape[2]), |(t, c)| output[[0, t, c]])),
            _ => Err(OcrError::Inference(format!(
                "Unexpected output shape: {:?}, expected 2D or 3D tensor",
                shape
            ))),
        }
    }
}

impl std::fmt::Debug for TextRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRecognizer")
            .field("dictionary_size", &self.dictionary.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Parse a character dictionary, one character per line.
///
/// Index 0 is reserved for the CTC blank and a space is appended after the
/// listed characters.
fn parse_dictionary(content: &str) -> OcrResult<Vec<char>> {
    let listed: Vec<char> = content
        .lines()
        .filter_map(|line| line.trim_end_matches('\r').chars().next())
        .collect();

    if listed.is_empty() {
        return Err(OcrError::Dictionary("Dictionary is empty".to_string()));
    }

    let mut chars = Vec::with_capacity(listed.len() + 2);
    chars.push('\0');
    chars.extend(listed);
    chars.push(' ');
    Ok(chars)
}
