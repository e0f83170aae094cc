//! ONNX engine configuration options.

use std::path::{Path, PathBuf};

use crate::config::LanguageSet;
use crate::error::{OcrError, OcrResult};

/// Configuration for the ONNX recognition engine.
#[derive(Debug, Clone)]
pub struct OnnxEngineConfig {
    /// Recognition confidence threshold (0.0 - 1.0, default: 0.5)
    pub rec_threshold: f32,

    /// Maximum side length for detection input (default: 960)
    pub det_max_side: u32,

    /// Target height for recognition input (default: 48)
    pub rec_target_height: u32,

    /// Number of inference threads (default: 4)
    pub num_threads: usize,

    /// Unclip ratio for expanding detected boxes (default: 1.5)
    pub unclip_ratio: f32,

    /// Maximum number of text box candidates (default: 1000)
    pub max_candidates: usize,
}

impl Default for OnnxEngineConfig {
    fn default() -> Self {
        Self {
            rec_threshold: 0.5,
            det_max_side: 960,
            rec_target_height: 48,
            num_threads: 4,
            unclip_ratio: 1.5,
            max_candidates: 1000,
        }
    }
}

impl OnnxEngineConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set recognition threshold.
    pub fn rec_threshold(mut self, threshold: f32) -> Self {
        self.rec_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set maximum side length for detection.
    pub fn det_max_side(mut self, max_side: u32) -> Self {
        self.det_max_side = max_side.max(32);
        self
    }

    /// Set target height for recognition.
    pub fn rec_target_height(mut self, height: u32) -> Self {
        self.rec_target_height = height.max(16);
        self
    }

    /// Set number of inference threads.
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads.max(1);
        self
    }

    /// Set unclip ratio for box expansion.
    pub fn unclip_ratio(mut self, ratio: f32) -> Self {
        self.unclip_ratio = ratio.max(1.0);
        self
    }

    /// Set maximum number of text box candidates.
    pub fn max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max.max(1);
        self
    }
}

/// Model files for one language set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    /// Text detection model
    pub detector: PathBuf,
    /// Text recognition model
    pub recognizer: PathBuf,
    /// Character dictionary, one entry per line
    pub dictionary: PathBuf,
}

/// On-disk layout of models, one directory per language set.
///
/// ```text
/// <root>/en+es/det.onnx
/// <root>/en+es/rec.onnx
/// <root>/en+es/dict.txt
/// ```
///
/// A set without its own directory falls back to files directly under
/// `<root>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    /// Model store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locate the model files for `languages`.
    pub fn locate(&self, languages: &LanguageSet) -> OcrResult<ModelPaths> {
        let dedicated = self.root.join(languages.key());
        let dir = if dedicated.is_dir() {
            dedicated
        } else {
            self.root.clone()
        };

        let paths = ModelPaths {
            detector: dir.join("det.onnx"),
            recognizer: dir.join("rec.onnx"),
            dictionary: dir.join("dict.txt"),
        };

        for path in [&paths.detector, &paths.recognizer, &paths.dictionary] {
            if !path.is_file() {
                return Err(OcrError::ModelLoad(format!(
                    "missing model file {} for languages [{}]",
                    path.display(),
                    languages
                )));
            }
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_clamping() {
        let config = OnnxEngineConfig::new()
            .rec_threshold(1.7)
            .det_max_side(8)
            .rec_target_height(4)
            .num_threads(0)
            .unclip_ratio(0.5)
            .max_candidates(0);

        assert!((config.rec_threshold - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.det_max_side, 32);
        assert_eq!(config.rec_target_height, 16);
        assert_eq!(config.num_threads, 1);
        assert!((config.unclip_ratio - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.max_candidates, 1);
    }

    #[test]
    fn test_missing_models_reported() {
        let store = ModelStore::new(std::env::temp_dir().join("scanline-ocr-no-models"));
        let err = store.locate(&LanguageSet::default()).unwrap_err();

        assert!(matches!(err, OcrError::ModelLoad(_)));
        assert!(err.to_string().contains("det.onnx"));
    }
}
