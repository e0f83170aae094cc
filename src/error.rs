//! Error types for the normalisation and decoding pipeline.
//!
//! Only two kinds of failure ever leave the pipeline: input that cannot be
//! turned into a raster, and a recognition engine that fails on its very
//! first attempt. Degenerate geometry (blank pages, no detectable lines,
//! no usable skew signal) is absorbed by the stages and never shows up here.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type OcrResult<T> = std::result::Result<T, OcrError>;

/// Errors that can occur while processing a document.
#[derive(Debug, Error)]
pub enum OcrError {
    /// Bytes are neither a decodable raster nor a supported multi-page format
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    /// Input exceeds the configured byte limit
    #[error("Input too large: {size} bytes (limit {limit} bytes)")]
    InputTooLarge {
        /// Size of the rejected input in bytes
        size: usize,
        /// Configured limit in bytes
        limit: usize,
    },

    /// The recognition engine failed and no earlier attempt succeeded
    #[error("Recognition failed: {0}")]
    Recognition(String),

    /// Failed to load a recognition model
    #[error("Failed to load OCR model: {0}")]
    ModelLoad(String),

    /// Failed during model inference
    #[error("OCR inference failed: {0}")]
    Inference(String),

    /// Character dictionary error
    #[error("Character dictionary error: {0}")]
    Dictionary(String),

    /// Invalid configuration
    #[error("OCR configuration error: {0}")]
    Config(String),

    /// Raster decoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error (model files, dictionaries)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OcrError {
    /// Whether this error means the engine could not read the document.
    ///
    /// Collaborators record these against the stored result as an error
    /// state, as opposed to a successful run that produced empty text.
    pub fn is_recognition_failure(&self) -> bool {
        matches!(
            self,
            OcrError::Recognition(_) | OcrError::ModelLoad(_) | OcrError::Inference(_)
        )
    }

    /// Whether the input itself was rejected before any processing.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            OcrError::UnsupportedInput(_) | OcrError::InputTooLarge { .. } | OcrError::Image(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OcrError::ModelLoad("rec.onnx not found".to_string());
        assert!(err.to_string().contains("rec.onnx"));

        let err = OcrError::InputTooLarge { size: 30, limit: 20 };
        assert_eq!(err.to_string(), "Input too large: 30 bytes (limit 20 bytes)");
    }

    #[test]
    fn test_error_classification() {
        assert!(OcrError::Recognition("engine crashed".into()).is_recognition_failure());
        assert!(OcrError::Inference("bad shape".into()).is_recognition_failure());
        assert!(!OcrError::UnsupportedInput("zip".into()).is_recognition_failure());

        assert!(OcrError::UnsupportedInput("zip".into()).is_input_error());
        assert!(OcrError::InputTooLarge { size: 2, limit: 1 }.is_input_error());
        assert!(!OcrError::Config("empty".into()).is_input_error());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "det.onnx");
        let err: OcrError = io.into();
        assert!(matches!(err, OcrError::Io(_)));
        assert!(err.to_string().contains("det.onnx"));
    }
}
