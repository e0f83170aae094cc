//! Recognition engine capability and the process-wide engine registry.
//!
//! The pipeline never reads text itself; it hands a normalised raster and a
//! [`DecodingConfig`] to a [`RecognitionEngine`]. Engines are expensive to
//! build (model loading), so they live in an [`EngineRegistry`] keyed by
//! language set and are initialised at most once per key.
//!
//! With the `onnx` feature enabled, [`OnnxEngine`] provides a detection plus
//! CTC recognition engine backed by ONNX Runtime.

mod registry;

#[cfg(feature = "onnx")]
mod onnx;

pub use registry::{EngineFactory, EngineRegistry};

#[cfg(feature = "onnx")]
pub use onnx::{ModelPaths, ModelStore, OnnxEngine, OnnxEngineConfig};

use crate::error::OcrResult;
use crate::raster::RasterImage;

/// How detected text regions are assembled into output text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Merge regions into paragraphs, favouring coherent multi-line output
    Paragraph,
    /// Emit every detected region as its own line
    Blocks,
    /// Treat the whole raster as a single line of text (no detection)
    SingleLine,
}

/// Sequence decoding algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    /// Prefix beam search keeping `width` candidates per step
    BeamSearch {
        /// Number of prefixes kept per step
        width: usize,
    },
    /// Best class per step (cheapest)
    Greedy,
}

/// Detection and contrast thresholds passed to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum region confidence to keep a text region (default: 0.7)
    pub text_threshold: f32,
    /// Per-pixel text score to count as text (default: 0.4)
    pub low_text: f32,
    /// Regions with contrast below this are read a second time (default: 0.1)
    pub contrast_threshold: f32,
    /// Target contrast for that second reading (default: 0.5)
    pub adjust_contrast: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            text_threshold: 0.7,
            low_text: 0.4,
            contrast_threshold: 0.1,
            adjust_contrast: 0.5,
        }
    }
}

/// One way of asking the engine to read a raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodingConfig {
    /// Region assembly
    pub layout: Layout,
    /// Sequence decoding algorithm
    pub decoder: Decoder,
    /// Detection and contrast thresholds
    pub thresholds: Thresholds,
}

impl DecodingConfig {
    /// Default beam width for beam-search decoding.
    pub const BEAM_WIDTH: usize = 5;

    /// Paragraph-aware beam search; first pass for machine print.
    pub fn paragraph() -> Self {
        Self {
            layout: Layout::Paragraph,
            decoder: Decoder::BeamSearch {
                width: Self::BEAM_WIDTH,
            },
            thresholds: Thresholds::default(),
        }
    }

    /// Conservative first pass for handwriting.
    ///
    /// Regions are kept separate and thresholds are tuned for faint,
    /// low-contrast strokes.
    pub fn handwriting() -> Self {
        Self {
            layout: Layout::Blocks,
            decoder: Decoder::BeamSearch {
                width: Self::BEAM_WIDTH,
            },
            thresholds: Thresholds {
                text_threshold: 0.6,
                low_text: 0.3,
                contrast_threshold: 0.1,
                adjust_contrast: 0.5,
            },
        }
    }

    /// Cheaper greedy pass used when the first attempt looks poor.
    pub fn greedy() -> Self {
        Self {
            layout: Layout::Blocks,
            decoder: Decoder::Greedy,
            thresholds: Thresholds::default(),
        }
    }

    /// Single text line, used for per-line decoding of segmented crops.
    pub fn single_line() -> Self {
        Self {
            layout: Layout::SingleLine,
            decoder: Decoder::BeamSearch {
                width: Self::BEAM_WIDTH,
            },
            thresholds: Thresholds::default(),
        }
    }

    /// Whether this configuration uses beam search.
    pub fn is_beam_search(&self) -> bool {
        matches!(self.decoder, Decoder::BeamSearch { .. })
    }
}

/// Opaque text recognition capability.
///
/// Implementations must be shareable across threads; the registry hands the
/// same instance to every request that uses its language set.
pub trait RecognitionEngine: Send + Sync {
    /// Read the text in `raster` using the given decoding strategy.
    fn recognize(&self, raster: &RasterImage, config: &DecodingConfig) -> OcrResult<String>;
}

impl<F> RecognitionEngine for F
where
    F: Fn(&RasterImage, &DecodingConfig) -> OcrResult<String> + Send + Sync,
{
    fn recognize(&self, raster: &RasterImage, config: &DecodingConfig) -> OcrResult<String> {
        self(raster, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_decoding_presets() {
        assert_eq!(DecodingConfig::paragraph().layout, Layout::Paragraph);
        assert!(DecodingConfig::paragraph().is_beam_search());

        let hand = DecodingConfig::handwriting();
        assert!(hand.is_beam_search());
        assert!((hand.thresholds.text_threshold - 0.6).abs() < f32::EPSILON);
        assert!((hand.thresholds.low_text - 0.3).abs() < f32::EPSILON);

        assert_eq!(DecodingConfig::greedy().decoder, Decoder::Greedy);
        assert_eq!(DecodingConfig::single_line().layout, Layout::SingleLine);
    }

    #[test]
    fn test_closure_engine() {
        let engine = |raster: &RasterImage, config: &DecodingConfig| -> OcrResult<String> {
            Ok(format!("{}x{} {:?}", raster.width(), raster.height(), config.layout))
        };
        let raster = RasterImage::from_gray(GrayImage::from_pixel(4, 3, Luma([255])));

        let text = engine.recognize(&raster, &DecodingConfig::greedy()).unwrap();
        assert_eq!(text, "4x3 Blocks");
    }
}
