// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::unnecessary_map_or)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # scanline_ocr
//!
//! Adaptive image normalisation and text decoding for scanned documents.
//!
//! ## Features
//!
//! - **Rasterizing**: Decode PNG/JPEG/WebP/TIFF/BMP with EXIF orientation,
//!   bounded to a maximum side; PDF pages via a pluggable rasterizer
//! - **Orientation**: Detect 90/180/270 degree page rotation and undo small
//!   skew with bicubic resampling
//! - **Enhancement**: Bilateral smoothing, CLAHE, adaptive thresholding and
//!   morphological cleanup
//! - **Line segmentation**: Horizontal projection analysis
//! - **Decode orchestration**: Quality-gated retries and per-line fallback
//!   with best-of-N selection
//! - **Engine cache**: One recognition engine per language set, initialised
//!   at most once per process
//! - **ONNX engine** (`onnx` feature): Text detection plus CTC recognition
//!   via ONNX Runtime
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use scanline_ocr::{EngineRegistry, OnnxEngine, Pipeline, PipelineConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(EngineRegistry::new(OnnxEngine::factory("models")));
//! registry.spawn_warmup(Default::default());
//!
//! let pipeline = Pipeline::new(registry);
//! let bytes = std::fs::read("scan.jpg")?;
//! let text = pipeline.process(&bytes, &PipelineConfig::default())?;
//! println!("{}", text);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Error handling
pub mod error;

// Configuration
pub mod config;

// Input
pub mod raster;

// Normalisation stages
pub mod enhance;
pub mod geometry;
pub mod orientation;
pub mod segment;

// Decoding
pub mod decode;
pub mod engine;

// Entry point
pub mod pipeline;

// Re-exports
pub use config::{
    EnhanceConfig, LanguageSet, Mode, OrientationConfig, PipelineConfig, PipelineConfigBuilder,
    SkewMethod,
};
pub use decode::{DecodeAttempt, DecodeOrchestrator, DecodeResult, QualityGate, Strategy};
pub use engine::{DecodingConfig, EngineRegistry, RecognitionEngine};
pub use error::{OcrError, OcrResult};
pub use orientation::{OrientationEstimate, Rotation};
pub use pipeline::{Pipeline, PAGE_BREAK};
pub use raster::{PageRasterizer, RasterImage};
pub use segment::{LineRegion, LineRegions};

#[cfg(feature = "onnx")]
#[cfg_attr(docsrs, doc(cfg(feature = "onnx")))]
pub use engine::{ModelPaths, ModelStore, OnnxEngine, OnnxEngineConfig};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
