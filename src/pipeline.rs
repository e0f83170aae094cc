//! End-to-end document processing.
//!
//! [`Pipeline::process`] is the single entry point collaborators call: raw
//! bytes in, decoded text out. Each page runs the stages in order:
//! orientation correction, enhancement, then the decode orchestrator.

use std::sync::Arc;

use crate::config::{LanguageSet, PipelineConfig};
use crate::decode::{DecodeContext, DecodeOrchestrator};
use crate::engine::{EngineRegistry, RecognitionEngine};
use crate::enhance::enhance;
use crate::error::{OcrError, OcrResult};
use crate::orientation::{is_flat, OrientationCorrector, OrientationDetector};
use crate::raster::{sniff, InputKind, PageRasterizer, RasterImage};
use crate::segment::LineRegions;

/// Separator placed between the texts of consecutive non-blank pages.
pub const PAGE_BREAK: &str = "\n\n--- PAGE BREAK ---\n\n";

/// Stateless document processor.
///
/// Holds only shared collaborators: the engine registry, an optional PDF
/// rasterizer and an optional page-orientation capability. Everything a
/// request creates lives on that request's stack, so one `Pipeline` can
/// serve any number of threads.
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<EngineRegistry>,
    rasterizer: Option<Arc<dyn PageRasterizer>>,
    orientation: Option<Arc<dyn OrientationDetector>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("registry", &self.registry)
            .field("rasterizer", &self.rasterizer.is_some())
            .field("orientation", &self.orientation.is_some())
            .finish()
    }
}

impl Pipeline {
    /// Create a pipeline over an engine registry.
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self {
            registry,
            rasterizer: None,
            orientation: None,
        }
    }

    /// Create a pipeline that uses one engine for every language set.
    pub fn with_engine(engine: Arc<dyn RecognitionEngine>) -> Self {
        Self::new(Arc::new(EngineRegistry::with_engine(engine)))
    }

    /// Enable multi-page input through a page rasterizer.
    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    /// Replace the built-in projection heuristic for coarse orientation.
    pub fn with_orientation_detector(mut self, detector: Arc<dyn OrientationDetector>) -> Self {
        self.orientation = Some(detector);
        self
    }

    /// The shared engine registry.
    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    /// Pre-initialise the engine for `languages`.
    pub fn warm(&self, languages: &LanguageSet) -> OcrResult<()> {
        self.registry.warm(languages)
    }

    /// Decode raw image or PDF bytes into text.
    ///
    /// Empty input yields empty text. PDF pages are decoded independently
    /// and joined with [`PAGE_BREAK`]; blank pages are dropped from the join.
    ///
    /// # Errors
    ///
    /// - [`OcrError::InputTooLarge`] when `bytes` exceeds the configured limit
    /// - [`OcrError::UnsupportedInput`] for undecodable bytes, or PDF input
    ///   without a rasterizer
    /// - a recognition failure when the engine cannot be built or fails on
    ///   its first attempt for a page
    pub fn process(&self, bytes: &[u8], config: &PipelineConfig) -> OcrResult<String> {
        if bytes.is_empty() {
            return Ok(String::new());
        }
        if bytes.len() > config.max_input_bytes {
            return Err(OcrError::InputTooLarge {
                size: bytes.len(),
                limit: config.max_input_bytes,
            });
        }

        match sniff(bytes) {
            InputKind::Pdf => {
                let rasterizer = self.rasterizer.as_ref().ok_or_else(|| {
                    OcrError::UnsupportedInput("PDF input needs a page rasterizer".to_string())
                })?;
                let pages = rasterizer.rasterize(bytes)?;
                log::debug!("Rasterized PDF into {} page(s)", pages.len());
                self.process_pages(&pages, config)
            },
            InputKind::Raster(format) => {
                log::debug!("Processing single {:?} raster", format);
                let raster = RasterImage::decode(bytes, config.max_dimension)?;
                self.process_raster(&raster, config)
            },
            InputKind::Unknown => Err(OcrError::UnsupportedInput(
                "bytes are neither an image nor a PDF".to_string(),
            )),
        }
    }

    /// Decode a sequence of encoded page images as one document.
    pub fn process_pages<P>(&self, pages: &[P], config: &PipelineConfig) -> OcrResult<String>
    where
        P: AsRef<[u8]>,
    {
        if pages.is_empty() {
            return Ok(String::new());
        }

        let engine = self.registry.acquire(&config.languages)?;
        let multi_page = pages.len() > 1;

        let mut texts = Vec::with_capacity(pages.len());
        for (index, page) in pages.iter().enumerate() {
            let raster = RasterImage::decode(page.as_ref(), config.max_dimension)?;
            let text = self.decode_page(&raster, config, &engine, multi_page)?;
            if text.trim().is_empty() {
                log::debug!("Page {} is blank, dropping it", index + 1);
            } else {
                texts.push(text);
            }
        }

        Ok(texts.join(PAGE_BREAK))
    }

    /// Decode an already-loaded single-page raster.
    pub fn process_raster(
        &self,
        raster: &RasterImage,
        config: &PipelineConfig,
    ) -> OcrResult<String> {
        let engine = self.registry.acquire(&config.languages)?;
        self.decode_page(raster, config, &engine, false)
    }

    fn decode_page(
        &self,
        raster: &RasterImage,
        config: &PipelineConfig,
        engine: &Arc<dyn RecognitionEngine>,
        multi_page: bool,
    ) -> OcrResult<String> {
        let mut corrector = OrientationCorrector::new(config.orientation.clone());
        if let Some(detector) = &self.orientation {
            corrector = corrector.with_detector(Arc::clone(detector));
        }

        let (oriented, estimate) = corrector.correct(raster);
        log::debug!(
            "Orientation: rotated {} deg, skew {:.2} deg (applied: {})",
            estimate.rotation.degrees(),
            estimate.skew_degrees,
            estimate.valid
        );

        if is_flat(&oriented.to_gray(), config.blank_spread) {
            log::debug!("No ink on page, skipping recognition");
            return Ok(String::new());
        }

        let enhanced = enhance(&oriented, config.mode, &config.enhance);

        let ctx = DecodeContext {
            mode: config.mode,
            multi_page,
            line_segmentation: config.line_segmentation,
            quality: config.quality,
        };
        let result = DecodeOrchestrator::new(Arc::clone(engine)).decode(
            &enhanced,
            None::<LineRegions>,
            &ctx,
        )?;
        Ok(result.text)
    }
}
