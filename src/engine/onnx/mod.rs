//! Recognition engine backed by ONNX Runtime.
//!
//! Two models per language set: a segmentation model that finds text
//! regions and a CTC model that reads each region. See [`ModelStore`] for the
//! expected file layout.

mod config;
mod ctc;
mod detector;
mod postprocessor;
mod preprocessor;
mod recognizer;

pub use config::{ModelPaths, ModelStore, OnnxEngineConfig};

use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;

use self::detector::TextDetector;
use self::postprocessor::DetectedBox;
use self::preprocessor::{adjust_contrast, crop_text_region, region_contrast};
use self::recognizer::{RecognitionResult, TextRecognizer};
use super::{Decoder, DecodingConfig, Layout, RecognitionEngine, Thresholds};
use crate::config::LanguageSet;
use crate::error::OcrResult;
use crate::raster::RasterImage;

/// Recognized region with its bounds in raster coordinates.
#[derive(Debug, Clone)]
struct Span {
    text: String,
    confidence: f32,
    min_x: f32,
    min_y: f32,
    max_y: f32,
}

impl Span {
    fn center_y(&self) -> f32 {
        (self.min_y + self.max_y) / 2.0
    }

    fn height(&self) -> f32 {
        (self.max_y - self.min_y).max(1.0)
    }
}

/// Detection plus CTC recognition engine.
///
/// # Example
///
/// ```ignore
/// use scanline_ocr::{LanguageSet, ModelStore, OnnxEngine, OnnxEngineConfig};
///
/// let engine = OnnxEngine::load(
///     &ModelStore::new("models"),
///     &LanguageSet::parse("es,en"),
///     OnnxEngineConfig::default(),
/// )?;
/// ```
#[derive(Debug)]
pub struct OnnxEngine {
    detector: TextDetector,
    recognizer: TextRecognizer,
    config: OnnxEngineConfig,
}

impl OnnxEngine {
    /// Create an engine from explicit model and dictionary paths.
    pub fn new(paths: &ModelPaths, config: OnnxEngineConfig) -> OcrResult<Self> {
        let detector = TextDetector::new(&paths.detector, config.clone())?;
        let recognizer = TextRecognizer::new(&paths.recognizer, &paths.dictionary, config.clone())?;

        Ok(Self {
            detector,
            recognizer,
            config,
        })
    }

    /// Load the models for `languages` from a model store.
    pub fn load(
        store: &ModelStore,
        languages: &LanguageSet,
        config: OnnxEngineConfig,
    ) -> OcrResult<Self> {
        let paths = store.locate(languages)?;
        log::info!(
            "Loading ONNX models for [{}] from {}",
            languages,
            paths.detector.parent().unwrap_or(store.root()).display()
        );
        Self::new(&paths, config)
    }

    /// Registry factory that loads engines from `root` with default settings.
    pub fn factory(
        root: impl Into<PathBuf>,
    ) -> impl Fn(&LanguageSet) -> OcrResult<Arc<dyn RecognitionEngine>> + Send + Sync + 'static {
        Self::factory_with_config(root, OnnxEngineConfig::default())
    }

    /// Registry factory with explicit engine settings.
    pub fn factory_with_config(
        root: impl Into<PathBuf>,
        config: OnnxEngineConfig,
    ) -> impl Fn(&LanguageSet) -> OcrResult<Arc<dyn RecognitionEngine>> + Send + Sync + 'static {
        let store = ModelStore::new(root);
        move |languages: &LanguageSet| {
            let engine = Self::load(&store, languages, config.clone())?;
            Ok(Arc::new(engine) as Arc<dyn RecognitionEngine>)
        }
    }

    /// Engine settings.
    pub fn config(&self) -> &OnnxEngineConfig {
        &self.config
    }

    /// Read one region, re-reading with stretched contrast when it is faint.
    fn read_region(
        &self,
        crop: &DynamicImage,
        decoder: Decoder,
        thresholds: &Thresholds,
    ) -> OcrResult<RecognitionResult> {
        let first = self.recognizer.recognize(crop, decoder)?;
        if region_contrast(crop) >= thresholds.contrast_threshold {
            return Ok(first);
        }

        let adjusted = adjust_contrast(crop, thresholds.adjust_contrast);
        let second = self.recognizer.recognize(&adjusted, decoder)?;
        Ok(if second.confidence > first.confidence { second } else { first })
    }

    fn keep(&self, result: &RecognitionResult) -> bool {
        result.confidence >= self.config.rec_threshold && !result.text.trim().is_empty()
    }

    fn read_regions(
        &self,
        image: &DynamicImage,
        boxes: &[DetectedBox],
        config: &DecodingConfig,
    ) -> OcrResult<Vec<Span>> {
        let mut spans = Vec::with_capacity(boxes.len());

        for detected in boxes {
            let crop = crop_text_region(image, &detected.polygon)?;
            let result = self.read_region(&crop, config.decoder, &config.thresholds)?;
            if !self.keep(&result) {
                log::trace!("Dropping region with confidence {:.2}", result.confidence);
                continue;
            }

            let (min_x, min_y, _, max_y) = detected.bounds();
            spans.push(Span {
                text: result.text.trim().to_string(),
                confidence: result.confidence,
                min_x,
                min_y,
                max_y,
            });
        }

        Ok(spans)
    }
}

impl RecognitionEngine for OnnxEngine {
    fn recognize(&self, raster: &RasterImage, config: &DecodingConfig) -> OcrResult<String> {
        let image = raster.as_dynamic();

        if config.layout == Layout::SingleLine {
            let result = self.read_region(image, config.decoder, &config.thresholds)?;
            return Ok(if self.keep(&result) {
                result.text.trim().to_string()
            } else {
                String::new()
            });
        }

        let boxes = self
            .detector
            .detect(image, config.thresholds.low_text, config.thresholds.text_threshold)?;
        if boxes.is_empty() {
            return Ok(String::new());
        }

        let spans = self.read_regions(image, &boxes, config)?;
        log::debug!(
            "Read {} of {} regions (mean confidence {:.2})",
            spans.len(),
            boxes.len(),
            mean_confidence(&spans)
        );

        let lines = group_lines(spans);
        Ok(match config.layout {
            Layout::Paragraph => assemble_paragraphs(&lines),
            _ => assemble_blocks(&lines),
        })
    }
}

fn mean_confidence(spans: &[Span]) -> f32 {
    if spans.is_empty() {
        0.0
    } else {
        spans.iter().map(|s| s.confidence).sum::<f32>() / spans.len() as f32
    }
}

/// Group spans into text lines, top to bottom, each sorted left to right.
///
/// A span joins the current line when its vertical centre falls within half
/// a line height of the line's centre.
fn group_lines(mut spans: Vec<Span>) -> Vec<Vec<Span>> {
    spans.sort_by(|a, b| a.center_y().total_cmp(&b.center_y()));

    let mut lines: Vec<Vec<Span>> = Vec::new();
    for span in spans {
        let joins = lines.last().is_some_and(|line| {
            let center = line.iter().map(Span::center_y).sum::<f32>() / line.len() as f32;
            let height = line.iter().map(Span::height).sum::<f32>() / line.len() as f32;
            (span.center_y() - center).abs() <= height.max(span.height()) / 2.0
        });

        match lines.last_mut() {
            Some(line) if joins => line.push(span),
            _ => lines.push(vec![span]),
        }
    }

    for line in &mut lines {
        line.sort_by(|a, b| a.min_x.total_cmp(&b.min_x));
    }
    lines
}

/// Every region on its own output line, in reading order.
fn assemble_blocks(lines: &[Vec<Span>]) -> String {
    lines
        .iter()
        .flatten()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lines merged into paragraphs; a vertical gap larger than the line height
/// starts a new paragraph.
fn assemble_paragraphs(lines: &[Vec<Span>]) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut previous: Option<(f32, f32)> = None;

    for line in lines {
        let top = line.iter().map(|s| s.min_y).fold(f32::MAX, f32::min);
        let bottom = line.iter().map(|s| s.max_y).fold(f32::MIN, f32::max);
        let text = line.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");

        let continues =
            previous.is_some_and(|(prev_bottom, prev_height)| top - prev_bottom <= prev_height);
        match paragraphs.last_mut() {
            Some(paragraph) if continues => {
                paragraph.push(' ');
                paragraph.push_str(&text);
            },
            _ => paragraphs.push(text),
        }
        previous = Some((bottom, (bottom - top).max(1.0)));
    }

    paragraphs.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(text: &str, x: f32, y: f32) -> Span {
        Span {
            text: text.to_string(),
            confidence: 0.9,
            min_x: x,
            min_y: y,
            max_y: y + 20.0,
        }
    }

    #[test]
    fn test_group_lines_reading_order() {
        let spans = vec![
            span("Line2", 0.0, 50.0),
            span("World", 60.0, 3.0),
            span("Hello", 0.0, 0.0),
        ];

        let lines = group_lines(spans);
        assert_eq!(lines.len(), 2);
        assert_eq!(assemble_blocks(&lines), "Hello\nWorld\nLine2");
    }

    #[test]
    fn test_paragraphs_split_on_large_gap() {
        let spans = vec![
            span("The quick", 0.0, 0.0),
            span("brown fox", 0.0, 25.0),
            span("New paragraph", 0.0, 120.0),
        ];

        let lines = group_lines(spans);
        assert_eq!(assemble_paragraphs(&lines), "The quick brown fox\nNew paragraph");
    }

    #[test]
    fn test_words_on_one_line_join_with_space() {
        let lines = group_lines(vec![span("b", 40.0, 2.0), span("a", 0.0, 0.0)]);
        assert_eq!(assemble_paragraphs(&lines), "a b");
    }

    #[test]
    fn test_mean_confidence_empty() {
        assert_eq!(mean_confidence(&[]), 0.0);
    }

    #[test]
    #[ignore = "requires ONNX models under ./models"]
    fn test_load_from_model_store() {
        let engine = OnnxEngine::load(
            &ModelStore::new("models"),
            &LanguageSet::default(),
            OnnxEngineConfig::default(),
        );
        assert!(engine.is_ok());
    }
}
