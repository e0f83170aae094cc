//! Pipeline configuration options.
//!
//! A [`PipelineConfig`] is supplied once per request and stays immutable for
//! the duration of that request. Every stage reads its own sub-configuration
//! from it; the builder clamps values into their working ranges instead of
//! rejecting them.

use std::fmt;

use crate::decode::QualityGate;
use crate::error::{OcrError, OcrResult};

/// Languages used when a request does not name any.
pub const DEFAULT_LANGUAGES: [&str; 2] = ["en", "es"];

/// Default upper bound on input size (20 MiB).
pub const DEFAULT_MAX_INPUT_BYTES: usize = 20 * 1024 * 1024;

/// Default upper bound on the larger raster side after loading.
pub const DEFAULT_MAX_DIMENSION: u32 = 2000;

/// Default intensity spread of a blank page.
pub const DEFAULT_BLANK_SPREAD: u8 = 4;

/// Normalised, order-independent set of language codes.
///
/// Codes are trimmed, lower-cased, deduplicated and kept sorted, so
/// `["EN", "es"]` and `["es", "en", "en"]` compare and hash equal. This is
/// the key of the process-wide engine registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LanguageSet(Vec<String>);

impl LanguageSet {
    /// Build a language set, rejecting input with no usable codes.
    pub fn new<I, S>(codes: I) -> OcrResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = codes
            .into_iter()
            .map(|c| c.as_ref().trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();

        if normalized.is_empty() {
            return Err(OcrError::Config("language set must not be empty".to_string()));
        }

        normalized.sort();
        normalized.dedup();
        Ok(Self(normalized))
    }

    /// Parse a comma-separated list such as `"es,en"`.
    ///
    /// Blank input yields the default set.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(',')).unwrap_or_default()
    }

    /// Language codes in sorted order.
    pub fn codes(&self) -> &[String] {
        &self.0
    }

    /// Whether the set contains `code` (case-insensitive).
    pub fn contains(&self, code: &str) -> bool {
        let code = code.trim().to_lowercase();
        self.0.binary_search(&code).is_ok()
    }

    /// Stable string key, e.g. `"en+es"`.
    pub fn key(&self) -> String {
        self.0.join("+")
    }
}

impl Default for LanguageSet {
    fn default() -> Self {
        Self(DEFAULT_LANGUAGES.iter().map(|s| s.to_string()).collect())
    }
}

impl fmt::Display for LanguageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Kind of writing on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Machine print
    #[default]
    Print,
    /// Handwriting; low-confidence by default, always decoded twice
    Handwriting,
}

impl Mode {
    /// Parse a request mode string. Only `"handwriting"` selects handwriting.
    pub fn parse(mode: &str) -> Self {
        if mode.trim().eq_ignore_ascii_case("handwriting") {
            Mode::Handwriting
        } else {
            Mode::Print
        }
    }

    /// Whether this is handwriting mode.
    pub fn is_handwriting(self) -> bool {
        self == Mode::Handwriting
    }
}

/// How the fine skew angle is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkewMethod {
    /// Minimum-area rectangle around all foreground pixels
    #[default]
    MinAreaRect,
    /// Median angle of Hough lines over Canny edges
    Hough,
}

/// Orientation corrector settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationConfig {
    /// Detect and undo 90/180/270 degree page rotation (default: true)
    pub detect_rotation: bool,
    /// Skew magnitudes below this are treated as noise (default: 0.5)
    pub skew_noise_floor: f32,
    /// Skew magnitudes above this are treated as misestimation (default: 15.0)
    pub skew_ceiling: f32,
    /// Skew measurement method (default: minimum-area rectangle)
    pub skew_method: SkewMethod,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            detect_rotation: true,
            skew_noise_floor: 0.5,
            skew_ceiling: 15.0,
            skew_method: SkewMethod::MinAreaRect,
        }
    }
}

/// Edge-preserving smoothing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BilateralParams {
    /// Neighbourhood radius in pixels (diameter is `2 * radius + 1`)
    pub radius: u32,
    /// Intensity sigma; smaller values preserve weaker edges
    pub sigma_color: f32,
    /// Spatial sigma in pixels
    pub sigma_space: f32,
}

impl Default for BilateralParams {
    fn default() -> Self {
        Self {
            radius: 4,
            sigma_color: 90.0,
            sigma_space: 90.0,
        }
    }
}

/// Tile-based contrast equalisation parameters (CLAHE).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaheParams {
    /// Histogram clip limit relative to the mean bin height
    pub clip_limit: f32,
    /// Number of tiles along each axis
    pub tiles: u32,
}

impl Default for ClaheParams {
    fn default() -> Self {
        Self {
            clip_limit: 3.0,
            tiles: 8,
        }
    }
}

/// Locally thresholded binarisation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveThresholdParams {
    /// Odd window size in pixels
    pub window: u32,
    /// Offset subtracted from the local mean
    pub bias: i32,
}

impl Default for AdaptiveThresholdParams {
    fn default() -> Self {
        Self { window: 31, bias: 10 }
    }
}

/// Enhancer settings. Every step can be switched off independently.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhanceConfig {
    /// Upscale when the larger side is below this (None disables, default: 1000)
    pub upscale_below: Option<u32>,
    /// Upscale factor for print (default: 1.5)
    pub print_scale: f32,
    /// Upscale factor for handwriting (default: 2.0)
    pub handwriting_scale: f32,
    /// Bilateral smoothing (default: enabled)
    pub smoothing: Option<BilateralParams>,
    /// Local contrast equalisation (default: enabled)
    pub equalization: Option<ClaheParams>,
    /// Adaptive binarisation (default: enabled)
    pub binarization: Option<AdaptiveThresholdParams>,
    /// Morphological opening to drop isolated specks (default: true)
    pub remove_specks: bool,
    /// Dilate ink in handwriting mode to reconnect strokes (default: true)
    pub reconnect_strokes: bool,
    /// Force dark ink on a light background (default: true)
    pub normalize_polarity: bool,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            upscale_below: Some(1000),
            print_scale: 1.5,
            handwriting_scale: 2.0,
            smoothing: Some(BilateralParams::default()),
            equalization: Some(ClaheParams::default()),
            binarization: Some(AdaptiveThresholdParams::default()),
            remove_specks: true,
            reconnect_strokes: true,
            normalize_polarity: true,
        }
    }
}

impl EnhanceConfig {
    /// Configuration with every step disabled.
    pub fn disabled() -> Self {
        Self {
            upscale_below: None,
            print_scale: 1.0,
            handwriting_scale: 1.0,
            smoothing: None,
            equalization: None,
            binarization: None,
            remove_specks: false,
            reconnect_strokes: false,
            normalize_polarity: false,
        }
    }
}

/// Per-request configuration for the whole pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Recognition languages (default: en, es)
    pub languages: LanguageSet,
    /// Print or handwriting (default: print)
    pub mode: Mode,
    /// Maximum accepted input size in bytes (default: 20 MiB)
    pub max_input_bytes: usize,
    /// Maximum raster side after loading (default: 2000)
    pub max_dimension: u32,
    /// Allow per-line decoding of multi-page print input (default: true)
    pub line_segmentation: bool,
    /// Orientation corrector settings
    pub orientation: OrientationConfig,
    /// Enhancer settings
    pub enhance: EnhanceConfig,
    /// Decode quality gate thresholds
    pub quality: QualityGate,
    /// Pages whose intensities span at most this many levels are blank
    /// and skip recognition (default: 4)
    pub blank_spread: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            languages: LanguageSet::default(),
            mode: Mode::Print,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            max_dimension: DEFAULT_MAX_DIMENSION,
            line_segmentation: true,
            orientation: OrientationConfig::default(),
            enhance: EnhanceConfig::default(),
            quality: QualityGate::default(),
            blank_spread: DEFAULT_BLANK_SPREAD,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for custom configuration.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }
}

/// Builder for PipelineConfig with fluent API.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    /// Set the language set.
    pub fn languages(mut self, languages: LanguageSet) -> Self {
        self.config.languages = languages;
        self
    }

    /// Set the writing mode.
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Shorthand for `mode(Mode::Handwriting)` / `mode(Mode::Print)`.
    pub fn handwriting(self, handwriting: bool) -> Self {
        self.mode(if handwriting { Mode::Handwriting } else { Mode::Print })
    }

    /// Set the maximum accepted input size in bytes.
    pub fn max_input_bytes(mut self, limit: usize) -> Self {
        self.config.max_input_bytes = limit.max(1);
        self
    }

    /// Set the maximum raster side.
    pub fn max_dimension(mut self, max_side: u32) -> Self {
        self.config.max_dimension = max_side.max(32);
        self
    }

    /// Enable or disable per-line decoding.
    pub fn line_segmentation(mut self, enabled: bool) -> Self {
        self.config.line_segmentation = enabled;
        self
    }

    /// Enable or disable coarse rotation detection.
    pub fn detect_rotation(mut self, enabled: bool) -> Self {
        self.config.orientation.detect_rotation = enabled;
        self
    }

    /// Set the skew acceptance window in degrees.
    pub fn skew_limits(mut self, noise_floor: f32, ceiling: f32) -> Self {
        let floor = noise_floor.clamp(0.0, 45.0);
        self.config.orientation.skew_noise_floor = floor;
        self.config.orientation.skew_ceiling = ceiling.clamp(floor, 45.0);
        self
    }

    /// Set the skew measurement method.
    pub fn skew_method(mut self, method: SkewMethod) -> Self {
        self.config.orientation.skew_method = method;
        self
    }

    /// Replace the enhancer settings.
    pub fn enhance(mut self, enhance: EnhanceConfig) -> Self {
        self.config.enhance = enhance;
        self
    }

    /// Set the adaptive threshold window and bias.
    pub fn threshold(mut self, window: u32, bias: i32) -> Self {
        // Window must be odd and at least 3
        let window = window.max(3) | 1;
        self.config.enhance.binarization = Some(AdaptiveThresholdParams { window, bias });
        self
    }

    /// Set the quality gate thresholds.
    pub fn quality(mut self, min_chars: usize, max_symbols: usize) -> Self {
        self.config.quality = QualityGate {
            min_chars,
            max_symbols: max_symbols.max(1),
        };
        self
    }

    /// Set the intensity spread at or below which a page counts as blank.
    pub fn blank_spread(mut self, spread: u8) -> Self {
        self.config.blank_spread = spread;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}
