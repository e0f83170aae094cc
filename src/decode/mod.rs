//! Decode orchestration: strategies, quality gating and best-of-N selection.
//!
//! A page is decoded by a small state machine:
//!
//! 1. **FullPage**: one engine call over the whole raster, paragraph-aware
//!    beam search for print or the conservative handwriting preset.
//! 2. **Retry**: a greedy pass over the same raster. Runs when the
//!    [`QualityGate`] rejects the first attempt, and always for handwriting.
//! 3. **PerLine**: only for print pages of multi-page documents with
//!    segmentation enabled, and only after the gate rejected the first
//!    attempt. Each line is decoded on its own and the results are joined.
//!
//! Every attempt carries a [`Score`]; the winner is the maximum under its
//! total order, ties going to the earlier attempt.

mod quality;

pub use quality::{count_noise_clusters, QualityGate, Verdict};

use std::sync::Arc;

use crate::config::Mode;
use crate::engine::{DecodingConfig, RecognitionEngine};
use crate::error::{OcrError, OcrResult};
use crate::raster::RasterImage;
use crate::segment::{segment, LineRegion};

/// Which decoding path produced an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Whole raster, first pass
    FullPage,
    /// Whole raster, greedy second pass
    Retry,
    /// Line-by-line over segmented crops
    PerLine,
}

/// Comparable quality of an attempt.
///
/// Ordered by gate acceptance first, then by length: longer output is taken
/// as a proxy for fewer dropped characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Score {
    /// Whether the attempt counts as usable
    pub accepted: bool,
    /// Length of the text in characters
    pub length: usize,
}

/// A single engine run and its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeAttempt {
    /// Decoding path
    pub strategy: Strategy,
    /// Engine configuration used (per-line attempts report the line preset)
    pub config: DecodingConfig,
    /// Trimmed text
    pub text: String,
    /// Quality score
    pub score: Score,
}

impl DecodeAttempt {
    fn new(strategy: Strategy, config: DecodingConfig, text: String, accepted: bool) -> Self {
        let text = text.trim().to_string();
        let score = Score {
            accepted,
            length: text.chars().count(),
        };
        Self {
            strategy,
            config,
            text,
            score,
        }
    }
}

/// Final text of a page plus every attempt that led to it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeResult {
    /// Winning text; empty for a blank page
    pub text: String,
    /// All attempts in execution order
    pub attempts: Vec<DecodeAttempt>,
    /// Index of the winning attempt
    pub selected: usize,
}

impl DecodeResult {
    /// The attempt whose text was returned.
    pub fn best(&self) -> Option<&DecodeAttempt> {
        self.attempts.get(self.selected)
    }

    /// Whether any attempt used `strategy`.
    pub fn tried(&self, strategy: Strategy) -> bool {
        self.attempts.iter().any(|a| a.strategy == strategy)
    }
}

/// Per-page facts the orchestrator needs beyond the raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeContext {
    /// Print or handwriting
    pub mode: Mode,
    /// Whether the page belongs to a multi-page document
    pub multi_page: bool,
    /// Whether per-line decoding is allowed
    pub line_segmentation: bool,
    /// Gate thresholds
    pub quality: QualityGate,
}

impl Default for DecodeContext {
    fn default() -> Self {
        Self {
            mode: Mode::Print,
            multi_page: false,
            line_segmentation: true,
            quality: QualityGate::default(),
        }
    }
}

/// Index of the best attempt; earlier attempts win ties.
pub fn select_best(attempts: &[DecodeAttempt]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, attempt) in attempts.iter().enumerate() {
        if best.map_or(true, |b| attempt.score > attempts[b].score) {
            best = Some(i);
        }
    }
    best
}

/// Drives a recognition engine through the decode strategies.
#[derive(Clone)]
pub struct DecodeOrchestrator {
    engine: Arc<dyn RecognitionEngine>,
}

impl std::fmt::Debug for DecodeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeOrchestrator").finish_non_exhaustive()
    }
}

impl DecodeOrchestrator {
    /// Create an orchestrator over `engine`.
    pub fn new(engine: Arc<dyn RecognitionEngine>) -> Self {
        Self { engine }
    }

    /// Decode one enhanced page.
    ///
    /// `lines` can carry a segmentation computed earlier; otherwise the page
    /// is segmented on demand when the per-line strategy runs.
    ///
    /// # Errors
    ///
    /// Only a failure of the very first engine call is returned, as a
    /// recognition failure. Later failures drop that attempt and keep the
    /// ones that succeeded.
    pub fn decode<I>(
        &self,
        raster: &RasterImage,
        lines: Option<I>,
        ctx: &DecodeContext,
    ) -> OcrResult<DecodeResult>
    where
        I: IntoIterator<Item = LineRegion>,
    {
        let handwriting = ctx.mode.is_handwriting();
        let mut attempts = Vec::with_capacity(3);

        let first = if handwriting {
            DecodingConfig::handwriting()
        } else {
            DecodingConfig::paragraph()
        };
        let text = self
            .engine
            .recognize(raster, &first)
            .map_err(as_recognition_failure)?;
        let verdict = ctx.quality.evaluate(text.trim(), ctx.mode);
        log::debug!("Full-page attempt: {:?}", verdict);
        attempts.push(DecodeAttempt::new(Strategy::FullPage, first, text, verdict.is_accepted()));

        if handwriting || !verdict.is_accepted() {
            let retry = DecodingConfig::greedy();
            match self.engine.recognize(raster, &retry) {
                Ok(text) => attempts.push(DecodeAttempt::new(Strategy::Retry, retry, text, true)),
                Err(e) => log::warn!("Retry attempt failed, keeping earlier result: {}", e),
            }
        }

        if !handwriting && ctx.multi_page && ctx.line_segmentation && !verdict.is_accepted() {
            // Per-line output competes on length alone with the current winner
            let rival_accepted = select_best(&attempts).is_some_and(|i| attempts[i].score.accepted);
            match self.decode_lines(raster, lines) {
                Ok(text) => attempts.push(DecodeAttempt::new(
                    Strategy::PerLine,
                    DecodingConfig::single_line(),
                    text,
                    rival_accepted,
                )),
                Err(e) => log::warn!("Per-line attempt failed, keeping earlier result: {}", e),
            }
        }

        let selected = select_best(&attempts).unwrap_or(0);
        let text = attempts
            .get(selected)
            .map(|a| a.text.clone())
            .unwrap_or_default();
        log::debug!(
            "Selected {:?} out of {} attempt(s), {} chars",
            attempts.get(selected).map(|a| a.strategy),
            attempts.len(),
            text.chars().count()
        );

        Ok(DecodeResult {
            text,
            attempts,
            selected,
        })
    }

    fn decode_lines<I>(&self, raster: &RasterImage, lines: Option<I>) -> OcrResult<String>
    where
        I: IntoIterator<Item = LineRegion>,
    {
        let regions: Vec<LineRegion> = match lines {
            Some(lines) => lines.into_iter().collect(),
            None => segment(raster).collect(),
        };
        log::debug!("Decoding {} segmented line(s)", regions.len());

        let config = DecodingConfig::single_line();
        let mut decoded = Vec::with_capacity(regions.len());
        for region in regions {
            let text = self.engine.recognize(&region.crop(raster), &config)?;
            let text = text.trim();
            if !text.is_empty() {
                decoded.push(text.to_string());
            }
        }
        Ok(decoded.join("\n"))
    }
}

fn as_recognition_failure(err: OcrError) -> OcrError {
    if err.is_recognition_failure() {
        err
    } else {
        OcrError::Recognition(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Decoder, Layout};
    use image::{GrayImage, Luma};
    use parking_lot::Mutex;

    /// Engine answering from a script keyed by layout and decoder.
    struct ScriptedEngine {
        full_page: OcrResult<String>,
        retry: OcrResult<String>,
        line: OcrResult<String>,
        calls: Mutex<Vec<DecodingConfig>>,
    }

    impl ScriptedEngine {
        fn new(full_page: &str, retry: &str, line: &str) -> Self {
            Self {
                full_page: Ok(full_page.to_string()),
                retry: Ok(retry.to_string()),
                line: Ok(line.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<DecodingConfig> {
            self.calls.lock().clone()
        }
    }

    fn replay(result: &OcrResult<String>) -> OcrResult<String> {
        match result {
            Ok(text) => Ok(text.clone()),
            Err(e) => Err(OcrError::Inference(e.to_string())),
        }
    }

    impl RecognitionEngine for ScriptedEngine {
        fn recognize(&self, _: &RasterImage, config: &DecodingConfig) -> OcrResult<String> {
            self.calls.lock().push(*config);
            match (config.layout, config.decoder) {
                (Layout::SingleLine, _) => replay(&self.line),
                (_, Decoder::Greedy) => replay(&self.retry),
                _ => replay(&self.full_page),
            }
        }
    }

    fn page() -> RasterImage {
        let mut img = GrayImage::from_pixel(200, 120, Luma([255]));
        for (top, bottom) in [(10, 30), (50, 70), (90, 110)] {
            for y in top..bottom {
                for x in 10..190 {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        RasterImage::from_gray(img)
    }

    fn run(engine: &Arc<ScriptedEngine>, ctx: &DecodeContext) -> OcrResult<DecodeResult> {
        let orchestrator =
            DecodeOrchestrator::new(Arc::clone(engine) as Arc<dyn RecognitionEngine>);
        orchestrator.decode(&page(), None::<Vec<LineRegion>>, ctx)
    }

    const GOOD: &str = "The quick brown fox jumps over the lazy dog.";

    #[test]
    fn test_good_print_single_attempt() {
        let engine = Arc::new(ScriptedEngine::new(GOOD, "unused", "unused"));
        let result = run(&engine, &DecodeContext::default()).unwrap();

        assert_eq!(result.text, GOOD);
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(engine.calls(), vec![DecodingConfig::paragraph()]);
    }

    #[test]
    fn test_short_print_triggers_retry() {
        let engine = Arc::new(ScriptedEngine::new(
            "too short",
            "a longer greedy reading here",
            "x",
        ));
        let result = run(&engine, &DecodeContext::default()).unwrap();

        assert!(result.tried(Strategy::Retry));
        assert_eq!(result.text, "a longer greedy reading here");
        assert_eq!(result.best().map(|a| a.strategy), Some(Strategy::Retry));
    }

    #[test]
    fn test_retry_replaces_rejected_attempt_even_if_shorter() {
        let engine = Arc::new(ScriptedEngine::new("|~ #} |~ #} |~ #} |~ #}", "clean", "x"));
        let result = run(&engine, &DecodeContext::default()).unwrap();

        assert_eq!(result.text, "clean");
    }

    #[test]
    fn test_handwriting_always_retries() {
        let engine = Arc::new(ScriptedEngine::new("0123456789", "retry text wins", "x"));
        let ctx = DecodeContext {
            mode: Mode::Handwriting,
            ..DecodeContext::default()
        };
        let result = run(&engine, &ctx).unwrap();

        assert_eq!(result.text, "retry text wins");
        assert_eq!(
            engine.calls(),
            vec![DecodingConfig::handwriting(), DecodingConfig::greedy()]
        );
    }

    #[test]
    fn test_handwriting_retry_runs_even_when_first_pass_is_good() {
        let engine = Arc::new(ScriptedEngine::new(GOOD, "short", "x"));
        let ctx = DecodeContext {
            mode: Mode::Handwriting,
            ..DecodeContext::default()
        };
        let result = run(&engine, &ctx).unwrap();

        assert!(result.tried(Strategy::Retry));
        assert_eq!(result.text, GOOD);
    }

    #[test]
    fn test_per_line_only_for_multi_page_print() {
        let engine = Arc::new(ScriptedEngine::new("short", "also short", "line"));
        let result = run(&engine, &DecodeContext::default()).unwrap();
        assert!(!result.tried(Strategy::PerLine));

        let ctx = DecodeContext {
            multi_page: true,
            ..DecodeContext::default()
        };
        let result = run(&engine, &ctx).unwrap();
        assert!(result.tried(Strategy::PerLine));
        assert_eq!(result.text, "line\nline\nline");

        let ctx = DecodeContext {
            multi_page: true,
            line_segmentation: false,
            ..DecodeContext::default()
        };
        assert!(!run(&engine, &ctx).unwrap().tried(Strategy::PerLine));

        let ctx = DecodeContext {
            multi_page: true,
            mode: Mode::Handwriting,
            ..DecodeContext::default()
        };
        assert!(!run(&engine, &ctx).unwrap().tried(Strategy::PerLine));
    }

    #[test]
    fn test_per_line_uses_supplied_regions() {
        let engine = Arc::new(ScriptedEngine::new("short", "short", "row"));
        let orchestrator =
            DecodeOrchestrator::new(Arc::clone(&engine) as Arc<dyn RecognitionEngine>);
        let ctx = DecodeContext {
            multi_page: true,
            ..DecodeContext::default()
        };
        let lines = vec![LineRegion { y1: 0, y2: 40 }, LineRegion { y1: 40, y2: 80 }];

        let result = orchestrator.decode(&page(), Some(lines), &ctx).unwrap();
        assert_eq!(result.text, "row\nrow");
    }

    #[test]
    fn test_first_failure_propagates() {
        let mut engine = ScriptedEngine::new("", "retry", "line");
        engine.full_page = Err(OcrError::Config("engine crashed".to_string()));
        let engine = Arc::new(engine);

        let err = run(&engine, &DecodeContext::default()).unwrap_err();
        assert!(err.is_recognition_failure());
        assert_eq!(engine.calls().len(), 1);
    }

    #[test]
    fn test_later_failure_keeps_first_attempt() {
        let mut engine = ScriptedEngine::new("short", "", "");
        engine.retry = Err(OcrError::Inference("timeout".to_string()));
        engine.line = Err(OcrError::Inference("timeout".to_string()));
        let ctx = DecodeContext {
            multi_page: true,
            ..DecodeContext::default()
        };

        let result = run(&Arc::new(engine), &ctx).unwrap();
        assert_eq!(result.text, "short");
        assert_eq!(result.attempts.len(), 1);
    }

    #[test]
    fn test_empty_per_line_does_not_beat_rejected_full_page() {
        let mut engine = ScriptedEngine::new("fifteen chars!!", "", "");
        engine.retry = Err(OcrError::Inference("timeout".to_string()));
        let engine = Arc::new(engine);
        let ctx = DecodeContext {
            multi_page: true,
            ..DecodeContext::default()
        };

        let result = run(&engine, &ctx).unwrap();
        assert!(result.tried(Strategy::PerLine));
        assert_eq!(result.text, "fifteen chars!!");
        assert_eq!(result.attempts[result.selected].strategy, Strategy::FullPage);
    }

    #[test]
    fn test_longer_per_line_beats_rejected_full_page() {
        let mut engine = ScriptedEngine::new("short", "", "a line");
        engine.retry = Err(OcrError::Inference("timeout".to_string()));
        let ctx = DecodeContext {
            multi_page: true,
            ..DecodeContext::default()
        };

        let result = run(&Arc::new(engine), &ctx).unwrap();
        assert_eq!(result.attempts[result.selected].strategy, Strategy::PerLine);
    }

    #[test]
    fn test_blank_page_returns_empty_text() {
        let engine = Arc::new(ScriptedEngine::new("  ", "", ""));
        let result = run(&engine, &DecodeContext::default()).unwrap();
        assert_eq!(result.text, "");
    }

    #[test]
    fn test_select_best_prefers_earlier_on_tie() {
        let attempt = |strategy, text: &str, accepted| {
            DecodeAttempt::new(strategy, DecodingConfig::greedy(), text.to_string(), accepted)
        };
        let attempts = vec![
            attempt(Strategy::Retry, "same", true),
            attempt(Strategy::PerLine, "same", true),
        ];
        assert_eq!(select_best(&attempts), Some(0));

        let attempts = vec![
            attempt(Strategy::FullPage, "a much longer text", false),
            attempt(Strategy::Retry, "short", true),
            attempt(Strategy::PerLine, "longer one", true),
        ];
        assert_eq!(select_best(&attempts), Some(2));
        assert_eq!(select_best(&[]), None);
    }
}
