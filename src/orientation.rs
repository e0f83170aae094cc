//! Page orientation and skew correction.
//!
//! Correction happens in two steps:
//! 1. **Coarse rotation**: an [`OrientationDetector`] picks one of
//!    0/90/180/270 degrees and the raster is rotated exactly (no resampling).
//! 2. **Fine skew**: the dominant text-line angle is measured on a binarised
//!    copy and undone with a bicubic rotation that replicates border pixels.
//!
//! Skew estimates inside the noise floor or beyond the sanity ceiling are
//! not applied, and a page without foreground pixels is returned untouched.

use std::sync::Arc;

use image::{GrayImage, ImageBuffer, Luma, Pixel};
use imageproc::edges::canny;
use imageproc::hough::{detect_lines, LineDetectionOptions};

use crate::config::{OrientationConfig, SkewMethod};
use crate::geometry::{fold_angle, median, min_area_rect};
use crate::raster::RasterImage;

/// Intensity spread below which skew and rotation are not estimated.
const MIN_CONTRAST: u8 = 32;

/// Coarse page rotation, expressed as the clockwise rotation that corrects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    /// Upright
    #[default]
    Deg0,
    /// Rotate 90 degrees clockwise to correct
    Deg90,
    /// Rotate 180 degrees to correct
    Deg180,
    /// Rotate 270 degrees clockwise to correct
    Deg270,
}

impl Rotation {
    /// Rotation in degrees.
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Parse a multiple of 90 degrees.
    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// Apply this rotation exactly.
    pub fn apply(self, raster: &RasterImage) -> RasterImage {
        let image = raster.as_dynamic();
        match self {
            Rotation::Deg0 => raster.clone(),
            Rotation::Deg90 => RasterImage::from_dynamic(image.rotate90()),
            Rotation::Deg180 => RasterImage::from_dynamic(image.rotate180()),
            Rotation::Deg270 => RasterImage::from_dynamic(image.rotate270()),
        }
    }
}

/// Outcome of orientation analysis for one raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationEstimate {
    /// Coarse rotation that was applied
    pub rotation: Rotation,
    /// Measured skew in degrees (positive: lines descend to the right)
    pub skew_degrees: f32,
    /// Whether the skew estimate was accepted and applied
    pub valid: bool,
}

impl OrientationEstimate {
    /// Identity estimate, used when there is nothing to measure.
    pub fn identity() -> Self {
        Self {
            rotation: Rotation::Deg0,
            skew_degrees: 0.0,
            valid: false,
        }
    }
}

/// Capability that decides the coarse page rotation.
pub trait OrientationDetector: Send + Sync {
    /// Return the clockwise rotation that makes `gray` upright.
    fn detect(&self, gray: &GrayImage) -> Rotation;
}

/// Heuristic detector based on projection profiles.
///
/// Horizontal text makes the row profile far more uneven than the column
/// profile, which separates 0/180 from 90/270. Upside-down text is told
/// apart by where the ink sits relative to each line's x-height band:
/// ascenders and capitals above the band outnumber descenders below it in
/// Latin scripts.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionOrientationDetector {
    /// How much more ink must sit below the core band to call a page flipped
    pub flip_margin: f32,
}

impl Default for ProjectionOrientationDetector {
    fn default() -> Self {
        Self { flip_margin: 1.2 }
    }
}

impl OrientationDetector for ProjectionOrientationDetector {
    fn detect(&self, gray: &GrayImage) -> Rotation {
        let Some(mut mask) = foreground_mask(gray) else {
            return Rotation::Deg0;
        };

        // Profiles smear out on skewed pages; level the mask first. The folded
        // skew angle does not depend on the quarter-turn being detected.
        if let Some(skew) = skew_from_min_area_rect(gray) {
            if skew.abs() >= 0.5 {
                mask = rotate_buffer(&mask, -skew);
            }
        }

        let rows = row_profile(&mask);
        let cols = column_profile(&mask);
        let horizontal = profile_contrast(&rows) >= profile_contrast(&cols);

        if horizontal {
            if self.is_upside_down(&rows) {
                Rotation::Deg180
            } else {
                Rotation::Deg0
            }
        } else {
            let turned = image::imageops::rotate90(&mask);
            if self.is_upside_down(&row_profile(&turned)) {
                Rotation::Deg270
            } else {
                Rotation::Deg90
            }
        }
    }
}

impl ProjectionOrientationDetector {
    fn is_upside_down(&self, rows: &[u32]) -> bool {
        let mut above = 0u64;
        let mut below = 0u64;

        for (start, end) in ink_runs(rows) {
            if end - start < 4 {
                continue;
            }
            let band = &rows[start..end];
            let peak = band.iter().copied().max().unwrap_or(0);
            let core: Vec<usize> = band
                .iter()
                .enumerate()
                .filter(|&(_, &c)| c * 2 >= peak)
                .map(|(i, _)| i)
                .collect();
            let (Some(&top), Some(&bottom)) = (core.first(), core.last()) else {
                continue;
            };
            above += band[..top].iter().map(|&c| c as u64).sum::<u64>();
            below += band[bottom + 1..].iter().map(|&c| c as u64).sum::<u64>();
        }

        below as f32 > above as f32 * self.flip_margin
    }
}

/// Orientation and skew corrector.
#[derive(Clone)]
pub struct OrientationCorrector {
    config: OrientationConfig,
    detector: Arc<dyn OrientationDetector>,
}

impl std::fmt::Debug for OrientationCorrector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrientationCorrector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OrientationCorrector {
    /// Create a corrector using the projection-profile detector.
    pub fn new(config: OrientationConfig) -> Self {
        Self {
            config,
            detector: Arc::new(ProjectionOrientationDetector::default()),
        }
    }

    /// Use an external page-orientation capability.
    pub fn with_detector(mut self, detector: Arc<dyn OrientationDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Correct coarse rotation and fine skew.
    ///
    /// Never fails: blank or ambiguous input yields the identity transform.
    pub fn correct(&self, raster: &RasterImage) -> (RasterImage, OrientationEstimate) {
        let gray = raster.to_gray();
        if foreground_mask(&gray).is_none() {
            log::debug!("No foreground pixels, skipping orientation correction");
            return (raster.clone(), OrientationEstimate::identity());
        }

        let rotation = if self.config.detect_rotation {
            self.detector.detect(&gray)
        } else {
            Rotation::Deg0
        };

        let (oriented, gray) = if rotation == Rotation::Deg0 {
            (raster.clone(), gray)
        } else {
            log::debug!("Applying coarse rotation of {} degrees", rotation.degrees());
            let rotated = rotation.apply(raster);
            let gray = rotated.to_gray();
            (rotated, gray)
        };

        let Some(skew) = measure_skew(&gray, self.config.skew_method) else {
            return (
                oriented,
                OrientationEstimate {
                    rotation,
                    skew_degrees: 0.0,
                    valid: false,
                },
            );
        };

        let magnitude = skew.abs();
        if magnitude < self.config.skew_noise_floor || magnitude > self.config.skew_ceiling {
            log::debug!(
                "Rejecting skew estimate {:.2} (accepted range {:.2}..={:.2})",
                skew,
                self.config.skew_noise_floor,
                self.config.skew_ceiling
            );
            return (
                oriented,
                OrientationEstimate {
                    rotation,
                    skew_degrees: skew,
                    valid: false,
                },
            );
        }

        log::debug!("Deskewing by {:.2} degrees", -skew);
        (
            rotate_bicubic(&oriented, -skew),
            OrientationEstimate {
                rotation,
                skew_degrees: skew,
                valid: true,
            },
        )
    }
}

/// Correct a raster with the given settings and the default detector.
pub fn correct(
    raster: &RasterImage,
    config: &OrientationConfig,
) -> (RasterImage, OrientationEstimate) {
    OrientationCorrector::new(config.clone()).correct(raster)
}

/// Measure the dominant text-line angle in degrees, folded into `(-45, 45]`.
///
/// Positive angles mean lines descend to the right. Returns `None` when the
/// raster has no foreground or no usable lines.
pub fn measure_skew(gray: &GrayImage, method: SkewMethod) -> Option<f32> {
    match method {
        SkewMethod::MinAreaRect => skew_from_min_area_rect(gray),
        SkewMethod::Hough => skew_from_hough(gray),
    }
}

fn skew_from_min_area_rect(gray: &GrayImage) -> Option<f32> {
    let mask = foreground_mask(gray)?;
    let (width, height) = mask.dimensions();

    // The hull only depends on the extreme ink pixels of each row
    let mut points = Vec::new();
    for y in 0..height {
        let mut first = None;
        let mut last = None;
        for x in 0..width {
            if mask.get_pixel(x, y)[0] > 0 {
                first.get_or_insert(x);
                last = Some(x);
            }
        }
        if let (Some(a), Some(b)) = (first, last) {
            points.push([a as f64, y as f64]);
            if b != a {
                points.push([b as f64, y as f64]);
            }
        }
    }

    let rect = min_area_rect(&points)?;
    Some(fold_angle(rect.angle) as f32)
}

fn skew_from_hough(gray: &GrayImage) -> Option<f32> {
    foreground_mask(gray)?;

    let edges = canny(gray, 50.0, 150.0);
    let options = LineDetectionOptions {
        vote_threshold: (gray.width() / 4).max(40),
        suppression_radius: 8,
    };
    let lines = detect_lines(&edges, options);

    // PolarLine angles are normals; the line itself runs 90 degrees off
    let mut angles: Vec<f64> = lines
        .iter()
        .map(|line| fold_angle(line.angle_in_degrees as f64 - 90.0))
        .collect();

    median(&mut angles).map(|a| a as f32)
}

/// Rotate about the centre by `degrees` (clockwise in image coordinates).
///
/// Uses bicubic resampling and replicates edge pixels for samples that fall
/// outside the source, so no dark border is introduced.
pub fn rotate_bicubic(raster: &RasterImage, degrees: f32) -> RasterImage {
    match raster.as_dynamic() {
        image::DynamicImage::ImageLuma8(gray) => {
            RasterImage::from_gray(rotate_buffer(gray, degrees))
        },
        image::DynamicImage::ImageRgb8(rgb) => RasterImage::from_rgb(rotate_buffer(rgb, degrees)),
        other => RasterImage::from_rgb(rotate_buffer(&other.to_rgb8(), degrees)),
    }
}

fn rotate_buffer<P>(src: &ImageBuffer<P, Vec<u8>>, degrees: f32) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = src.dimensions();
    if width == 0 || height == 0 {
        return src.clone();
    }

    let channels = P::CHANNEL_COUNT as usize;
    let raw = src.as_raw();
    let (sin, cos) = (degrees as f64).to_radians().sin_cos();
    let cx = (width as f64 - 1.0) / 2.0;
    let cy = (height as f64 - 1.0) / 2.0;
    let max_x = width as i64 - 1;
    let max_y = height as i64 - 1;

    let mut out = vec![0u8; raw.len()];
    let mut acc = vec![0f64; channels];

    for y in 0..height {
        for x in 0..width {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            // Inverse mapping: output pixel -> source position
            let sx = cos * dx + sin * dy + cx;
            let sy = -sin * dx + cos * dy + cy;

            let x0 = sx.floor();
            let y0 = sy.floor();
            let wx = cubic_weights(sx - x0);
            let wy = cubic_weights(sy - y0);

            acc.iter_mut().for_each(|a| *a = 0.0);
            for (j, wyj) in wy.iter().enumerate() {
                let yy = (y0 as i64 + j as i64 - 1).clamp(0, max_y) as usize;
                for (i, wxi) in wx.iter().enumerate() {
                    let xx = (x0 as i64 + i as i64 - 1).clamp(0, max_x) as usize;
                    let base = (yy * width as usize + xx) * channels;
                    let w = wxi * wyj;
                    for (c, a) in acc.iter_mut().enumerate() {
                        *a += raw[base + c] as f64 * w;
                    }
                }
            }

            let base = (y as usize * width as usize + x as usize) * channels;
            for (c, a) in acc.iter().enumerate() {
                out[base + c] = a.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    ImageBuffer::from_raw(width, height, out).unwrap_or_else(|| src.clone())
}

/// Bicubic convolution weights for taps at offsets -1, 0, 1, 2.
fn cubic_weights(t: f64) -> [f64; 4] {
    const A: f64 = -0.75;
    let kernel = |d: f64| {
        let d = d.abs();
        if d <= 1.0 {
            ((A + 2.0) * d - (A + 3.0)) * d * d + 1.0
        } else if d < 2.0 {
            ((A * d - 5.0 * A) * d + 8.0 * A) * d - 4.0 * A
        } else {
            0.0
        }
    };
    [kernel(1.0 + t), kernel(t), kernel(1.0 - t), kernel(2.0 - t)]
}

/// Whether a raster is flat: its intensities span at most `spread` levels.
///
/// A flat raster has no foreground at all. Faint ink still counts as
/// foreground here even when it is too weak for skew estimation.
pub(crate) fn is_flat(gray: &GrayImage, spread: u8) -> bool {
    let mut values = gray.pixels().map(|p| p[0]);
    let Some(first) = values.next() else {
        return true;
    };
    let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    max - min <= spread
}

/// Binarise with Otsu's level and return a mask with ink at 255.
///
/// Ink is taken to be the minority class, so light-on-dark scans work too.
/// Returns `None` for rasters without enough contrast to hold any ink.
pub(crate) fn foreground_mask(gray: &GrayImage) -> Option<GrayImage> {
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    if gray.width() == 0 || gray.height() == 0 || max.saturating_sub(min) < MIN_CONTRAST {
        return None;
    }

    let level = imageproc::contrast::otsu_level(gray);
    let dark = gray.pixels().filter(|p| p[0] <= level).count();
    let total = gray.width() as usize * gray.height() as usize;
    let dark_is_ink = dark * 2 <= total;

    let mask = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let is_dark = gray.get_pixel(x, y)[0] <= level;
        if is_dark == dark_is_ink {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    Some(mask)
}

fn row_profile(mask: &GrayImage) -> Vec<u32> {
    mask.rows()
        .map(|row| row.filter(|p| p[0] > 127).count() as u32)
        .collect()
}

fn column_profile(mask: &GrayImage) -> Vec<u32> {
    let mut cols = vec![0u32; mask.width() as usize];
    for (x, _, p) in mask.enumerate_pixels() {
        if p[0] > 127 {
            cols[x as usize] += 1;
        }
    }
    cols
}

/// Coefficient of variation over the inked span of a profile.
fn profile_contrast(profile: &[u32]) -> f64 {
    let first = profile.iter().position(|&c| c > 0);
    let last = profile.iter().rposition(|&c| c > 0);
    let (Some(first), Some(last)) = (first, last) else {
        return 0.0;
    };
    let span = &profile[first..=last];
    let n = span.len() as f64;
    let mean = span.iter().map(|&c| c as f64).sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = span.iter().map(|&c| (c as f64 - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / mean
}

/// Half-open index ranges of consecutive non-zero entries.
fn ink_runs(profile: &[u32]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, &c) in profile.iter().enumerate() {
        match (c > 0, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push((s, i));
                start = None;
            },
            _ => {},
        }
    }
    if let Some(s) = start {
        runs.push((s, profile.len()));
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic page: rows of dark glyph blocks, some with ascender strokes.
    fn text_page(width: u32, height: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(width, height, Luma([255]));
        let mut seed = 7u32;
        let mut next = |modulo: u32| {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (seed >> 16) % modulo
        };

        let mut top = 40;
        while top + 24 < height - 40 {
            let mut x = 40 + next(6);
            let right = width - 40 - next(12);
            while x + 14 < right {
                let glyph_w = 6 + next(9);
                for gx in x..x + glyph_w {
                    for gy in top + 8..top + 20 {
                        img.put_pixel(gx, gy, Luma([0]));
                    }
                }
                if next(3) == 0 {
                    for gx in x..x + 3 {
                        for gy in top..top + 8 {
                            img.put_pixel(gx, gy, Luma([0]));
                        }
                    }
                }
                x += glyph_w + 4 + next(4);
            }
            top += 40;
        }
        img
    }

    fn raster(gray: GrayImage) -> RasterImage {
        RasterImage::from_gray(gray)
    }

    #[test]
    fn test_blank_page_is_identity() {
        let blank = raster(GrayImage::from_pixel(120, 80, Luma([255])));
        let (out, estimate) = correct(&blank, &OrientationConfig::default());

        assert_eq!(out, blank);
        assert!(!estimate.valid);
        assert_eq!(estimate.rotation, Rotation::Deg0);
    }

    #[test]
    fn test_flat_gray_page_is_identity() {
        let gray = raster(GrayImage::from_fn(90, 90, |x, _| Luma([120 + (x % 5) as u8])));
        let (out, estimate) = correct(&gray, &OrientationConfig::default());

        assert_eq!(out, gray);
        assert!(!estimate.valid);
    }

    #[test]
    fn test_upright_page_detected_as_upright() {
        let page = text_page(400, 300);
        assert_eq!(ProjectionOrientationDetector::default().detect(&page), Rotation::Deg0);
    }

    #[test]
    fn test_detects_upside_down_page() {
        let page = text_page(400, 300);
        let flipped = image::imageops::rotate180(&page);
        assert_eq!(ProjectionOrientationDetector::default().detect(&flipped), Rotation::Deg180);
    }

    #[test]
    fn test_detects_quarter_turns() {
        let page = text_page(400, 300);
        let detector = ProjectionOrientationDetector::default();

        // Content turned counter-clockwise needs a clockwise correction
        let ccw = image::imageops::rotate270(&page);
        assert_eq!(detector.detect(&ccw), Rotation::Deg90);

        let cw = image::imageops::rotate90(&page);
        assert_eq!(detector.detect(&cw), Rotation::Deg270);
    }

    #[test]
    fn test_upside_down_page_restored_exactly() {
        let page = raster(text_page(400, 300));
        let flipped = Rotation::Deg180.apply(&page);

        let (out, estimate) = correct(&flipped, &OrientationConfig::default());
        assert_eq!(estimate.rotation, Rotation::Deg180);
        assert!(!estimate.valid, "axis-aligned page needs no deskew");
        assert_eq!(out, page);
    }

    #[test]
    fn test_measure_skew_of_rotated_page() {
        let page = raster(text_page(400, 300));
        let skewed = rotate_bicubic(&page, 5.0);

        let skew = measure_skew(&skewed.to_gray(), SkewMethod::MinAreaRect).unwrap();
        assert!((skew - 5.0).abs() < 1.0, "measured {}", skew);
    }

    #[test]
    fn test_deskew_reduces_residual_skew() {
        let page = raster(text_page(400, 300));
        let skewed = rotate_bicubic(&page, -6.0);
        let before = measure_skew(&skewed.to_gray(), SkewMethod::MinAreaRect).unwrap();

        let (out, estimate) = correct(&skewed, &OrientationConfig::default());
        assert!(estimate.valid);
        assert_eq!(estimate.rotation, Rotation::Deg0);

        let after = measure_skew(&out.to_gray(), SkewMethod::MinAreaRect).unwrap();
        assert!(after.abs() < before.abs(), "before {} after {}", before, after);
    }

    #[test]
    fn test_small_skew_not_corrected() {
        let page = raster(text_page(400, 300));
        let (out, estimate) = correct(&page, &OrientationConfig::default());

        assert!(!estimate.valid);
        assert_eq!(out, page);
    }

    #[test]
    fn test_gross_skew_rejected() {
        let page = raster(text_page(400, 300));
        let skewed = rotate_bicubic(&page, 25.0);
        let config = OrientationConfig {
            detect_rotation: false,
            ..OrientationConfig::default()
        };

        let (out, estimate) = correct(&skewed, &config);
        assert!(!estimate.valid);
        assert!(estimate.skew_degrees.abs() > 15.0);
        assert_eq!(out, skewed);
    }

    #[test]
    fn test_hough_skew_on_ruled_lines() {
        let mut img = GrayImage::from_pixel(400, 300, Luma([255]));
        for top in (40..260).step_by(30) {
            for y in top..top + 4 {
                for x in 30..370 {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        let skewed = rotate_bicubic(&raster(img), 4.0);

        let skew = measure_skew(&skewed.to_gray(), SkewMethod::Hough).unwrap();
        assert!((skew - 4.0).abs() <= 1.5, "measured {}", skew);
    }

    #[test]
    fn test_rotate_bicubic_zero_is_identity() {
        let page = raster(text_page(200, 150));
        assert_eq!(rotate_bicubic(&page, 0.0), page);
    }

    #[test]
    fn test_rotate_bicubic_replicates_border() {
        // A uniform page must stay uniform: no dark corners after rotation
        let page = raster(GrayImage::from_pixel(100, 60, Luma([230])));
        let rotated = rotate_bicubic(&page, 12.0).to_gray();
        assert!(rotated.pixels().all(|p| p[0] == 230));
    }

    #[test]
    fn test_is_flat_counts_faint_ink_as_foreground() {
        let mut page = GrayImage::from_pixel(50, 50, Luma([215]));
        assert!(is_flat(&page, 4));

        page.put_pixel(25, 25, Luma([190]));
        assert!(!is_flat(&page, 4));
        assert!(is_flat(&page, 25));
        assert!(is_flat(&GrayImage::new(0, 0), 0));
    }

    #[test]
    fn test_rotation_degrees_round_trip() {
        for r in [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270] {
            assert_eq!(Rotation::from_degrees(r.degrees()), Some(r));
        }
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn test_cubic_weights_sum_to_one() {
        for t in [0.0, 0.25, 0.5, 0.9] {
            let sum: f64 = cubic_weights(t).iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }
}
