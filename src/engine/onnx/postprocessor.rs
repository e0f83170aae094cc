//! Probability map postprocessing for text detection.
//!
//! Converts the detector's per-pixel text probability into rotated boxes:
//! binarize, collect connected components, score them, fit a minimum-area
//! rectangle and expand it back to the full text extent.

use ndarray::{Array2, ArrayView2};

use crate::error::{OcrError, OcrResult};
use crate::geometry::{min_area_rect, RotatedRect};

/// Components whose short side is below this are dropped (map pixels).
const MIN_BOX_SIDE: f64 = 3.0;

/// A detected text box with quadrilateral coordinates and confidence.
#[derive(Debug, Clone)]
pub struct DetectedBox {
    /// Four corner points of the text box in image coordinates
    pub polygon: [[f32; 2]; 4],
    /// Mean text probability of the component (0.0 - 1.0)
    pub confidence: f32,
}

impl DetectedBox {
    /// Axis-aligned bounds as `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        let min_x = self.polygon.iter().map(|p| p[0]).fold(f32::MAX, f32::min);
        let max_x = self.polygon.iter().map(|p| p[0]).fold(f32::MIN, f32::max);
        let min_y = self.polygon.iter().map(|p| p[1]).fold(f32::MAX, f32::min);
        let max_y = self.polygon.iter().map(|p| p[1]).fold(f32::MIN, f32::max);
        (min_x, min_y, max_x, max_y)
    }
}

/// Box extraction thresholds.
#[derive(Debug, Clone, Copy)]
pub struct BoxParams {
    /// Per-pixel probability for a pixel to count as text
    pub low_text: f32,
    /// Minimum mean probability for a component to be kept
    pub text_threshold: f32,
    /// Maximum number of components considered
    pub max_candidates: usize,
    /// Expansion ratio applied to each fitted rectangle
    pub unclip_ratio: f32,
    /// Resize ratio of the detector input relative to the source image
    pub scale: f32,
}

/// Extract text boxes from a probability map.
pub fn extract_boxes(prob_map: ArrayView2<f32>, params: &BoxParams) -> OcrResult<Vec<DetectedBox>> {
    let (height, width) = prob_map.dim();

    if height == 0 || width == 0 {
        return Err(OcrError::Inference("empty probability map".to_string()));
    }

    let binary = prob_map.mapv(|p| p > params.low_text);
    let mut boxes = Vec::new();

    for component in find_components(&binary).into_iter().take(params.max_candidates) {
        let score = component.mean_score(prob_map);
        if score < params.text_threshold {
            continue;
        }

        let Some(rect) = min_area_rect(&component.boundary) else {
            continue;
        };
        if rect.width.min(rect.height) < MIN_BOX_SIDE {
            continue;
        }

        let expanded = unclip(&rect, params.unclip_ratio);
        let scale = params.scale as f64;
        let polygon = expanded
            .corners()
            .map(|[x, y]| [(x / scale) as f32, (y / scale) as f32]);

        boxes.push(DetectedBox {
            polygon,
            confidence: score,
        });
    }

    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    log::trace!("Extracted {} text boxes", boxes.len());

    Ok(boxes)
}

/// Grow a rectangle outward by `area * ratio / perimeter` on every side.
fn unclip(rect: &RotatedRect, ratio: f32) -> RotatedRect {
    let perimeter = 2.0 * (rect.width + rect.height);
    if perimeter <= 0.0 {
        return *rect;
    }
    let distance = rect.area() * ratio as f64 / perimeter;
    RotatedRect {
        width: rect.width + 2.0 * distance,
        height: rect.height + 2.0 * distance,
        ..*rect
    }
}

struct Component {
    pixels: Vec<[usize; 2]>,
    boundary: Vec<[f64; 2]>,
}

impl Component {
    fn mean_score(&self, prob_map: ArrayView2<f32>) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.pixels.iter().map(|&[x, y]| prob_map[[y, x]]).sum();
        sum / self.pixels.len() as f32
    }
}

/// 4-connected components of the binary map, in raster-scan order.
fn find_components(binary: &Array2<bool>) -> Vec<Component> {
    let (height, width) = binary.dim();
    let mut visited = Array2::<bool>::default((height, width));
    let mut components = Vec::new();

    for y in 0..height {
        for x in 0..width {
            if binary[[y, x]] && !visited[[y, x]] {
                components.push(flood_fill(binary, &mut visited, x, y));
            }
        }
    }

    components
}

fn flood_fill(
    binary: &Array2<bool>,
    visited: &mut Array2<bool>,
    start_x: usize,
    start_y: usize,
) -> Component {
    let (height, width) = binary.dim();
    let mut stack = vec![(start_x, start_y)];
    let mut pixels = Vec::new();
    let mut boundary = Vec::new();

    let directions: [(i64, i64); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

    while let Some((x, y)) = stack.pop() {
        if visited[[y, x]] {
            continue;
        }
        visited[[y, x]] = true;
        pixels.push([x, y]);

        let mut is_boundary = false;
        for (dx, dy) in &directions {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;

            if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                is_boundary = true;
                continue;
            }
            let (nx, ny) = (nx as usize, ny as usize);
            if !binary[[ny, nx]] {
                is_boundary = true;
            } else if !visited[[ny, nx]] {
                stack.push((nx, ny));
            }
        }

        if is_boundary {
            // Pixel squares, so the fitted rectangle covers whole pixels
            let (fx, fy) = (x as f64, y as f64);
            boundary.extend_from_slice(&[
                [fx, fy],
                [fx + 1.0, fy],
                [fx + 1.0, fy + 1.0],
                [fx, fy + 1.0],
            ]);
        }
    }

    Component { pixels, boundary }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BoxParams {
        BoxParams {
            low_text: 0.3,
            text_threshold: 0.5,
            max_candidates: 100,
            unclip_ratio: 1.5,
            scale: 1.0,
        }
    }

    #[test]
    fn test_extract_boxes_empty() {
        let prob_map = Array2::<f32>::zeros((100, 100));
        let boxes = extract_boxes(prob_map.view(), &params()).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_extract_boxes_single_region() {
        let mut prob_map = Array2::<f32>::zeros((100, 100));
        for y in 20..40 {
            for x in 30..70 {
                prob_map[[y, x]] = 0.9;
            }
        }

        let boxes = extract_boxes(prob_map.view(), &params()).unwrap();
        assert_eq!(boxes.len(), 1);

        let (min_x, min_y, max_x, max_y) = boxes[0].bounds();
        assert!((boxes[0].confidence - 0.9).abs() < 1e-5);
        // Unclipped beyond the 40x20 component
        assert!(min_x < 30.0 && max_x > 70.0);
        assert!(min_y < 20.0 && max_y > 40.0);
    }

    #[test]
    fn test_extract_boxes_scales_back() {
        let mut prob_map = Array2::<f32>::zeros((50, 50));
        for y in 10..20 {
            for x in 10..40 {
                prob_map[[y, x]] = 0.8;
            }
        }

        let scaled = BoxParams { scale: 0.5, ..params() };
        let boxes = extract_boxes(prob_map.view(), &scaled).unwrap();
        let (min_x, _, max_x, _) = boxes[0].bounds();
        assert!(min_x < 20.0 && max_x > 80.0);
    }

    #[test]
    fn test_low_score_and_tiny_components_dropped() {
        let mut prob_map = Array2::<f32>::zeros((60, 60));
        // Faint region: above low_text, below text_threshold
        for y in 5..20 {
            for x in 5..50 {
                prob_map[[y, x]] = 0.4;
            }
        }
        // Speck
        prob_map[[40, 40]] = 0.99;

        let boxes = extract_boxes(prob_map.view(), &params()).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_unclip_grows_every_side() {
        let rect = RotatedRect {
            center: [50.0, 25.0],
            width: 100.0,
            height: 50.0,
            angle: 0.0,
        };
        let grown = unclip(&rect, 1.5);
        // 5000 * 1.5 / 300 = 25
        assert!((grown.width - 150.0).abs() < 1e-9);
        assert!((grown.height - 100.0).abs() < 1e-9);
        assert_eq!(grown.center, rect.center);
    }

    #[test]
    fn test_empty_map_is_error() {
        let prob_map = Array2::<f32>::zeros((0, 0));
        assert!(extract_boxes(prob_map.view(), &params()).is_err());
    }
}
