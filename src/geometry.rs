//! Planar geometry helpers used by skew estimation.

/// A rotated rectangle: centre, side lengths and the angle of its first side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    /// Centre point (x, y)
    pub center: [f64; 2],
    /// Length of the side at `angle`
    pub width: f64,
    /// Length of the perpendicular side
    pub height: f64,
    /// Angle of the first side in degrees, image coordinates (y down)
    pub angle: f64,
}

impl RotatedRect {
    /// Area of the rectangle.
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Corner points, starting at the corner before the first side and
    /// walking along it.
    pub fn corners(&self) -> [[f64; 2]; 4] {
        let (sin, cos) = self.angle.to_radians().sin_cos();
        let (hw, hh) = (self.width / 2.0, self.height / 2.0);
        let at = |u: f64, v: f64| {
            [
                self.center[0] + u * cos - v * sin,
                self.center[1] + u * sin + v * cos,
            ]
        };
        [at(-hw, -hh), at(hw, -hh), at(hw, hh), at(-hw, hh)]
    }
}

/// Convex hull of a point set (Andrew's monotone chain).
///
/// Returns the hull in counter-clockwise order without repeating the first
/// point. Collinear points are dropped.
pub fn convex_hull(points: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let mut pts: Vec<[f64; 2]> = points.to_vec();
    pts.sort_by(|a, b| a[0].total_cmp(&b[0]).then_with(|| a[1].total_cmp(&b[1])));
    pts.dedup();

    if pts.len() < 3 {
        return pts;
    }

    let cross = |o: [f64; 2], a: [f64; 2], b: [f64; 2]| {
        (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
    };

    let mut lower: Vec<[f64; 2]> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<[f64; 2]> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Minimum-area bounding rectangle of a point set.
///
/// The optimal rectangle has one side collinear with a hull edge, so every
/// hull edge direction is tried. Returns `None` for fewer than three
/// non-collinear points.
pub fn min_area_rect(points: &[[f64; 2]]) -> Option<RotatedRect> {
    let hull = convex_hull(points);
    if hull.len() < 3 {
        return None;
    }

    let mut best: Option<RotatedRect> = None;

    for i in 0..hull.len() {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
        let len = (dx * dx + dy * dy).sqrt();
        if len < f64::EPSILON {
            continue;
        }
        let (ux, uy) = (dx / len, dy / len);

        // Project the hull on the edge direction and its normal
        let mut min_u = f64::MAX;
        let mut max_u = f64::MIN;
        let mut min_v = f64::MAX;
        let mut max_v = f64::MIN;
        for p in &hull {
            let u = p[0] * ux + p[1] * uy;
            let v = -p[0] * uy + p[1] * ux;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let width = max_u - min_u;
        let height = max_v - min_v;
        let area = width * height;

        if best.map_or(true, |r| area < r.area()) {
            let cu = (min_u + max_u) / 2.0;
            let cv = (min_v + max_v) / 2.0;
            best = Some(RotatedRect {
                center: [cu * ux - cv * uy, cu * uy + cv * ux],
                width,
                height,
                angle: uy.atan2(ux).to_degrees(),
            });
        }
    }

    best
}

/// Fold an angle in degrees into `(-45, 45]` by adding multiples of 90.
///
/// Text lines and the strokes perpendicular to them both map onto the same
/// small deviation from the axes.
pub fn fold_angle(degrees: f64) -> f64 {
    let mut a = degrees % 90.0;
    if a > 45.0 {
        a -= 90.0;
    } else if a <= -45.0 {
        a += 90.0;
    }
    a
}

/// Median of a sample, or `None` when empty.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convex_hull_square_with_interior() {
        let points = vec![
            [0.0, 0.0],
            [10.0, 0.0],
            [10.0, 10.0],
            [0.0, 10.0],
            [5.0, 5.0],
            [2.0, 7.0],
        ];
        let hull = convex_hull(&points);
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&[5.0, 5.0]));
    }

    #[test]
    fn test_min_area_rect_axis_aligned() {
        let contour = vec![[10.0, 20.0], [50.0, 20.0], [50.0, 40.0], [10.0, 40.0]];
        let rect = min_area_rect(&contour).unwrap();

        assert!((rect.area() - 800.0).abs() < 1e-6);
        assert!((rect.center[0] - 30.0).abs() < 1e-6);
        assert!((rect.center[1] - 30.0).abs() < 1e-6);
        assert!(fold_angle(rect.angle).abs() < 1e-6);

        let xs: Vec<f64> = rect.corners().iter().map(|p| p[0]).collect();
        let ys: Vec<f64> = rect.corners().iter().map(|p| p[1]).collect();
        assert!((xs.iter().cloned().fold(f64::MAX, f64::min) - 10.0).abs() < 1e-6);
        assert!((xs.iter().cloned().fold(f64::MIN, f64::max) - 50.0).abs() < 1e-6);
        assert!((ys.iter().cloned().fold(f64::MAX, f64::min) - 20.0).abs() < 1e-6);
        assert!((ys.iter().cloned().fold(f64::MIN, f64::max) - 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_min_area_rect_rotated() {
        // 100x20 rectangle rotated by 10 degrees around the origin
        let theta = 10f64.to_radians();
        let (c, s) = (theta.cos(), theta.sin());
        let corners = [[0.0, 0.0], [100.0, 0.0], [100.0, 20.0], [0.0, 20.0]];
        let rotated: Vec<[f64; 2]> = corners
            .iter()
            .map(|p| [p[0] * c - p[1] * s, p[0] * s + p[1] * c])
            .collect();

        let rect = min_area_rect(&rotated).unwrap();
        assert!((rect.area() - 2000.0).abs() < 1e-6);
        assert!((fold_angle(rect.angle) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_min_area_rect_degenerate() {
        assert!(min_area_rect(&[]).is_none());
        assert!(min_area_rect(&[[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]).is_none());
    }

    #[test]
    fn test_fold_angle() {
        assert!((fold_angle(0.0) - 0.0).abs() < 1e-9);
        assert!((fold_angle(92.0) - 2.0).abs() < 1e-9);
        assert!((fold_angle(-88.0) - 2.0).abs() < 1e-9);
        assert!((fold_angle(45.0) - 45.0).abs() < 1e-9);
        assert!((fold_angle(-45.0) - 45.0).abs() < 1e-9);
        assert!((fold_angle(178.0) + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }
}
