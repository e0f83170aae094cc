//! Horizontal text-line segmentation from a row projection histogram.

use crate::raster::RasterImage;

/// Intensities below this count as ink in a binarised raster.
const INK_LEVEL: u8 = 128;

/// Minimum height in rows of an active run for it to become a line.
pub const MIN_LINE_HEIGHT: u32 = 10;

/// Rows added above and below each accepted run.
pub const LINE_PADDING: u32 = 3;

/// A horizontal band `[y1, y2)` of a raster that holds one line of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRegion {
    /// First row (inclusive)
    pub y1: u32,
    /// Last row (exclusive)
    pub y2: u32,
}

impl LineRegion {
    /// Height in rows.
    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    /// Full-width crop of `raster` covering this band.
    pub fn crop(&self, raster: &RasterImage) -> RasterImage {
        raster.crop(0, self.y1, raster.width(), self.height())
    }
}

/// Lazy, restartable sequence of line regions, top to bottom.
///
/// The projection histogram is computed once up front; runs are scanned on
/// demand. Cloning restarts from the same state, so iterating a clone yields
/// the same regions again.
#[derive(Debug, Clone)]
pub struct LineRegions {
    profile: Vec<u32>,
    active_threshold: u32,
    cursor: usize,
    previous_end: u32,
}

impl LineRegions {
    fn new(profile: Vec<u32>, width: u32) -> Self {
        // A row is active if its count exceeds max(5, 2% of the width)
        let active_threshold = 5u32.max(width / 50);
        Self {
            profile,
            active_threshold,
            cursor: 0,
            previous_end: 0,
        }
    }

    fn is_active(&self, row: usize) -> bool {
        self.profile[row] > self.active_threshold
    }
}

impl Iterator for LineRegions {
    type Item = LineRegion;

    fn next(&mut self) -> Option<LineRegion> {
        let height = self.profile.len();

        while self.cursor < height {
            while self.cursor < height && !self.is_active(self.cursor) {
                self.cursor += 1;
            }
            let start = self.cursor;
            while self.cursor < height && self.is_active(self.cursor) {
                self.cursor += 1;
            }
            let end = self.cursor;

            if end == start || ((end - start) as u32) < MIN_LINE_HEIGHT {
                continue;
            }

            let y1 = (start as u32).saturating_sub(LINE_PADDING).max(self.previous_end);
            let y2 = (end as u32 + LINE_PADDING).min(height as u32);
            self.previous_end = y2;
            return Some(LineRegion { y1, y2 });
        }

        None
    }
}

/// Split a binarised raster into text-line bands.
///
/// An all-blank raster yields an empty sequence.
pub fn segment(raster: &RasterImage) -> LineRegions {
    let gray = raster.to_gray();
    let profile: Vec<u32> = gray
        .rows()
        .map(|row| row.filter(|p| p[0] < INK_LEVEL).count() as u32)
        .collect();
    LineRegions::new(profile, gray.width())
}
