//! Contrast and binarisation enhancement.
//!
//! Turns an oriented raster into a clean two-level grayscale image:
//! upscale, bilateral smoothing, tile-based contrast equalisation (CLAHE),
//! adaptive mean thresholding, morphological cleanup and polarity
//! normalisation. Each step is switched by [`EnhanceConfig`] and every step
//! is a pure function of its input.

use image::imageops::FilterType;
use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::distance_transform::Norm;
use imageproc::integral_image::{integral_image, sum_image_pixels};
use imageproc::morphology::{dilate, open};

use crate::config::{AdaptiveThresholdParams, BilateralParams, ClaheParams, EnhanceConfig, Mode};
use crate::raster::RasterImage;

/// Run the enhancement steps enabled in `config`.
///
/// The result is always grayscale. With every step disabled this is just a
/// grayscale conversion.
pub fn enhance(raster: &RasterImage, mode: Mode, config: &EnhanceConfig) -> RasterImage {
    let mut gray = raster.to_gray();

    if let Some(threshold) = config.upscale_below {
        let factor = if mode.is_handwriting() {
            config.handwriting_scale
        } else {
            config.print_scale
        };
        gray = upscale(&gray, threshold, factor);
    }

    if let Some(params) = &config.smoothing {
        gray = bilateral_filter(&gray, params);
    }

    if let Some(params) = &config.equalization {
        gray = equalize_clahe(&gray, params);
    }

    if let Some(params) = &config.binarization {
        gray = adaptive_threshold(&gray, params);
    }

    if config.remove_specks {
        gray = on_ink(&gray, |ink| open(ink, Norm::LInf, 1));
    }

    if config.reconnect_strokes && mode.is_handwriting() {
        gray = on_ink(&gray, |ink| dilate(ink, Norm::LInf, 1));
    }

    if config.normalize_polarity {
        gray = normalize_polarity(gray);
    }

    RasterImage::from_gray(gray)
}

/// Upscale with cubic interpolation when the larger side is below `threshold`.
pub fn upscale(gray: &GrayImage, threshold: u32, factor: f32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w.max(h) >= threshold || factor <= 1.0 {
        return gray.clone();
    }
    let new_w = ((w as f32 * factor).round() as u32).max(1);
    let new_h = ((h as f32 * factor).round() as u32).max(1);
    log::debug!("Upscaling {}x{} -> {}x{}", w, h, new_w, new_h);
    image::imageops::resize(gray, new_w, new_h, FilterType::CatmullRom)
}

/// Edge-preserving bilateral smoothing over a `2 * radius + 1` square window.
///
/// Pixels outside the image replicate the nearest edge pixel.
pub fn bilateral_filter(gray: &GrayImage, params: &BilateralParams) -> GrayImage {
    if gray.width() == 0 || gray.height() == 0 || params.radius == 0 {
        return gray.clone();
    }
    imageproc::filter::bilateral_filter(
        gray,
        params.radius * 2 + 1,
        params.sigma_color,
        params.sigma_space,
    )
}

/// Contrast-limited adaptive histogram equalisation.
///
/// The image is split into a `tiles x tiles` grid; each tile gets its own
/// clipped histogram mapping and pixels blend the four nearest mappings.
pub fn equalize_clahe(gray: &GrayImage, params: &ClaheParams) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }

    let tiles = params.tiles.max(1);
    let tile_w = w.div_ceil(tiles).max(1);
    let tile_h = h.div_ceil(tiles).max(1);
    let grid_x = w.div_ceil(tile_w);
    let grid_y = h.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((grid_x * grid_y) as usize);
    for ty in 0..grid_y {
        for tx in 0..grid_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let area = (x1 - x0) * (y1 - y0);
            luts.push(clipped_mapping(&mut hist, area, params.clip_limit));
        }
    }

    let lut = |tx: u32, ty: u32| &luts[(ty * grid_x + tx) as usize];

    GrayImage::from_fn(w, h, |x, y| {
        let v = gray.get_pixel(x, y)[0] as usize;

        let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
        let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let tx0 = fx.floor().clamp(0.0, (grid_x - 1) as f32) as u32;
        let ty0 = fy.floor().clamp(0.0, (grid_y - 1) as f32) as u32;
        let tx1 = (tx0 + 1).min(grid_x - 1);
        let ty1 = (ty0 + 1).min(grid_y - 1);
        let ax = (fx - tx0 as f32).clamp(0.0, 1.0);
        let ay = (fy - ty0 as f32).clamp(0.0, 1.0);

        let top = lut(tx0, ty0)[v] as f32 * (1.0 - ax) + lut(tx1, ty0)[v] as f32 * ax;
        let bottom = lut(tx0, ty1)[v] as f32 * (1.0 - ax) + lut(tx1, ty1)[v] as f32 * ax;
        Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

/// Clip a tile histogram, spread the excess evenly and build the CDF mapping.
fn clipped_mapping(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let limit = ((clip_limit.max(1.0) * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let spread = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += spread + u32::from(i < remainder);
    }

    let scale = 255.0 / area.max(1) as f32;
    let mut mapping = [0u8; 256];
    let mut cdf = 0u32;
    for (i, &bin) in hist.iter().enumerate() {
        cdf += bin;
        mapping[i] = (cdf as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    mapping
}

/// Binarise against the mean of a square window around each pixel.
///
/// A pixel becomes ink (0) when it is at or below `mean - bias`, otherwise
/// background (255). Window sums come from an integral image, so the cost
/// does not depend on the window size. The window is clipped at the edges.
pub fn adaptive_threshold(gray: &GrayImage, params: &AdaptiveThresholdParams) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }

    let integral: Image<Luma<u64>> = integral_image(gray);

    let half = (params.window / 2) as i64;
    let bias = params.bias as i64;

    GrayImage::from_fn(w, h, |x, y| {
        let left = (x as i64 - half).max(0) as u32;
        let top = (y as i64 - half).max(0) as u32;
        let right = (x as i64 + half).min(w as i64 - 1) as u32;
        let bottom = (y as i64 + half).min(h as i64 - 1) as u32;

        let sum = sum_image_pixels(&integral, left, top, right, bottom)[0] as i64;
        let count = ((right - left + 1) * (bottom - top + 1)) as i64;

        let value = gray.get_pixel(x, y)[0] as i64;
        if value * count > sum - bias * count {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Make sure the background is light: invert when the mean is below mid-gray.
pub fn normalize_polarity(mut gray: GrayImage) -> GrayImage {
    let pixels = gray.width() as u64 * gray.height() as u64;
    if pixels == 0 {
        return gray;
    }
    let total: u64 = gray.pixels().map(|p| p[0] as u64).sum();
    if (total as f64 / pixels as f64) < 127.5 {
        log::debug!("Inverting dark-background raster");
        image::imageops::invert(&mut gray);
    }
    gray
}

/// Apply a morphology operator that treats white as foreground to dark ink.
fn on_ink<F>(gray: &GrayImage, op: F) -> GrayImage
where
    F: FnOnce(&GrayImage) -> GrayImage,
{
    let mut ink = gray.clone();
    image::imageops::invert(&mut ink);
    let mut out = op(&ink);
    image::imageops::invert(&mut out);
    out
}
