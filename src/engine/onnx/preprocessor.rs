//! Image preprocessing for the detection and recognition models.

use image::{DynamicImage, GenericImageView, GrayImage, Luma, Rgb, RgbImage};
use ndarray::Array4;

use crate::error::{OcrError, OcrResult};

/// Mean values for ImageNet normalization (RGB order).
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Standard deviation values for ImageNet normalization (RGB order).
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocess an image for text detection.
///
/// Resizes to fit within `max_side`, pads to a multiple of 32 and applies
/// ImageNet normalisation. Returns an NCHW tensor and the resize ratio.
pub fn preprocess_for_detection(
    image: &DynamicImage,
    max_side: u32,
) -> OcrResult<(Array4<f32>, f32)> {
    let (orig_w, orig_h) = image.dimensions();

    if orig_w == 0 || orig_h == 0 {
        return Err(OcrError::Inference("image has zero dimensions".to_string()));
    }

    let max_dim = orig_w.max(orig_h);
    let ratio = if max_dim > max_side {
        max_side as f32 / max_dim as f32
    } else {
        1.0
    };

    let new_w = ((orig_w as f32 * ratio) as u32).max(1);
    let new_h = ((orig_h as f32 * ratio) as u32).max(1);
    let resized = image
        .resize_exact(new_w, new_h, image::imageops::FilterType::Lanczos3)
        .to_rgb8();

    // Pad to multiple of 32 with white, matching the page background
    let padded_w = new_w.div_ceil(32) * 32;
    let padded_h = new_h.div_ceil(32) * 32;
    let mut padded = RgbImage::from_pixel(padded_w, padded_h, Rgb([255, 255, 255]));
    image::imageops::replace(&mut padded, &resized, 0, 0);

    Ok((image_to_tensor_imagenet(&padded), ratio))
}

/// Preprocess a cropped text region for recognition.
///
/// Resizes to `target_height` keeping the aspect ratio, pads the width to a
/// multiple of 4 and normalises to `[-1, 1]`.
pub fn preprocess_for_recognition(
    crop: &DynamicImage,
    target_height: u32,
) -> OcrResult<Array4<f32>> {
    let (orig_w, orig_h) = crop.dimensions();

    if orig_w == 0 || orig_h == 0 {
        return Err(OcrError::Inference("crop has zero dimensions".to_string()));
    }

    let ratio = target_height as f32 / orig_h as f32;
    let new_w = ((orig_w as f32 * ratio) as u32).max(1);
    let resized = crop
        .resize_exact(new_w, target_height, image::imageops::FilterType::Lanczos3)
        .to_rgb8();

    let padded_w = new_w.div_ceil(4) * 4;
    let mut padded = RgbImage::from_pixel(padded_w, target_height, Rgb([255, 255, 255]));
    image::imageops::replace(&mut padded, &resized, 0, 0);

    Ok(image_to_tensor_symmetric(&padded))
}

fn image_to_tensor_imagenet(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    tensor
}

fn image_to_tensor_symmetric(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 127.5 - 1.0;
        }
    }

    tensor
}

/// Crop the axis-aligned bounding box of a quadrilateral, clamped to the image.
pub fn crop_text_region(image: &DynamicImage, polygon: &[[f32; 2]; 4]) -> OcrResult<DynamicImage> {
    let (img_w, img_h) = image.dimensions();

    let min_x = polygon.iter().map(|p| p[0]).fold(f32::MAX, f32::min);
    let max_x = polygon.iter().map(|p| p[0]).fold(f32::MIN, f32::max);
    let min_y = polygon.iter().map(|p| p[1]).fold(f32::MAX, f32::min);
    let max_y = polygon.iter().map(|p| p[1]).fold(f32::MIN, f32::max);

    let x = (min_x.max(0.0) as u32).min(img_w.saturating_sub(1));
    let y = (min_y.max(0.0) as u32).min(img_h.saturating_sub(1));
    let w = ((max_x - min_x).max(1.0) as u32).min(img_w - x);
    let h = ((max_y - min_y).max(1.0) as u32).min(img_h - y);

    if w == 0 || h == 0 {
        return Err(OcrError::Inference("crop region has zero size".to_string()));
    }

    Ok(image.crop_imm(x, y, w, h))
}

/// Contrast of a region as `(p90 - p10) / max(10, p90 + p10)`.
pub fn region_contrast(image: &DynamicImage) -> f32 {
    let (low, high) = percentiles(&image.to_luma8());
    (high - low) / (high + low).max(10.0)
}

/// Stretch a low-contrast region towards `target` contrast.
///
/// Regions already at or above the target are returned unchanged.
pub fn adjust_contrast(image: &DynamicImage, target: f32) -> DynamicImage {
    let gray = image.to_luma8();
    let (low, high) = percentiles(&gray);
    let contrast = (high - low) / (high + low).max(10.0);
    if contrast >= target {
        return image.clone();
    }

    let ratio = 200.0 / (high - low).max(10.0);
    let stretched = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0] as f32;
        Luma([((v - low + 25.0) * ratio).clamp(0.0, 255.0) as u8])
    });
    DynamicImage::ImageLuma8(stretched)
}

fn percentiles(gray: &GrayImage) -> (f32, f32) {
    let mut values: Vec<u8> = gray.pixels().map(|p| p[0]).collect();
    if values.is_empty() {
        return (0.0, 0.0);
    }
    values.sort_unstable();
    let at = |q: f32| values[((values.len() - 1) as f32 * q) as usize] as f32;
    (at(0.1), at(0.9))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageBuffer;

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128u8])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_preprocess_for_detection_aspect_ratio() {
        let img = create_test_image(800, 600);
        let (tensor, ratio) = preprocess_for_detection(&img, 640).unwrap();

        assert_eq!(tensor.shape()[0], 1);
        assert_eq!(tensor.shape()[1], 3);
        assert_eq!(tensor.shape()[2] % 32, 0);
        assert_eq!(tensor.shape()[3] % 32, 0);
        assert!(ratio < 1.0);
    }

    #[test]
    fn test_preprocess_for_detection_small_image() {
        let img = create_test_image(100, 100);
        let (tensor, ratio) = preprocess_for_detection(&img, 640).unwrap();

        assert!((ratio - 1.0).abs() < f32::EPSILON);
        assert_eq!(tensor.shape()[2], 128);
        assert_eq!(tensor.shape()[3], 128);
    }

    #[test]
    fn test_preprocess_for_recognition() {
        let img = create_test_image(200, 50);
        let tensor = preprocess_for_recognition(&img, 48).unwrap();

        assert_eq!(tensor.shape()[2], 48);
        assert_eq!(tensor.shape()[3] % 4, 0);
        assert!(tensor.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_crop_text_region_clamped() {
        let img = create_test_image(100, 100);
        let polygon = [[-10.0, -10.0], [150.0, -10.0], [150.0, 150.0], [-10.0, 150.0]];

        let crop = crop_text_region(&img, &polygon).unwrap();
        assert!(crop.width() <= 100);
        assert!(crop.height() <= 100);
    }

    #[test]
    fn test_adjust_contrast_stretches_faint_region() {
        let faint = DynamicImage::ImageLuma8(GrayImage::from_fn(40, 10, |x, _| {
            Luma([if x % 4 == 0 { 180 } else { 200 }])
        }));
        assert!(region_contrast(&faint) < 0.1);

        let adjusted = adjust_contrast(&faint, 0.5);
        assert!(region_contrast(&adjusted) > region_contrast(&faint));
    }
}
