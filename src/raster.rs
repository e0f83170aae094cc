//! Raster loading and input sniffing.
//!
//! Turns request bytes into a [`RasterImage`]: single images are decoded with
//! the `image` crate (EXIF orientation applied, then bounded to the configured
//! maximum side), multi-page documents are recognised by their `%PDF-` magic
//! and handed to a [`PageRasterizer`] collaborator.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageDecoder, ImageFormat, ImageReader, RgbImage};

use crate::error::{OcrError, OcrResult};

/// Magic prefix of a PDF file.
const PDF_MAGIC: &[u8] = b"%PDF-";

/// What kind of payload a byte stream holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Multi-page PDF document
    Pdf,
    /// Single raster image in a format the `image` crate recognises
    Raster(ImageFormat),
    /// Neither of the above
    Unknown,
}

/// Classify raw input bytes by their magic numbers.
pub fn sniff(bytes: &[u8]) -> InputKind {
    if bytes.starts_with(PDF_MAGIC) {
        return InputKind::Pdf;
    }
    match image::guess_format(bytes) {
        Ok(format) => InputKind::Raster(format),
        Err(_) => InputKind::Unknown,
    }
}

/// Splits a multi-page document into per-page raster blobs.
///
/// Rendering PDF pages is owned by a collaborator (a PDF renderer at roughly
/// 220 dpi); the pipeline only needs the resulting page images.
pub trait PageRasterizer: Send + Sync {
    /// Render every page of `document` into encoded image bytes, in page order.
    fn rasterize(&self, document: &[u8]) -> OcrResult<Vec<Vec<u8>>>;
}

/// An immutable 2-D grid of 8-bit grayscale or RGB samples.
///
/// Stages never mutate a raster in place; each one returns a new
/// `RasterImage`, so intermediate results can be kept and compared freely.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    image: DynamicImage,
}

impl RasterImage {
    /// Wrap a grayscale buffer.
    pub fn from_gray(gray: GrayImage) -> Self {
        Self {
            image: DynamicImage::ImageLuma8(gray),
        }
    }

    /// Wrap an RGB buffer.
    pub fn from_rgb(rgb: RgbImage) -> Self {
        Self {
            image: DynamicImage::ImageRgb8(rgb),
        }
    }

    /// Convert any decoded image into 8-bit grayscale or RGB.
    ///
    /// Alpha is dropped and deep samples are reduced to 8 bits.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(gray) => Self::from_gray(gray),
            DynamicImage::ImageRgb8(rgb) => Self::from_rgb(rgb),
            other if other.color().has_color() => Self::from_rgb(other.to_rgb8()),
            other => Self::from_gray(other.to_luma8()),
        }
    }

    /// Decode encoded image bytes.
    ///
    /// EXIF orientation is applied, and the result is downscaled so that its
    /// larger side does not exceed `max_dimension`.
    pub fn decode(bytes: &[u8], max_dimension: u32) -> OcrResult<Self> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        if reader.format().is_none() {
            return Err(OcrError::UnsupportedInput(
                "bytes are not a recognised image format".to_string(),
            ));
        }

        let mut decoder = reader.into_decoder().map_err(unsupported)?;
        let orientation = decoder.orientation().map_err(unsupported)?;
        let mut image = DynamicImage::from_decoder(decoder).map_err(unsupported)?;
        image.apply_orientation(orientation);

        if image.width() == 0 || image.height() == 0 {
            return Err(OcrError::UnsupportedInput("image has zero dimensions".to_string()));
        }

        log::debug!(
            "Decoded {}x{} raster ({:?})",
            image.width(),
            image.height(),
            image.color()
        );

        Ok(Self::from_dynamic(image).fit_within(max_dimension))
    }

    /// Downscale so that the larger side is at most `max_side`.
    pub fn fit_within(self, max_side: u32) -> Self {
        let (w, h) = (self.width(), self.height());
        if w.max(h) <= max_side {
            return self;
        }
        let ratio = max_side as f32 / w.max(h) as f32;
        let new_w = ((w as f32 * ratio) as u32).max(1);
        let new_h = ((h as f32 * ratio) as u32).max(1);
        log::debug!("Downscaling raster {}x{} -> {}x{}", w, h, new_w, new_h);
        Self::from_dynamic(self.image.resize_exact(new_w, new_h, FilterType::CatmullRom))
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Number of channels (1 for grayscale, 3 for RGB).
    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    /// Whether samples are single-channel.
    pub fn is_grayscale(&self) -> bool {
        self.channels() == 1
    }

    /// Grayscale copy of the samples.
    pub fn to_gray(&self) -> GrayImage {
        match &self.image {
            DynamicImage::ImageLuma8(gray) => gray.clone(),
            other => other.to_luma8(),
        }
    }

    /// Borrow the underlying image.
    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    /// Consume into the underlying image.
    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    /// Copy out a sub-rectangle, clamped to the raster bounds.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let x = x.min(self.width());
        let y = y.min(self.height());
        let width = width.min(self.width() - x);
        let height = height.min(self.height() - y);
        Self {
            image: self.image.crop_imm(x, y, width, height),
        }
    }

    /// Encode as PNG bytes (for engines that consume encoded images).
    pub fn to_png(&self) -> OcrResult<Vec<u8>> {
        let mut buffer = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(buffer)
    }
}

fn unsupported(err: image::ImageError) -> OcrError {
    OcrError::UnsupportedInput(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128u8])
        });
        RasterImage::from_rgb(img).to_png().unwrap()
    }

    #[test]
    fn test_sniff_pdf() {
        assert_eq!(sniff(b"%PDF-1.7\n..."), InputKind::Pdf);
    }

    #[test]
    fn test_sniff_png() {
        assert_eq!(sniff(&png_bytes(4, 4)), InputKind::Raster(ImageFormat::Png));
    }

    #[test]
    fn test_sniff_unknown() {
        assert_eq!(sniff(b"hello world"), InputKind::Unknown);
        assert_eq!(sniff(b""), InputKind::Unknown);
    }

    #[test]
    fn test_decode_png() {
        let raster = RasterImage::decode(&png_bytes(64, 32), 2000).unwrap();
        assert_eq!(raster.width(), 64);
        assert_eq!(raster.height(), 32);
        assert_eq!(raster.channels(), 3);
    }

    #[test]
    fn test_decode_downscales_to_max_dimension() {
        let raster = RasterImage::decode(&png_bytes(400, 200), 100).unwrap();
        assert_eq!(raster.width(), 100);
        assert_eq!(raster.height(), 50);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = RasterImage::decode(b"definitely not an image", 2000).unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedInput(_)));
    }

    #[test]
    fn test_from_dynamic_drops_alpha() {
        let rgba = DynamicImage::new_rgba8(3, 3);
        assert_eq!(RasterImage::from_dynamic(rgba).channels(), 3);

        let la = DynamicImage::new_luma_a8(3, 3);
        assert_eq!(RasterImage::from_dynamic(la).channels(), 1);
    }

    #[test]
    fn test_crop_clamped() {
        let raster = RasterImage::from_gray(GrayImage::from_pixel(50, 40, Luma([255])));
        let crop = raster.crop(40, 30, 100, 100);
        assert_eq!((crop.width(), crop.height()), (10, 10));
    }
}
