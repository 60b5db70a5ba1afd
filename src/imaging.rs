//! Derived renditions of uploaded images.
//!
//! processed: 512x512, aspect preserved, letterboxed on white, JPEG q90
//! thumbnail: 150x150, center-cropped to fill, JPEG q80

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageError, Rgba, RgbaImage, RgbImage};

use crate::error::{AppError, AppResult};

pub const PROCESSED_SIZE: u32 = 512;
pub const PROCESSED_QUALITY: u8 = 90;
pub const THUMBNAIL_SIZE: u32 = 150;
pub const THUMBNAIL_QUALITY: u8 = 80;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/bmp",
    "image/tiff",
];

pub fn is_allowed_mime(mime: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime.to_ascii_lowercase().as_str())
}

/// File extension used for the stored original.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        _ => "jpg",
    }
}

#[derive(Debug)]
pub struct Renditions {
    pub width: u32,
    pub height: u32,
    pub processed: Vec<u8>,
    pub thumbnail: Vec<u8>,
}

/// Decodes `bytes` and builds both renditions on the blocking pool.
pub async fn render(bytes: Vec<u8>) -> AppResult<Renditions> {
    tokio::task::spawn_blocking(move || render_blocking(&bytes))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("image task failed: {}", e)))?
        .map_err(AppError::from)
}

pub fn render_blocking(bytes: &[u8]) -> Result<Renditions, ImageError> {
    let img = image::load_from_memory(bytes)?;
    let (width, height) = img.dimensions();

    let processed = contain_on_white(&img, PROCESSED_SIZE);
    let thumbnail = img.resize_to_fill(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Lanczos3).to_rgb8();

    Ok(Renditions {
        width,
        height,
        processed: encode_jpeg(&processed, PROCESSED_QUALITY)?,
        thumbnail: encode_jpeg(&thumbnail, THUMBNAIL_QUALITY)?,
    })
}

fn contain_on_white(img: &DynamicImage, size: u32) -> RgbImage {
    let fitted = img.resize(size, size, FilterType::Lanczos3).to_rgba8();
    let mut canvas = RgbaImage::from_pixel(size, size, Rgba([255, 255, 255, 255]));
    let x = (size.saturating_sub(fitted.width()) / 2) as i64;
    let y = (size.saturating_sub(fitted.height()) / 2) as i64;
    imageops::overlay(&mut canvas, &fitted, x, y);
    DynamicImage::ImageRgba8(canvas).to_rgb8()
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(img)?;
    Ok(buf)
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, 40]));
    let mut buf = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}
