//! Image preparation for the classical OCR engine.
//!
//! Produces a binarized, sharpened variant of the normalized page. Vision
//! models get the untouched color image; aggressive binarization helps
//! Tesseract but destroys context a VLM relies on.

use image::{GrayImage, RgbImage};
use imageproc::contrast::adaptive_threshold;
use imageproc::distance_transform::Norm;
use imageproc::filter::sharpen3x3;
use imageproc::morphology::{close, open};

use super::ExtractionError;

/// Neighborhood radius for adaptive binarization (11px blocks).
const BINARIZE_BLOCK_RADIUS: u32 = 5;

/// Luma conversion used across the pipeline (ITU-R BT.601 weights).
pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        gray.put_pixel(x, y, image::Luma([luma.round() as u8]));
    }
    gray
}

/// Binarize and sharpen a page for Tesseract.
pub fn binarize_for_ocr(image: &RgbImage) -> GrayImage {
    let gray = rgb_to_gray(image);
    let binary = adaptive_threshold(&gray, BINARIZE_BLOCK_RADIUS);
    let binary = close(&binary, Norm::LInf, 1);
    let binary = open(&binary, Norm::LInf, 1);
    sharpen3x3(&binary)
}

/// Encode an RGB image as PNG for engines that take raw bytes.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, ExtractionError> {
    let mut bytes = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut bytes);
    image
        .write_to(&mut cursor, image::ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageEncoding(e.to_string()))?;
    Ok(bytes)
}

/// Encode a grayscale image as PNG.
pub fn encode_gray_png(image: &GrayImage) -> Result<Vec<u8>, ExtractionError> {
    let mut bytes = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut bytes);
    image
        .write_to(&mut cursor, image::ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageEncoding(e.to_string()))?;
    Ok(bytes)
}
