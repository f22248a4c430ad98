//! Visual marker detection: stamps and handwritten signatures.
//!
//! Both detectors are pure functions of the image and degrade to `false`
//! rather than erroring; an undetected marker becomes a validation finding
//! downstream, not a pipeline failure.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::gradients::sobel_gradients;
use imageproc::morphology::{close, open};
use serde::{Deserialize, Serialize};

use super::extraction::preprocess::rgb_to_gray;
use super::geometry::{polygon_area, polygon_perimeter};

/// Stamp candidates below this area (px^2) are ink blots, not seals.
pub const STAMP_MIN_AREA: f64 = 1000.0;

/// 4*pi*A/P^2 cutoff; round seals score near 1.0, text blocks far below.
pub const STAMP_MIN_CIRCULARITY: f64 = 0.55;

/// Signature search is restricted to the bottom of the page.
pub const SIGNATURE_BAND_FRACTION: f32 = 0.3;

/// Edge-pixel share above which the signature band counts as handwritten.
pub const SIGNATURE_EDGE_DENSITY_THRESHOLD: f64 = 0.01;

/// Gradient-magnitude variance cutoff for the texture strategy.
pub const SIGNATURE_GRADIENT_VARIANCE_THRESHOLD: f64 = 1000.0;

/// Signature stroke clusters fall in this contour area range.
pub const SIGNATURE_CONTOUR_AREA: (f64, f64) = (500.0, 5000.0);

/// Signatures are sprawling, not round.
pub const SIGNATURE_MAX_COMPACTNESS: f64 = 0.5;

// Stamp ink hue bands in degrees, saturation/value floors in 0..1.
const RED_HUE_LOW: (f32, f32) = (0.0, 20.0);
const RED_HUE_HIGH: (f32, f32) = (340.0, 360.0);
const BLUE_HUE: (f32, f32) = (200.0, 260.0);
const MIN_SATURATION: f32 = 0.2;
const MIN_VALUE: f32 = 0.2;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// How to decide a signature is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStrategy {
    /// Edge density in the signature band.
    EdgeDensity,
    /// Gradient-variance plus sprawling-contour evidence.
    Texture,
}

#[derive(Debug, Clone)]
pub struct MarkerConfig {
    pub signature_strategy: SignatureStrategy,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            signature_strategy: SignatureStrategy::EdgeDensity,
        }
    }
}

/// The two booleans the validation rules consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Markers {
    pub has_stamp: bool,
    pub has_signature: bool,
}

/// Detect both markers on the normalized page.
pub fn detect(image: &RgbImage, config: &MarkerConfig) -> Markers {
    let has_stamp = detect_stamp(image);
    let has_signature = match config.signature_strategy {
        SignatureStrategy::EdgeDensity => detect_signature_edges(image),
        SignatureStrategy::Texture => detect_signature_texture(image),
    };
    Markers {
        has_stamp,
        has_signature,
    }
}

/// Stamps are round, saturated red or blue regions.
fn detect_stamp(image: &RgbImage) -> bool {
    let mask = stamp_ink_mask(image);
    let mask = close(&mask, Norm::LInf, 2);
    let mask = open(&mask, Norm::LInf, 2);

    for contour in find_contours::<i32>(&mask) {
        let area = polygon_area(&contour.points);
        if area <= STAMP_MIN_AREA {
            continue;
        }
        let perimeter = polygon_perimeter(&contour.points);
        if perimeter <= 0.0 {
            continue;
        }
        let circularity = 4.0 * std::f64::consts::PI * area / (perimeter * perimeter);
        if circularity > STAMP_MIN_CIRCULARITY {
            return true;
        }
    }
    false
}

fn stamp_ink_mask(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut mask = GrayImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let (h, s, v) = rgb_to_hsv(pixel);
        let is_ink = s >= MIN_SATURATION
            && v >= MIN_VALUE
            && (in_band(h, RED_HUE_LOW) || in_band(h, RED_HUE_HIGH) || in_band(h, BLUE_HUE));
        mask.put_pixel(x, y, Luma([if is_ink { 255 } else { 0 }]));
    }
    mask
}

fn in_band(value: f32, band: (f32, f32)) -> bool {
    value >= band.0 && value <= band.1
}

/// Hue in degrees 0..360, saturation and value in 0..1.
fn rgb_to_hsv(pixel: &Rgb<u8>) -> (f32, f32, f32) {
    let r = pixel.0[0] as f32 / 255.0;
    let g = pixel.0[1] as f32 / 255.0;
    let b = pixel.0[2] as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let saturation = if max == 0.0 { 0.0 } else { delta / max };
    (hue, saturation, max)
}

fn signature_band(image: &RgbImage) -> Option<GrayImage> {
    let (width, height) = image.dimensions();
    let band_start = (height as f32 * (1.0 - SIGNATURE_BAND_FRACTION)) as u32;
    let band_height = height - band_start;
    if band_height < 8 || width < 8 {
        return None;
    }

    let view = image::imageops::crop_imm(image, 0, band_start, width, band_height).to_image();
    Some(rgb_to_gray(&view))
}

/// Handwriting produces dense short edges where printed forms leave space.
fn detect_signature_edges(image: &RgbImage) -> bool {
    let Some(band) = signature_band(image) else {
        return false;
    };
    let edges = canny(&band, CANNY_LOW, CANNY_HIGH);
    let edge_pixels = edges.pixels().filter(|p| p.0[0] > 0).count();
    let total = (edges.width() * edges.height()) as f64;
    (edge_pixels as f64) / total > SIGNATURE_EDGE_DENSITY_THRESHOLD
}

/// Texture strategy: strong gradient variance together with at least one
/// sprawling non-circular stroke cluster.
fn detect_signature_texture(image: &RgbImage) -> bool {
    let Some(band) = signature_band(image) else {
        return false;
    };

    let gradients = sobel_gradients(&band);
    let values: Vec<f64> = gradients.pixels().map(|p| p.0[0] as f64).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    if variance <= SIGNATURE_GRADIENT_VARIANCE_THRESHOLD {
        return false;
    }

    let edges = canny(&band, CANNY_LOW, CANNY_HIGH);
    find_contours::<i32>(&edges).iter().any(|contour| {
        let area = polygon_area(&contour.points);
        if area <= SIGNATURE_CONTOUR_AREA.0 || area >= SIGNATURE_CONTOUR_AREA.1 {
            return false;
        }
        let perimeter = polygon_perimeter(&contour.points);
        if perimeter <= 0.0 {
            return false;
        }
        let compactness = 4.0 * std::f64::consts::PI * area / (perimeter * perimeter);
        compactness < SIGNATURE_MAX_COMPACTNESS
    })
}
