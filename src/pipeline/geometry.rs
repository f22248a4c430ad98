//! Geometry normalization: perspective correction and denoising.
//!
//! Best effort by design: a scan where no document quad is found passes
//! through with denoising only. This stage never fails.

use image::{imageops, Rgb, RgbImage};
use imageproc::contours::find_contours;
use imageproc::edges::canny;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::geometry::approximate_polygon_dp;
use imageproc::point::Point;

use super::extraction::preprocess::rgb_to_gray;

/// Scans wider than this are downscaled before any processing.
pub const MAX_PAGE_WIDTH: u32 = 2000;

/// Canny thresholds tuned for paper edges on desk backgrounds.
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// Only the largest contours can plausibly be the page outline.
const CANDIDATE_CONTOURS: usize = 5;

/// Polygon simplification tolerance as a fraction of the contour perimeter.
const APPROX_EPSILON_RATIO: f64 = 0.02;

/// Reject quads that would warp to a sliver.
const MIN_WARP_DIM: u32 = 50;

/// Normalize page geometry: downscale oversized scans, straighten the
/// document if its outline is detectable, then denoise.
pub fn normalize(image: &RgbImage) -> RgbImage {
    let scaled = downscale(image);
    let straightened = correct_perspective(&scaled).unwrap_or(scaled);
    denoise(&straightened)
}

fn downscale(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    if width <= MAX_PAGE_WIDTH {
        return image.clone();
    }
    let new_height = (height as f32 * MAX_PAGE_WIDTH as f32 / width as f32).round() as u32;
    imageops::resize(
        image,
        MAX_PAGE_WIDTH,
        new_height.max(1),
        imageops::FilterType::Triangle,
    )
}

/// Find the document quad and warp it to a front-on rectangle.
/// Returns None when no usable four-sided contour exists.
fn correct_perspective(image: &RgbImage) -> Option<RgbImage> {
    let gray = rgb_to_gray(image);
    let edges = canny(&gray, CANNY_LOW, CANNY_HIGH);

    let mut contours = find_contours::<i32>(&edges);
    contours.sort_by(|a, b| {
        polygon_area(&b.points)
            .partial_cmp(&polygon_area(&a.points))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for contour in contours.iter().take(CANDIDATE_CONTOURS) {
        let perimeter = polygon_perimeter(&contour.points);
        if perimeter <= 0.0 {
            continue;
        }
        let approx = approximate_polygon_dp(&contour.points, APPROX_EPSILON_RATIO * perimeter, true);
        if approx.len() != 4 {
            continue;
        }
        if let Some(warped) = warp_to_rect(image, &approx) {
            return Some(warped);
        }
    }

    None
}

/// Corners ordered top-left, top-right, bottom-right, bottom-left.
/// The extremes of x+y give the diagonal corners, the extremes of y-x the
/// other two.
fn order_corners(points: &[Point<i32>]) -> [(f32, f32); 4] {
    let as_f32: Vec<(f32, f32)> = points.iter().map(|p| (p.x as f32, p.y as f32)).collect();

    let by_sum = |p: &(f32, f32)| p.0 + p.1;
    let by_diff = |p: &(f32, f32)| p.1 - p.0;

    let tl = *min_by_key_f32(&as_f32, by_sum);
    let br = *max_by_key_f32(&as_f32, by_sum);
    let tr = *min_by_key_f32(&as_f32, by_diff);
    let bl = *max_by_key_f32(&as_f32, by_diff);

    [tl, tr, br, bl]
}

fn min_by_key_f32<'a, F: Fn(&(f32, f32)) -> f32>(points: &'a [(f32, f32)], key: F) -> &'a (f32, f32) {
    let mut best = &points[0];
    for p in points {
        if key(p) < key(best) {
            best = p;
        }
    }
    best
}

fn max_by_key_f32<'a, F: Fn(&(f32, f32)) -> f32>(points: &'a [(f32, f32)], key: F) -> &'a (f32, f32) {
    let mut best = &points[0];
    for p in points {
        if key(p) > key(best) {
            best = p;
        }
    }
    best
}

fn warp_to_rect(image: &RgbImage, quad: &[Point<i32>]) -> Option<RgbImage> {
    let [tl, tr, br, bl] = order_corners(quad);

    // Target size comes from the longer of each opposing side pair so the
    // warp only ever stretches, never squeezes detail away.
    let width = distance(br, bl).max(distance(tr, tl)).round() as u32;
    let height = distance(tr, br).max(distance(tl, bl)).round() as u32;
    if width < MIN_WARP_DIM || height < MIN_WARP_DIM {
        return None;
    }

    let w = (width - 1) as f32;
    let h = (height - 1) as f32;
    let projection = Projection::from_control_points(
        [tl, tr, br, bl],
        [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)],
    )?;

    let mut out = RgbImage::new(width, height);
    warp_into(
        image,
        &projection,
        Interpolation::Bilinear,
        Rgb([255, 255, 255]),
        &mut out,
    );
    Some(out)
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Shoelace area of a closed polygon.
pub(crate) fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0i64;
    for i in 0..points.len() {
        let a = &points[i];
        let b = &points[(i + 1) % points.len()];
        twice_area += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
    }
    (twice_area.abs() as f64) / 2.0
}

/// Perimeter of a closed polygon.
pub(crate) fn polygon_perimeter(points: &[Point<i32>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for i in 0..points.len() {
        let a = &points[i];
        let b = &points[(i + 1) % points.len()];
        let dx = (a.x - b.x) as f64;
        let dy = (a.y - b.y) as f64;
        total += (dx * dx + dy * dy).sqrt();
    }
    total
}

/// Simplified bilateral filter: 5x5 window, fixed spatial falloff, range
/// weight on luma difference. Preserves text edges while flattening paper
/// grain.
fn denoise(image: &RgbImage) -> RgbImage {
    const RADIUS: i32 = 2;
    const RANGE_SIGMA: f32 = 30.0;
    const SPATIAL_SIGMA: f32 = 2.0;

    let (width, height) = image.dimensions();
    let mut out = RgbImage::new(width, height);

    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let center = image.get_pixel(x as u32, y as u32);
            let center_luma = luma(center);

            let mut acc = [0.0f32; 3];
            let mut weight_sum = 0.0f32;

            for dy in -RADIUS..=RADIUS {
                for dx in -RADIUS..=RADIUS {
                    let nx = (x + dx).clamp(0, width as i32 - 1);
                    let ny = (y + dy).clamp(0, height as i32 - 1);
                    let neighbor = image.get_pixel(nx as u32, ny as u32);

                    let spatial = (-((dx * dx + dy * dy) as f32)
                        / (2.0 * SPATIAL_SIGMA * SPATIAL_SIGMA))
                        .exp();
                    let range_delta = luma(neighbor) - center_luma;
                    let range =
                        (-(range_delta * range_delta) / (2.0 * RANGE_SIGMA * RANGE_SIGMA)).exp();

                    let weight = spatial * range;
                    weight_sum += weight;
                    for c in 0..3 {
                        acc[c] += neighbor.0[c] as f32 * weight;
                    }
                }
            }

            let pixel = Rgb([
                (acc[0] / weight_sum).round() as u8,
                (acc[1] / weight_sum).round() as u8,
                (acc[2] / weight_sum).round() as u8,
            ]);
            out.put_pixel(x as u32, y as u32, pixel);
        }
    }

    out
}

fn luma(pixel: &Rgb<u8>) -> f32 {
    let [r, g, b] = pixel.0;
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_never_panics_on_flat_image() {
        let img = RgbImage::from_pixel(64, 48, Rgb([250, 250, 250]));
        let out = normalize(&img);
        assert_eq!(out.dimensions(), (64, 48));
    }

    #[test]
    fn flat_image_passes_through_nearly_unchanged() {
        // No edges, no quad: denoise of a constant image is the identity
        let img = RgbImage::from_pixel(32, 32, Rgb([200, 200, 200]));
        let out = normalize(&img);
        assert_eq!(out.get_pixel(16, 16), &Rgb([200, 200, 200]));
    }

    #[test]
    fn oversized_scan_is_downscaled() {
        let img = RgbImage::from_pixel(4000, 2000, Rgb([255, 255, 255]));
        let out = normalize(&img);
        assert_eq!(out.width(), MAX_PAGE_WIDTH);
        assert_eq!(out.height(), 1000);
    }

    #[test]
    fn small_scan_keeps_its_size() {
        let img = RgbImage::from_pixel(800, 600, Rgb([255, 255, 255]));
        assert_eq!(downscale(&img).dimensions(), (800, 600));
    }

    #[test]
    fn corners_ordered_clockwise_from_top_left() {
        let quad = vec![
            Point::new(90, 110),
            Point::new(10, 100),
            Point::new(100, 10),
            Point::new(5, 8),
        ];
        let [tl, tr, br, bl] = order_corners(&quad);
        assert_eq!(tl, (5.0, 8.0));
        assert_eq!(tr, (100.0, 10.0));
        assert_eq!(br, (90.0, 110.0));
        assert_eq!(bl, (10.0, 100.0));
    }

    #[test]
    fn shoelace_area_of_square() {
        let square = vec![
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
        ];
        assert!((polygon_area(&square) - 100.0).abs() < 1e-9);
        assert!((polygon_perimeter(&square) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_polygons_have_zero_area() {
        assert_eq!(polygon_area(&[Point::new(1, 1)]), 0.0);
        assert_eq!(polygon_perimeter(&[Point::new(1, 1)]), 0.0);
    }

    #[test]
    fn sliver_quads_are_rejected() {
        let img = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
        let quad = vec![
            Point::new(0, 0),
            Point::new(199, 0),
            Point::new(199, 3),
            Point::new(0, 3),
        ];
        assert!(warp_to_rect(&img, &quad).is_none());
    }

    #[test]
    fn document_quad_warps_to_expected_size() {
        let img = RgbImage::from_pixel(400, 400, Rgb([255, 255, 255]));
        let quad = vec![
            Point::new(50, 50),
            Point::new(349, 60),
            Point::new(339, 349),
            Point::new(40, 339),
        ];
        let warped = warp_to_rect(&img, &quad).expect("valid quad should warp");
        assert!(warped.width() >= 280 && warped.width() <= 320);
        assert!(warped.height() >= 280 && warped.height() <= 320);
    }

    #[test]
    fn denoise_flattens_isolated_speck() {
        let mut img = RgbImage::from_pixel(16, 16, Rgb([255, 255, 255]));
        img.put_pixel(8, 8, Rgb([235, 235, 235]));
        let out = denoise(&img);
        // The speck is close enough in luma to be averaged toward paper white
        assert!(out.get_pixel(8, 8).0[0] > 235);
    }
}
