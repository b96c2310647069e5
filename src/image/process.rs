//! Image processing used to isolate the iris in an eye crop.
//!
//! The pipeline is: edge-preserving smoothing ([`bilateral_filter`]), growing dark areas with
//! [`erode`] to close gaps left by reflections, then binarization with [`threshold`].

use image::{GrayImage, Luma};
use serde::Deserialize;

/// Pixel value of foreground (iris) pixels after binarization.
pub const DARK: u8 = 0;
/// Pixel value of background pixels after binarization.
pub const LIGHT: u8 = 255;

/// Parameters of the bilateral filter.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BilateralParams {
    /// Diameter of the pixel neighborhood.
    pub diameter: u32,
    /// Filter sigma in the intensity domain. Larger values mix more dissimilar intensities.
    pub sigma_color: f32,
    /// Filter sigma in the coordinate domain. Larger values mix pixels farther apart.
    pub sigma_space: f32,
}

impl Default for BilateralParams {
    fn default() -> Self {
        Self {
            diameter: 10,
            sigma_color: 15.0,
            sigma_space: 15.0,
        }
    }
}

/// Smooths `image` while preserving edges.
///
/// Every output pixel is the average of the pixels in a circular neighborhood, weighted by both
/// their spatial distance and their intensity difference to the center pixel. Out-of-bounds
/// neighbors are replaced by the closest edge pixel.
pub fn bilateral_filter(image: &GrayImage, params: &BilateralParams) -> GrayImage {
    let radius = (params.diameter / 2) as i32;
    let (width, height) = (image.width() as i32, image.height() as i32);
    if width == 0 || height == 0 || radius == 0 {
        return image.clone();
    }

    let color_coeff = -0.5 / (params.sigma_color * params.sigma_color);
    let space_coeff = -0.5 / (params.sigma_space * params.sigma_space);
    let color_weights: Vec<f32> = (0..256)
        .map(|diff| ((diff * diff) as f32 * color_coeff).exp())
        .collect();

    let mut kernel = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist_sq = (dx * dx + dy * dy) as f32;
            if dist_sq > (radius * radius) as f32 {
                continue;
            }
            kernel.push((dx, dy, (dist_sq * space_coeff).exp()));
        }
    }

    let mut out = GrayImage::new(image.width(), image.height());
    for y in 0..height {
        for x in 0..width {
            let center = image.get_pixel(x as u32, y as u32)[0];
            let mut sum = 0.0;
            let mut weight_sum = 0.0;
            for &(dx, dy, space_weight) in &kernel {
                let nx = (x + dx).clamp(0, width - 1);
                let ny = (y + dy).clamp(0, height - 1);
                let value = image.get_pixel(nx as u32, ny as u32)[0];
                let weight = space_weight * color_weights[usize::from(center.abs_diff(value))];
                sum += weight * f32::from(value);
                weight_sum += weight;
            }
            let value = (sum / weight_sum).round().clamp(0.0, 255.0) as u8;
            out.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }
    out
}

/// Erodes `image` with a 3x3 rectangular structuring element, `iterations` times.
///
/// Erosion replaces every pixel by the minimum of its neighborhood, so dark areas grow. Only
/// in-bounds neighbors are considered.
pub fn erode(image: &GrayImage, iterations: u32) -> GrayImage {
    let mut current = image.clone();
    let (width, height) = (image.width() as i32, image.height() as i32);
    for _ in 0..iterations {
        let mut next = current.clone();
        for y in 0..height {
            for x in 0..width {
                let mut min = u8::MAX;
                for ny in (y - 1).max(0)..=(y + 1).min(height - 1) {
                    for nx in (x - 1).max(0)..=(x + 1).min(width - 1) {
                        min = min.min(current.get_pixel(nx as u32, ny as u32)[0]);
                    }
                }
                next.put_pixel(x as u32, y as u32, Luma([min]));
            }
        }
        current = next;
    }
    current
}

/// Binarizes `image`: pixels brighter than `threshold` become [`LIGHT`], all others [`DARK`].
pub fn threshold(image: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = if pixel[0] > threshold { LIGHT } else { DARK };
    }
    out
}

/// Returns the fraction of [`DARK`] pixels in a binarized image, ignoring an `inset` pixel wide
/// border on every side.
///
/// Returns `None` if nothing remains after removing the border.
pub fn dark_fraction(binary: &GrayImage, inset: u32) -> Option<f32> {
    let width = binary.width().checked_sub(2 * inset).filter(|&w| w > 0)?;
    let height = binary.height().checked_sub(2 * inset).filter(|&h| h > 0)?;

    let mut dark = 0u32;
    for y in inset..inset + height {
        for x in inset..inset + width {
            if binary.get_pixel(x, y)[0] == DARK {
                dark += 1;
            }
        }
    }
    Some(dark as f32 / (width * height) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> GrayImage {
        GrayImage::from_fn(8, 8, |x, _| if x < 4 { Luma([10]) } else { Luma([200]) })
    }

    #[test]
    fn test_bilateral_preserves_edges() {
        let out = bilateral_filter(&checker(), &BilateralParams::default());
        assert_eq!(out.get_pixel(3, 3)[0], 10);
        assert_eq!(out.get_pixel(4, 3)[0], 200);
    }

    #[test]
    fn test_bilateral_smooths_noise() {
        let mut image = GrayImage::from_pixel(9, 9, Luma([100]));
        image.put_pixel(4, 4, Luma([110]));
        let out = bilateral_filter(&image, &BilateralParams::default());
        let center = out.get_pixel(4, 4)[0];
        assert!(center < 110 && center >= 100, "{center}");
    }

    #[test]
    fn test_erode_grows_dark() {
        let mut image = GrayImage::from_pixel(7, 7, Luma([255]));
        image.put_pixel(3, 3, Luma([0]));
        let once = erode(&image, 1);
        assert_eq!(once.get_pixel(2, 2)[0], 0);
        assert_eq!(once.get_pixel(1, 1)[0], 255);
        let twice = erode(&image, 2);
        assert_eq!(twice.get_pixel(1, 1)[0], 0);
        assert_eq!(twice.get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn test_threshold_and_fraction() {
        let binary = threshold(&checker(), 10);
        assert_eq!(binary.get_pixel(0, 0)[0], DARK);
        assert_eq!(binary.get_pixel(7, 0)[0], LIGHT);
        assert_eq!(dark_fraction(&binary, 0), Some(0.5));
        assert_eq!(dark_fraction(&binary, 2), Some(0.5));
        assert_eq!(dark_fraction(&binary, 4), None);
    }
}
