//! Eye geometry: isolating an eye, locating its pupil and computing gaze ratios.

use image::GrayImage;
use serde::Deserialize;

use crate::{
    gaze::GazeRatio,
    image::{
        process::{self, BilateralParams, DARK},
        EyeRegion, Frame,
    },
    landmark::{EyeSide, Landmarks},
};

/// Eye contours narrower or flatter than this (in pixels) are treated as undetectable.
const MIN_EYE_SPAN: f32 = 2.0;

/// Eye isolation and pupil processing parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EyeConfig {
    /// Margin around the eye contour's bounding box, in pixels.
    pub margin: u32,
    pub bilateral: BilateralParams,
    /// Number of 3x3 erosion passes applied before binarization.
    pub erode_iterations: u32,
}

impl Default for EyeConfig {
    fn default() -> Self {
        Self {
            margin: 5,
            bilateral: BilateralParams::default(),
            erode_iterations: 3,
        }
    }
}

/// One eye, isolated from a frame and preprocessed for pupil detection.
#[derive(Clone)]
pub struct Eye {
    side: EyeSide,
    region: EyeRegion,
    /// Smoothed and eroded crop, ready for binarization.
    processed: GrayImage,
    openness: Option<f32>,
}

impl Eye {
    /// Isolates the eye on `side` from `frame`.
    ///
    /// Returns `None` if the eye contour is degenerate (fewer than 3 distinct points or a
    /// bounding box without area), larger than the frame, or outside of it.
    pub fn isolate(
        frame: &Frame,
        landmarks: &Landmarks,
        side: EyeSide,
        config: &EyeConfig,
    ) -> Option<Self> {
        let contour = landmarks.eye(side);
        let polygon = contour
            .iter()
            .map(|lm| (lm.x() as i32, lm.y() as i32))
            .collect::<Vec<_>>();
        let region = EyeRegion::isolate(frame.image(), &polygon, config.margin)?;

        let smoothed = process::bilateral_filter(region.pixels(), &config.bilateral);
        let processed = process::erode(&smoothed, config.erode_iterations);

        Some(Self {
            side,
            openness: openness_ratio(&contour),
            region,
            processed,
        })
    }

    #[inline]
    pub fn side(&self) -> EyeSide {
        self.side
    }

    #[inline]
    pub fn region(&self) -> &EyeRegion {
        &self.region
    }

    /// Returns the smoothed and eroded eye crop.
    #[inline]
    pub fn processed(&self) -> &GrayImage {
        &self.processed
    }

    /// Height-to-width ratio of the eye contour. Small values indicate a closed eye.
    ///
    /// `None` if the contour has no width.
    #[inline]
    pub fn openness(&self) -> Option<f32> {
        self.openness
    }

    /// Binarizes the processed eye crop with `threshold`.
    pub fn binarize(&self, threshold: u8) -> GrayImage {
        process::threshold(&self.processed, threshold)
    }

    /// Locates the pupil as the centroid of the largest dark area after binarization.
    pub fn locate_pupil(&self, threshold: u8) -> Option<Pupil> {
        let binary = self.binarize(threshold);
        let blobs = dark_components(&binary);
        let total: u32 = blobs.iter().map(|b| b.area).sum();
        let largest = blobs.into_iter().max_by_key(|b| b.area)?;

        let position = PupilPosition {
            x: largest.sum_x as f32 / largest.area as f32,
            y: largest.sum_y as f32 / largest.area as f32,
            confidence: largest.area as f32 / total as f32,
        };
        log::trace!(
            "{:?} eye: pupil at {:?}, area {}, threshold {}",
            self.side,
            position,
            largest.area,
            threshold
        );

        Some(Pupil {
            position,
            area: largest.area,
            threshold,
        })
    }

    /// Computes the normalized position of `pupil` inside of the eye contour's bounding box.
    ///
    /// Returns `None` if the bounding box is too small in either direction.
    pub fn gaze_ratio(&self, pupil: &Pupil) -> Option<GazeRatio> {
        let margin = self.region.margin() as f32;
        let span_x = self.region.inner_width() as f32 - 1.0;
        let span_y = self.region.inner_height() as f32 - 1.0;
        if span_x < MIN_EYE_SPAN || span_y < MIN_EYE_SPAN {
            return None;
        }

        GazeRatio::new(
            (pupil.position.x - margin) / span_x,
            (pupil.position.y - margin) / span_y,
        )
    }

    /// Converts a pupil position to frame coordinates.
    pub fn pupil_frame_coords(&self, pupil: &Pupil) -> (i32, i32) {
        let (ox, oy) = self.region.origin();
        (
            ox + pupil.position.x.round() as i32,
            oy + pupil.position.y.round() as i32,
        )
    }
}

/// Position of the pupil inside of an [`EyeRegion`] crop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PupilPosition {
    pub x: f32,
    pub y: f32,
    /// Share of all dark pixels that belong to the pupil blob, in `(0.0, 1.0]`.
    ///
    /// Close to 1.0 when the binarized crop contains a single dark blob.
    pub confidence: f32,
}

/// A pupil located in an eye crop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pupil {
    position: PupilPosition,
    area: u32,
    threshold: u8,
}

impl Pupil {
    #[inline]
    pub fn position(&self) -> PupilPosition {
        self.position
    }

    /// Number of pixels in the pupil blob.
    #[inline]
    pub fn area(&self) -> u32 {
        self.area
    }

    /// The binarization threshold the pupil was located with.
    #[inline]
    pub fn threshold(&self) -> u8 {
        self.threshold
    }
}

/// Computes the height-to-width ratio of a 6-point eye contour.
fn openness_ratio(contour: &[crate::landmark::Landmark; 6]) -> Option<f32> {
    let width = contour[0].distance(contour[3]);
    let top = contour[1].midpoint(contour[2]);
    let bottom = contour[5].midpoint(contour[4]);
    let height = top.distance(bottom);

    if width < f32::EPSILON {
        return None;
    }
    Some(height / width)
}

struct Blob {
    area: u32,
    sum_x: u64,
    sum_y: u64,
}

/// Finds the 4-connected components of [`DARK`] pixels in a binarized image.
fn dark_components(binary: &GrayImage) -> Vec<Blob> {
    let (width, height) = (binary.width(), binary.height());
    let mut visited = vec![false; (width * height) as usize];
    let mut blobs = Vec::new();
    let mut stack = Vec::new();

    for start_y in 0..height {
        for start_x in 0..width {
            let start = (start_y * width + start_x) as usize;
            if visited[start] || binary.get_pixel(start_x, start_y)[0] != DARK {
                continue;
            }

            let mut blob = Blob {
                area: 0,
                sum_x: 0,
                sum_y: 0,
            };
            visited[start] = true;
            stack.push((start_x, start_y));
            while let Some((x, y)) = stack.pop() {
                blob.area += 1;
                blob.sum_x += u64::from(x);
                blob.sum_y += u64::from(y);

                let neighbors = [
                    (x.wrapping_sub(1), y),
                    (x + 1, y),
                    (x, y.wrapping_sub(1)),
                    (x, y + 1),
                ];
                for (nx, ny) in neighbors {
                    if nx >= width || ny >= height {
                        continue;
                    }
                    let idx = (ny * width + nx) as usize;
                    if !visited[idx] && binary.get_pixel(nx, ny)[0] == DARK {
                        visited[idx] = true;
                        stack.push((nx, ny));
                    }
                }
            }
            blobs.push(blob);
        }
    }

    blobs
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image::Luma;

    use super::*;
    use crate::landmark::Landmark;

    /// Writes an eye contour of the given size centered on `(cx, cy)` into `landmarks`.
    fn eye_landmarks(side: EyeSide, cx: f32, cy: f32, w: f32, h: f32) -> Landmarks {
        let mut lms = Landmarks::new();
        let pts = [
            [cx - w / 2.0, cy],
            [cx - w / 6.0, cy - h / 2.0],
            [cx + w / 6.0, cy - h / 2.0],
            [cx + w / 2.0, cy],
            [cx + w / 6.0, cy + h / 2.0],
            [cx - w / 6.0, cy + h / 2.0],
        ];
        for (i, p) in side.landmark_indices().zip(pts) {
            lms.set(i, Landmark::new(p));
        }
        lms
    }

    fn frame_with_pupil(px: u32, py: u32) -> Frame {
        let mut img = GrayImage::from_pixel(200, 100, Luma([230]));
        for y in 0..100u32 {
            for x in 0..200u32 {
                let (dx, dy) = (x as f32 - px as f32, y as f32 - py as f32);
                if dx * dx + dy * dy <= 16.0 {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        Frame::new(img, Duration::ZERO)
    }

    #[test]
    fn test_centered_pupil() {
        let frame = frame_with_pupil(100, 50);
        let lms = eye_landmarks(EyeSide::Left, 100.0, 50.0, 60.0, 24.0);
        let eye = Eye::isolate(&frame, &lms, EyeSide::Left, &EyeConfig::default()).unwrap();
        let pupil = eye.locate_pupil(20).unwrap();
        assert!(pupil.position().confidence > 0.99);
        let ratio = eye.gaze_ratio(&pupil).unwrap();
        assert!((ratio.horizontal() - 0.5).abs() < 0.05, "{ratio:?}");
        assert!((ratio.vertical() - 0.5).abs() < 0.1, "{ratio:?}");
        let (x, y) = eye.pupil_frame_coords(&pupil);
        assert!((x - 100).abs() <= 1 && (y - 50).abs() <= 1, "{x},{y}");
    }

    #[test]
    fn test_pupil_to_the_side() {
        let frame = frame_with_pupil(82, 50);
        let lms = eye_landmarks(EyeSide::Right, 100.0, 50.0, 60.0, 24.0);
        let eye = Eye::isolate(&frame, &lms, EyeSide::Right, &EyeConfig::default()).unwrap();
        let ratio = eye.gaze_ratio(&eye.locate_pupil(20).unwrap()).unwrap();
        assert!(ratio.horizontal() < 0.3, "{ratio:?}");
    }

    #[test]
    fn test_no_dark_pixels() {
        let frame = Frame::new(GrayImage::from_pixel(200, 100, Luma([230])), Duration::ZERO);
        let lms = eye_landmarks(EyeSide::Left, 100.0, 50.0, 60.0, 24.0);
        let eye = Eye::isolate(&frame, &lms, EyeSide::Left, &EyeConfig::default()).unwrap();
        assert!(eye.locate_pupil(100).is_none());
    }

    #[test]
    fn test_closed_eye_has_no_ratio() {
        let frame = frame_with_pupil(100, 50);
        let lms = eye_landmarks(EyeSide::Left, 100.0, 50.0, 60.0, 0.0);
        let eye = Eye::isolate(&frame, &lms, EyeSide::Left, &EyeConfig::default()).unwrap();
        assert_eq!(eye.openness(), Some(0.0));
        if let Some(pupil) = eye.locate_pupil(20) {
            assert!(eye.gaze_ratio(&pupil).is_none());
        }
    }

    #[test]
    fn test_extreme_landmarks() {
        let frame = frame_with_pupil(100, 50);
        let config = EyeConfig::default();
        for (cx, w) in [(0.0, f32::MAX), (100.0, 1.0e6), (1.0e9, 60.0)] {
            let lms = eye_landmarks(EyeSide::Left, cx, 50.0, w, 24.0);
            assert!(
                Eye::isolate(&frame, &lms, EyeSide::Left, &config).is_none(),
                "cx={cx} w={w}"
            );
        }
    }

    #[test]
    fn test_openness() {
        let lms = eye_landmarks(EyeSide::Left, 100.0, 50.0, 60.0, 15.0);
        let openness = openness_ratio(&lms.eye(EyeSide::Left)).unwrap();
        assert!((openness - 0.25).abs() < 1e-6);

        let collapsed = eye_landmarks(EyeSide::Left, 100.0, 50.0, 0.0, 0.0);
        assert_eq!(openness_ratio(&collapsed.eye(EyeSide::Left)), None);
    }

    #[test]
    fn test_components() {
        let mut img = GrayImage::from_pixel(10, 10, Luma([255]));
        for (x, y) in [(1, 1), (1, 2), (2, 2), (7, 7)] {
            img.put_pixel(x, y, Luma([0]));
        }
        let blobs = dark_components(&img);
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].area, 3);
        assert_eq!(blobs[1].area, 1);
    }
}
