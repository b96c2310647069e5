//! Frame and eye-region image handling.
//!
//! This module provides:
//!
//! - The [`Frame`] type, a grayscale video frame with its capture timestamp.
//! - [`EyeRegion`], a crop of one eye with everything outside the eye contour masked out.
//! - Pupil image processing (bilateral filter, erosion, binarization) in [`process`].
//! - [`Rect`], an integer-valued rectangle.
//! - Visualization helpers in [`draw`].

pub mod draw;
pub mod process;
mod rect;

use std::time::Duration;

use image::{DynamicImage, GrayImage, Luma};

use crate::resolution::Resolution;

pub use rect::Rect;

/// Pixel value used for everything outside of the eye contour.
const MASK_VALUE: u8 = 255;

/// A single grayscale video frame.
#[derive(Clone)]
pub struct Frame {
    image: GrayImage,
    timestamp: Duration,
}

impl Frame {
    /// Creates a frame from a grayscale image.
    ///
    /// `timestamp` is the capture time relative to an arbitrary, but fixed, point (typically the
    /// start of the video stream). It must not decrease between frames.
    pub fn new(image: GrayImage, timestamp: Duration) -> Self {
        Self { image, timestamp }
    }

    /// Creates a frame from a color image by converting it to grayscale.
    pub fn from_dynamic(image: &DynamicImage, timestamp: Duration) -> Self {
        Self::new(image.to_luma8(), timestamp)
    }

    #[inline]
    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    #[inline]
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.image.width(), self.image.height())
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("resolution", &self.resolution())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// An eye cropped out of a frame.
///
/// The crop is the bounding rectangle of the eye contour, grown by a margin on every side. Pixels
/// outside of the contour polygon (and outside of the frame) are white.
#[derive(Clone)]
pub struct EyeRegion {
    pixels: GrayImage,
    /// Position of the crop's top left corner in the frame.
    origin: (i32, i32),
    margin: u32,
}

impl EyeRegion {
    /// Isolates the region enclosed by `contour` from `frame`.
    ///
    /// Returns `None` if `contour` has fewer than 3 points, if its bounding rectangle is larger
    /// than `frame`, or if the crop lies entirely outside of `frame`.
    pub fn isolate(frame: &GrayImage, contour: &[(i32, i32)], margin: u32) -> Option<Self> {
        if contour.len() < 3 {
            return None;
        }

        let bounds = Rect::bounding(contour.iter().copied())?;
        if bounds.width() > frame.width() || bounds.height() > frame.height() {
            log::trace!("eye contour {:?} does not fit in the frame", bounds);
            return None;
        }
        let rect = bounds.grow(margin)?;
        let visible = rect.intersection(&Rect::from_top_left(0, 0, frame.width(), frame.height()))?;

        let mut pixels = GrayImage::from_pixel(rect.width(), rect.height(), Luma([MASK_VALUE]));
        for (x, y) in visible.iter_coords() {
            if !polygon_contains(contour, x, y) {
                continue;
            }

            let value = frame.get_pixel(x as u32, y as u32)[0];
            pixels.put_pixel((x - rect.x()) as u32, (y - rect.y()) as u32, Luma([value]));
        }

        log::trace!("isolated eye region {:?} from {:?}", rect, contour);

        Some(Self {
            pixels,
            origin: (rect.x(), rect.y()),
            margin,
        })
    }

    #[inline]
    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    /// Returns the frame position of the crop's top left corner.
    #[inline]
    pub fn origin(&self) -> (i32, i32) {
        self.origin
    }

    #[inline]
    pub fn margin(&self) -> u32 {
        self.margin
    }

    /// Width of the crop, including the margin.
    #[inline]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height of the crop, including the margin.
    #[inline]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Width of the eye contour's bounding box, excluding the margin.
    pub fn inner_width(&self) -> u32 {
        self.width().saturating_sub(2 * self.margin)
    }

    /// Height of the eye contour's bounding box, excluding the margin.
    pub fn inner_height(&self) -> u32 {
        self.height().saturating_sub(2 * self.margin)
    }
}

/// Even-odd test for whether the pixel at `(x, y)` lies inside of `polygon`.
///
/// Pixels exactly on a polygon edge count as inside.
fn polygon_contains(polygon: &[(i32, i32)], x: i32, y: i32) -> bool {
    let (px, py) = (x as f32, y as f32);
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = (polygon[i].0 as f32, polygon[i].1 as f32);
        let (xj, yj) = (polygon[j].0 as f32, polygon[j].1 as f32);

        if on_segment((xi, yi), (xj, yj), (px, py)) {
            return true;
        }

        if (yi > py) != (yj > py) {
            let x_cross = (xj - xi) * (py - yi) / (yj - yi) + xi;
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(a: (f32, f32), b: (f32, f32), p: (f32, f32)) -> bool {
    let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    if cross.abs() > f32::EPSILON {
        return false;
    }
    p.0 >= a.0.min(b.0) && p.0 <= a.0.max(b.0) && p.1 >= a.1.min(b.1) && p.1 <= a.1.max(b.1)
}
