//! Gaze ratios of both eyes and their classification into gaze directions.

use anyhow::ensure;
use serde::Deserialize;

use crate::{
    eye::{Eye, Pupil},
    landmark::EyeSide,
};

/// Normalized pupil position inside the eye, on both axes.
///
/// Both components are always in `[0.0, 1.0]`; `0.5` is a centered gaze. A ratio that cannot be
/// computed is represented by the absence of the whole [`GazeRatio`], never of one component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeRatio {
    horizontal: f32,
    vertical: f32,
}

impl GazeRatio {
    /// The ratio of a perfectly centered gaze.
    pub const CENTER: Self = Self {
        horizontal: 0.5,
        vertical: 0.5,
    };

    /// Creates a gaze ratio, clamping both components to `[0.0, 1.0]`.
    ///
    /// Returns `None` if either component is NaN or infinite.
    pub fn new(horizontal: f32, vertical: f32) -> Option<Self> {
        if !horizontal.is_finite() || !vertical.is_finite() {
            return None;
        }
        Some(Self {
            horizontal: horizontal.clamp(0.0, 1.0),
            vertical: vertical.clamp(0.0, 1.0),
        })
    }

    /// Horizontal ratio: 0.0 is the extreme right, 1.0 the extreme left.
    #[inline]
    pub fn horizontal(&self) -> f32 {
        self.horizontal
    }

    /// Vertical ratio: 0.0 is the extreme top, 1.0 the extreme bottom.
    #[inline]
    pub fn vertical(&self) -> f32 {
        self.vertical
    }

    /// Component-wise mean of two ratios.
    pub fn mean(&self, other: GazeRatio) -> GazeRatio {
        Self {
            horizontal: (self.horizontal + other.horizontal) / 2.0,
            vertical: (self.vertical + other.vertical) / 2.0,
        }
    }
}

/// One of the three bands a ratio axis is divided into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Low,
    Middle,
    High,
}

/// Band boundaries for classifying gaze ratios.
///
/// `[0.0, low]` is [`Band::Low`], `(low, high)` is [`Band::Middle`] and `[high, 1.0]` is
/// [`Band::High`], so every ratio falls into exactly one band.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Bands {
    pub low: f32,
    pub high: f32,
}

impl Default for Bands {
    fn default() -> Self {
        Self {
            low: 0.35,
            high: 0.65,
        }
    }
}

impl Bands {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            0.0 < self.low && self.low < self.high && self.high < 1.0,
            "invalid gaze bands: need 0 < low < high < 1, got low={} high={}",
            self.low,
            self.high
        );
        Ok(())
    }

    pub fn classify(&self, ratio: f32) -> Band {
        if ratio <= self.low {
            Band::Low
        } else if ratio >= self.high {
            Band::High
        } else {
            Band::Middle
        }
    }

    pub fn direction(&self, ratio: GazeRatio) -> Direction {
        Direction {
            horizontal: match self.classify(ratio.horizontal()) {
                Band::Low => Horizontal::Right,
                Band::Middle => Horizontal::Center,
                Band::High => Horizontal::Left,
            },
            vertical: match self.classify(ratio.vertical()) {
                Band::Low => Vertical::Up,
                Band::Middle => Vertical::Level,
                Band::High => Vertical::Down,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Horizontal {
    Right,
    Center,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vertical {
    Up,
    Level,
    Down,
}

/// Classified gaze direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Direction {
    pub horizontal: Horizontal,
    pub vertical: Vertical,
}

/// Pupil detection result for one eye.
#[derive(Clone)]
pub struct EyeReading {
    eye: Eye,
    pupil: Option<Pupil>,
    ratio: Option<GazeRatio>,
}

impl EyeReading {
    /// Locates the pupil in `eye` using the binarization `threshold`.
    pub fn new(eye: Eye, threshold: u8) -> Self {
        let pupil = eye.locate_pupil(threshold);
        let ratio = pupil.as_ref().and_then(|p| eye.gaze_ratio(p));
        Self { eye, pupil, ratio }
    }

    #[inline]
    pub fn eye(&self) -> &Eye {
        &self.eye
    }

    #[inline]
    pub fn pupil(&self) -> Option<&Pupil> {
        self.pupil.as_ref()
    }

    #[inline]
    pub fn ratio(&self) -> Option<GazeRatio> {
        self.ratio
    }

    /// Pupil position in frame coordinates.
    pub fn pupil_coords(&self) -> Option<(i32, i32)> {
        self.pupil.as_ref().map(|p| self.eye.pupil_frame_coords(p))
    }
}

/// Everything derived from both eyes in a single frame.
#[derive(Clone)]
pub struct GazeReading {
    left: Option<EyeReading>,
    right: Option<EyeReading>,
    bands: Bands,
}

impl GazeReading {
    pub fn new(left: Option<EyeReading>, right: Option<EyeReading>, bands: Bands) -> Self {
        Self { left, right, bands }
    }

    pub fn eye(&self, side: EyeSide) -> Option<&EyeReading> {
        match side {
            EyeSide::Left => self.left.as_ref(),
            EyeSide::Right => self.right.as_ref(),
        }
    }

    /// Returns whether the pupils of both eyes were located.
    pub fn pupils_located(&self) -> bool {
        self.pupil_left_coords().is_some() && self.pupil_right_coords().is_some()
    }

    pub fn pupil_left_coords(&self) -> Option<(i32, i32)> {
        self.left.as_ref()?.pupil_coords()
    }

    pub fn pupil_right_coords(&self) -> Option<(i32, i32)> {
        self.right.as_ref()?.pupil_coords()
    }

    /// Combined gaze ratio: the mean of both eyes, or whichever eye has one.
    pub fn ratio(&self) -> Option<GazeRatio> {
        let left = self.left.as_ref().and_then(EyeReading::ratio);
        let right = self.right.as_ref().and_then(EyeReading::ratio);
        match (left, right) {
            (Some(l), Some(r)) => Some(l.mean(r)),
            (l, r) => l.or(r),
        }
    }

    pub fn horizontal_ratio(&self) -> Option<f32> {
        self.ratio().map(|r| r.horizontal())
    }

    pub fn vertical_ratio(&self) -> Option<f32> {
        self.ratio().map(|r| r.vertical())
    }

    /// Mean eye openness of both eyes, or whichever eye has one.
    pub fn openness(&self) -> Option<f32> {
        let left = self.left.as_ref().and_then(|r| r.eye().openness());
        let right = self.right.as_ref().and_then(|r| r.eye().openness());
        match (left, right) {
            (Some(l), Some(r)) => Some((l + r) / 2.0),
            (l, r) => l.or(r),
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        self.ratio().map(|r| self.bands.direction(r))
    }

    /// Returns `true` if the user is looking to the right.
    pub fn is_right(&self) -> bool {
        self.horizontal() == Some(Horizontal::Right)
    }

    /// Returns `true` if the user is looking to the left.
    pub fn is_left(&self) -> bool {
        self.horizontal() == Some(Horizontal::Left)
    }

    pub fn is_center(&self) -> bool {
        self.horizontal() == Some(Horizontal::Center)
    }

    pub fn is_up(&self) -> bool {
        self.vertical() == Some(Vertical::Up)
    }

    pub fn is_down(&self) -> bool {
        self.vertical() == Some(Vertical::Down)
    }

    pub fn is_level(&self) -> bool {
        self.vertical() == Some(Vertical::Level)
    }

    fn horizontal(&self) -> Option<Horizontal> {
        self.direction().map(|d| d.horizontal)
    }

    fn vertical(&self) -> Option<Vertical> {
        self.direction().map(|d| d.vertical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_clamped() {
        let r = GazeRatio::new(-0.2, 1.3).unwrap();
        assert_eq!(r.horizontal(), 0.0);
        assert_eq!(r.vertical(), 1.0);
        assert!(GazeRatio::new(f32::NAN, 0.5).is_none());
        assert!(GazeRatio::new(0.5, f32::INFINITY).is_none());
    }

    #[test]
    fn test_bands_partition() {
        let bands = Bands::default();
        assert_eq!(bands.classify(0.0), Band::Low);
        assert_eq!(bands.classify(0.35), Band::Low);
        assert_eq!(bands.classify(0.3501), Band::Middle);
        assert_eq!(bands.classify(0.5), Band::Middle);
        assert_eq!(bands.classify(0.6499), Band::Middle);
        assert_eq!(bands.classify(0.65), Band::High);
        assert_eq!(bands.classify(1.0), Band::High);

        // every ratio lands in exactly one band, and bands are ordered
        let mut last = Band::Low;
        for i in 0..=1000 {
            let band = bands.classify(i as f32 / 1000.0);
            let rank = |b| match b {
                Band::Low => 0,
                Band::Middle => 1,
                Band::High => 2,
            };
            assert!(rank(band) >= rank(last));
            last = band;
        }
    }

    #[test]
    fn test_direction() {
        let bands = Bands::default();
        let dir = bands.direction(GazeRatio::new(0.2, 0.9).unwrap());
        assert_eq!(dir.horizontal, Horizontal::Right);
        assert_eq!(dir.vertical, Vertical::Down);
        let dir = bands.direction(GazeRatio::CENTER);
        assert_eq!(dir.horizontal, Horizontal::Center);
        assert_eq!(dir.vertical, Vertical::Level);
    }

    #[test]
    fn test_invalid_bands() {
        assert!(Bands { low: 0.6, high: 0.4 }.validate().is_err());
        assert!(Bands { low: 0.0, high: 0.4 }.validate().is_err());
        assert!(Bands::default().validate().is_ok());
    }

    #[test]
    fn test_empty_reading() {
        let reading = GazeReading::new(None, None, Bands::default());
        assert!(!reading.pupils_located());
        assert_eq!(reading.ratio(), None);
        assert!(!reading.is_left() && !reading.is_right() && !reading.is_center());
    }
}
