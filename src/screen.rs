//! Display geometry and screen-space points.

use std::fmt;

use anyhow::ensure;
use serde::Deserialize;

use crate::resolution::Resolution;

/// A pixel position on the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

impl ScreenPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`, in pixels.
    pub fn distance(&self, other: ScreenPoint) -> f32 {
        let dx = (other.x - self.x) as f32;
        let dy = (other.y - self.y) as f32;
        dx.hypot(dy)
    }
}

impl fmt::Display for ScreenPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for ScreenPoint {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Geometry of the display the user looks at.
///
/// The origin is the position of the display's top left corner in desktop coordinates, which is
/// non-zero on multi-monitor setups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Screen {
    origin: ScreenPoint,
    resolution: Resolution,
}

impl Screen {
    /// Creates a screen description.
    ///
    /// Returns an error if the resolution is empty.
    pub fn new(origin: ScreenPoint, resolution: Resolution) -> anyhow::Result<Self> {
        ensure!(
            !resolution.is_empty(),
            "invalid display geometry: resolution {resolution} has no pixels"
        );
        Ok(Self { origin, resolution })
    }

    /// Creates a screen at the desktop origin.
    pub fn at_origin(resolution: Resolution) -> anyhow::Result<Self> {
        Self::new(ScreenPoint::new(0, 0), resolution)
    }

    #[inline]
    pub fn origin(&self) -> ScreenPoint {
        self.origin
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.resolution.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.resolution.height()
    }

    /// Returns whether a screen-local point lies on the screen.
    pub fn contains(&self, point: ScreenPoint) -> bool {
        self.resolution.contains(point.x, point.y)
    }

    /// Rounds a screen-local position to whole pixels and clamps it onto the screen.
    pub fn clamp(&self, x: f32, y: f32) -> ScreenPoint {
        let max_x = self.width() as f32 - 1.0;
        let max_y = self.height() as f32 - 1.0;
        ScreenPoint::new(
            x.round().clamp(0.0, max_x) as i32,
            y.round().clamp(0.0, max_y) as i32,
        )
    }

    /// Converts a screen-local point to desktop coordinates.
    pub fn to_desktop(&self, point: ScreenPoint) -> ScreenPoint {
        ScreenPoint::new(point.x + self.origin.x, point.y + self.origin.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_screen_rejected() {
        assert!(Screen::at_origin(Resolution::new(0, 1080)).is_err());
        assert!(Screen::at_origin(Resolution::new(1920, 0)).is_err());
        assert!(Screen::at_origin(Resolution::RES_1080P).is_ok());
    }

    #[test]
    fn test_clamp_and_translate() {
        let screen = Screen::new(ScreenPoint::new(1920, 0), Resolution::new(800, 600)).unwrap();
        assert_eq!(screen.clamp(-20.0, 10.4), ScreenPoint::new(0, 10));
        assert_eq!(screen.clamp(900.0, 599.6), ScreenPoint::new(799, 599));
        assert_eq!(
            screen.to_desktop(ScreenPoint::new(10, 20)),
            ScreenPoint::new(1930, 20)
        );
    }

    #[test]
    fn test_distance() {
        let d = ScreenPoint::new(0, 0).distance(ScreenPoint::new(3, 4));
        assert_eq!(d, 5.0);
    }
}
