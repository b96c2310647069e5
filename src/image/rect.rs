use std::{cmp, fmt};

use embedded_graphics::prelude::*;
use itertools::Itertools;

/// An axis-aligned rectangle.
///
/// This rectangle type uses (signed) integer coordinates, so it can describe regions that extend
/// past the edges of a frame.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub(crate) rect: embedded_graphics::primitives::Rectangle,
}

impl Rect {
    /// Creates a rectangle extending downwards and right from a point.
    #[inline]
    pub fn from_top_left(top_left_x: i32, top_left_y: i32, width: u32, height: u32) -> Self {
        Self {
            rect: embedded_graphics::primitives::Rectangle {
                top_left: Point {
                    x: top_left_x,
                    y: top_left_y,
                },
                size: Size { width, height },
            },
        }
    }

    /// Computes the (axis-aligned) bounding rectangle that encompasses `points`.
    ///
    /// Both the minimum and maximum coordinates are part of the rectangle.
    ///
    /// Returns `None` if `points` is an empty iterator, or if the rectangle is too large to be
    /// represented.
    pub fn bounding<I: IntoIterator<Item = (i32, i32)>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();

        let (x, y) = iter.next()?;
        let (mut x_min, mut x_max, mut y_min, mut y_max) = (x, x, y, y);

        for (x, y) in iter {
            x_min = cmp::min(x_min, x);
            x_max = cmp::max(x_max, x);
            y_min = cmp::min(y_min, y);
            y_max = cmp::max(y_max, y);
        }

        let width = x_max.checked_sub(x_min)?.checked_add(1)?;
        let height = y_max.checked_sub(y_min)?.checked_add(1)?;
        Some(Self::from_top_left(x_min, y_min, width as u32, height as u32))
    }

    /// Grows each side of this rectangle by `margin` pixels.
    ///
    /// Returns `None` if the result is too large to be represented.
    #[must_use]
    pub fn grow(&self, margin: u32) -> Option<Self> {
        let m = i32::try_from(margin).ok()?;
        let grow = |len: u32| {
            i32::try_from(len)
                .ok()?
                .checked_add(m.checked_mul(2)?)
                .map(|len| len as u32)
        };
        Some(Self::from_top_left(
            self.x().checked_sub(m)?,
            self.y().checked_sub(m)?,
            grow(self.width())?,
            grow(self.height())?,
        ))
    }

    /// Computes the overlap of `self` and `other`.
    ///
    /// Returns `None` if the rectangles do not overlap.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x_min = self.x().max(other.x());
        let y_min = self.y().max(other.y());
        let x_end = (i64::from(self.x()) + i64::from(self.width()))
            .min(i64::from(other.x()) + i64::from(other.width()));
        let y_end = (i64::from(self.y()) + i64::from(self.height()))
            .min(i64::from(other.y()) + i64::from(other.height()));
        if x_end <= i64::from(x_min) || y_end <= i64::from(y_min) {
            return None;
        }
        Some(Self::from_top_left(
            x_min,
            y_min,
            (x_end - i64::from(x_min)) as u32,
            (y_end - i64::from(y_min)) as u32,
        ))
    }

    /// Returns the X coordinate of the left side of the rectangle.
    #[inline]
    pub fn x(&self) -> i32 {
        self.rect.top_left.x
    }

    /// Returns the Y coordinate of the top side of the rectangle.
    #[inline]
    pub fn y(&self) -> i32 {
        self.rect.top_left.y
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.rect.size.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.rect.size.height
    }

    /// Returns an iterator over all X,Y coordinates contained in this rectangle, row by row.
    pub fn iter_coords(&self) -> impl Iterator<Item = (i32, i32)> {
        let xs = self.x()..self.x() + self.width() as i32;
        let ys = self.y()..self.y() + self.height() as i32;
        ys.cartesian_product(xs).map(|(y, x)| (x, y))
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect @ ({},{})/{}x{}",
            self.x(),
            self.y(),
            self.width(),
            self.height()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding() {
        assert_eq!(Rect::bounding(std::iter::empty()), None);
        assert_eq!(
            Rect::bounding([(1, 1)]),
            Some(Rect::from_top_left(1, 1, 1, 1))
        );
        assert_eq!(
            Rect::bounding([(1, 1), (-3, 4), (2, 0)]),
            Some(Rect::from_top_left(-3, 0, 5, 5))
        );
    }

    #[test]
    fn test_bounding_overflow() {
        assert_eq!(Rect::bounding([(i32::MIN, 0), (i32::MAX, 0)]), None);
        assert_eq!(Rect::bounding([(0, i32::MIN), (0, -1)]), None);
        assert_eq!(Rect::bounding([(i32::MIN, 0)]).unwrap().grow(1), None);
        assert_eq!(Rect::from_top_left(0, 0, 1, 1).grow(u32::MAX), None);
    }

    #[test]
    fn test_intersection() {
        let a = Rect::from_top_left(-5, -5, 10, 10);
        let b = Rect::from_top_left(0, 0, 20, 20);
        assert_eq!(a.intersection(&b), Some(Rect::from_top_left(0, 0, 5, 5)));
        assert_eq!(b.intersection(&a), a.intersection(&b));
        assert_eq!(b.intersection(&b), Some(b));

        let touching = Rect::from_top_left(20, 0, 5, 5);
        assert_eq!(b.intersection(&touching), None);
        let far = Rect::from_top_left(i32::MAX - 3, 0, 3, 3);
        assert_eq!(b.intersection(&far), None);
    }

    #[test]
    fn test_grow_and_iter() {
        let rect = Rect::from_top_left(0, 0, 1, 1).grow(1).unwrap();
        assert_eq!(rect, Rect::from_top_left(-1, -1, 3, 3));
        let coords = rect.iter_coords().collect::<Vec<_>>();
        assert_eq!(coords.len(), 9);
        assert_eq!(coords[0], (-1, -1));
        assert_eq!(coords[1], (0, -1));
        assert_eq!(coords[8], (1, 1));
    }
}
