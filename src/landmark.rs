//! Facial landmarks and the detector seam.
//!
//! Landmarks follow the [68 facial landmark points] layout popularized by the Multi-PIE dataset
//! and used by dlib's shape predictor. Only the two eye contours (6 points each) are consumed by
//! this crate.
//!
//! [68 facial landmark points]: https://ibug.doc.ic.ac.uk/media/uploads/images/annotpics/figure_68_markup.jpg

use std::ops::RangeInclusive;

use anyhow::ensure;

use crate::image::Frame;

type Position = [f32; 2];

/// The set of facial landmarks of one face, in frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    positions: Box<[Position]>,
}

impl Landmarks {
    pub const NUM_LANDMARKS: usize = 68;

    /// Creates a [`Landmarks`] collection with all landmarks at `(0.0, 0.0)`.
    pub fn new() -> Self {
        Self {
            positions: vec![[0.0, 0.0]; Self::NUM_LANDMARKS].into_boxed_slice(),
        }
    }

    /// Creates a [`Landmarks`] collection from detector output.
    ///
    /// Returns an error if `positions` does not contain exactly [`Self::NUM_LANDMARKS`] entries.
    pub fn from_positions<I: IntoIterator<Item = Position>>(positions: I) -> anyhow::Result<Self> {
        let positions: Box<[Position]> = positions.into_iter().collect();
        ensure!(
            positions.len() == Self::NUM_LANDMARKS,
            "expected {} landmarks, got {}",
            Self::NUM_LANDMARKS,
            positions.len()
        );
        Ok(Self { positions })
    }

    pub fn get(&self, index: usize) -> Landmark {
        Landmark::new(self.positions[index])
    }

    pub fn set(&mut self, index: usize, landmark: Landmark) {
        self.positions[index] = landmark.pos;
    }

    /// Returns the 6 contour landmarks of one eye.
    ///
    /// The order is: outer corner, two upper lid points, inner corner, two lower lid points
    /// (for the left eye; mirrored for the right eye).
    pub fn eye(&self, side: EyeSide) -> [Landmark; 6] {
        let start = *side.landmark_indices().start();
        std::array::from_fn(|i| self.get(start + i))
    }
}

impl Default for Landmarks {
    fn default() -> Self {
        Self::new()
    }
}

/// A landmark in 2D frame space.
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy)]
pub struct Landmark {
    pos: Position,
}

impl Landmark {
    pub fn new(position: Position) -> Self {
        Self { pos: position }
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos[0]
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos[1]
    }

    /// Returns the point halfway between `self` and `other`.
    pub fn midpoint(&self, other: Landmark) -> Landmark {
        Landmark::new([(self.x() + other.x()) / 2.0, (self.y() + other.y()) / 2.0])
    }

    pub fn distance(&self, other: Landmark) -> f32 {
        (self.x() - other.x()).hypot(self.y() - other.y())
    }
}

/// Which eye to analyze.
///
/// Sides are named like the 68-point layout names them, which is from the point of view of the
/// image, not the person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EyeSide {
    Left,
    Right,
}

impl EyeSide {
    pub const BOTH: [EyeSide; 2] = [EyeSide::Left, EyeSide::Right];

    /// Indices of this eye's contour in the 68-point layout.
    pub fn landmark_indices(self) -> RangeInclusive<usize> {
        match self {
            EyeSide::Left => 36..=41,
            EyeSide::Right => 42..=47,
        }
    }
}

/// A facial landmark detector.
///
/// This is implemented by the host application (for example by wrapping dlib's shape predictor
/// or a landmark neural network). Returning `None` means no face was found in the frame.
pub trait LandmarkDetector {
    fn detect(&mut self, frame: &Frame) -> Option<Landmarks>;
}

impl<F: FnMut(&Frame) -> Option<Landmarks>> LandmarkDetector for F {
    fn detect(&mut self, frame: &Frame) -> Option<Landmarks> {
        self(frame)
    }
}
