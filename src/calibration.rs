//! User calibration.
//!
//! Calibration happens in two consecutive phases:
//!
//! - [`IrisCalibration`] picks per-eye binarization thresholds for pupil detection.
//! - [`GazeCalibration`] shows targets on the screen, fits a [`CalibrationModel`] from gaze
//!   ratios to screen coordinates, and then tests it against the same targets.

mod gaze;
mod iris;
mod model;
mod testlog;

pub use gaze::{
    Collection, GazeCalibration, GazeCalibrationConfig, GazeCalibrationState, TargetLayout,
    TargetOutcome, TestRun,
};
pub use iris::{IrisCalibration, IrisCalibrationState, IrisConfig};
pub use model::{CalibrationModel, MappingKind};
pub use testlog::{TestErrorLog, TestErrorLogConfig, TestErrorRecord};

use crate::screen::ScreenPoint;

/// What the calibration display should currently show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Instructions to fixate the upcoming targets.
    Instructions,
    /// A target the user should fixate.
    Target {
        point: ScreenPoint,
        /// Whether samples are being taken. `false` while the user's gaze is still settling.
        recording: bool,
    },
}

/// Returns a best value from noisy measurements of a single underlying value.
///
/// The values are sorted into a histogram with Sturges' bin count, and the center of the densest
/// bin is returned (the lowest one if several are equally dense). Returns `None` for an empty
/// slice.
pub(crate) fn densest_value(values: &[f32]) -> Option<f32> {
    let min = values.iter().copied().reduce(f32::min)?;
    let max = values.iter().copied().reduce(f32::max)?;
    if max - min <= f32::EPSILON {
        return Some(min);
    }

    let bins = (values.len() as f32).log2().ceil() as usize + 1;
    let width = (max - min) / bins as f32;
    let mut hist = vec![0u32; bins];
    for &v in values {
        let bin = (((v - min) / width) as usize).min(bins - 1);
        hist[bin] += 1;
    }

    let mut best = 0;
    for (i, &count) in hist.iter().enumerate() {
        if count > hist[best] {
            best = i;
        }
    }
    Some(min + (best as f32 + 0.5) * width)
}
