//! Eye Point Of Gaze (EPOG) estimation from webcam video.
//!
//! The crate takes 68-point facial landmarks (from an external detector, see
//! [`landmark::LandmarkDetector`]) together with the grayscale video frame they were computed on,
//! and estimates which screen pixel the user is looking at.
//!
//! Processing happens in phases, driven frame by frame by [`pog::PointOfGaze`]:
//!
//! 1. **Iris calibration** finds a per-eye binarization threshold for pupil detection.
//! 2. **Gaze calibration** shows a sequence of targets, records gaze ratios while the user
//!    fixates them, and fits a least-squares mapping from gaze ratio to screen coordinates.
//! 3. **Testing** replays the targets and measures the estimation error.
//! 4. **Tracking** maps every frame's gaze ratio to the screen and (optionally) stabilizes it.
//!
//! # Coordinates
//!
//! Frame coordinates have X pointing right and Y pointing down, with the origin in the top left
//! corner of the frame. Screen coordinates are pixels on the display the calibration targets are
//! shown on; the final estimate is translated by the display's origin (see [`screen::Screen`]).
//!
//! Gaze ratios are in `[0.0, 1.0]`. Horizontally, `0.0` means the pupil sits at the right edge of
//! the eye in the image (user looking to their right), `1.0` at the left edge. Vertically, `0.0`
//! is the top edge.

use log::LevelFilter;

pub mod blink;
pub mod calibration;
pub mod config;
pub mod eye;
pub mod filter;
pub mod gaze;
pub mod image;
pub mod landmark;
pub mod pog;
pub mod resolution;
pub mod screen;
pub mod timer;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and `epog` will log at *debug* level. `RUST_LOG` is applied on top of that.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
