//! Iris calibration: picking per-eye binarization thresholds.
//!
//! For every frame, the threshold that makes the dark area of the processed eye crop cover a
//! typical iris-to-eye fraction is computed for each eye. Once enough frames have been
//! evaluated, the mean of those thresholds is frozen and used for pupil detection from then on.

use serde::Deserialize;

use crate::{eye::Eye, landmark::EyeSide};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IrisConfig {
    /// Number of evaluated frames per eye before the thresholds are frozen.
    pub frames: usize,
    /// Fraction of the eye crop the iris is expected to cover.
    pub target_iris_fraction: f32,
    /// Lowest threshold considered.
    pub min_threshold: u8,
    /// Highest threshold considered.
    pub max_threshold: u8,
    pub threshold_step: u8,
    /// Threshold used before any frame was evaluated.
    pub default_threshold: u8,
    /// Border (in pixels) of the eye crop that is ignored when measuring the iris size.
    pub inset: u32,
}

impl Default for IrisConfig {
    fn default() -> Self {
        Self {
            frames: 20,
            target_iris_fraction: 0.48,
            min_threshold: 0,
            max_threshold: 199,
            threshold_step: 1,
            default_threshold: 50,
            inset: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrisCalibrationState {
    /// Best thresholds of evaluated frames, per eye.
    Collecting { left: Vec<u8>, right: Vec<u8> },
    /// Frozen thresholds.
    Complete { left: u8, right: u8 },
}

pub struct IrisCalibration {
    config: IrisConfig,
    state: IrisCalibrationState,
}

impl IrisCalibration {
    pub fn new(config: IrisConfig) -> Self {
        Self {
            config,
            state: IrisCalibrationState::Collecting {
                left: Vec::new(),
                right: Vec::new(),
            },
        }
    }

    pub fn state(&self) -> &IrisCalibrationState {
        &self.state
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, IrisCalibrationState::Complete { .. })
    }

    /// Evaluates the best threshold for `eye` and records it.
    ///
    /// Returns `true` if this completed the calibration. Does nothing once complete.
    pub fn evaluate(&mut self, eye: &Eye) -> bool {
        let IrisCalibrationState::Collecting { left, right } = &mut self.state else {
            return false;
        };

        let Some(best) = best_threshold(eye, &self.config) else {
            log::trace!("{:?} eye crop too small to evaluate", eye.side());
            return false;
        };
        let samples = match eye.side() {
            EyeSide::Left => &mut *left,
            EyeSide::Right => &mut *right,
        };
        if samples.len() < self.config.frames {
            samples.push(best);
        }

        if left.len() < self.config.frames || right.len() < self.config.frames {
            return false;
        }

        let (left, right) = (mean(left), mean(right));
        log::info!("iris calibration complete: thresholds left={left} right={right}");
        self.state = IrisCalibrationState::Complete { left, right };
        true
    }

    /// Returns the binarization threshold to use for the eye on `side`.
    ///
    /// While collecting, this is the mean of the thresholds found so far, or the configured
    /// default if there are none.
    pub fn threshold(&self, side: EyeSide) -> u8 {
        match (&self.state, side) {
            (IrisCalibrationState::Complete { left, .. }, EyeSide::Left) => *left,
            (IrisCalibrationState::Complete { right, .. }, EyeSide::Right) => *right,
            (IrisCalibrationState::Collecting { left, right }, side) => {
                let samples = match side {
                    EyeSide::Left => left,
                    EyeSide::Right => right,
                };
                if samples.is_empty() {
                    self.config.default_threshold
                } else {
                    mean(samples)
                }
            }
        }
    }

    /// Discards all evaluated frames and frozen thresholds.
    pub fn reset(&mut self) {
        self.state = IrisCalibrationState::Collecting {
            left: Vec::new(),
            right: Vec::new(),
        };
    }
}

fn mean(values: &[u8]) -> u8 {
    let sum: u32 = values.iter().map(|&v| u32::from(v)).sum();
    (sum / values.len().max(1) as u32) as u8
}

/// Finds the threshold whose binarization of the processed eye crop comes closest to the target
/// iris fraction. Ties go to the lowest threshold.
///
/// Binarization marks every pixel `<= threshold` as dark, so the dark fraction for every
/// threshold follows from a single histogram of the inset crop.
fn best_threshold(eye: &Eye, config: &IrisConfig) -> Option<u8> {
    let image = eye.processed();
    let inset = config.inset;
    let width = image.width().checked_sub(2 * inset).filter(|&w| w > 0)?;
    let height = image.height().checked_sub(2 * inset).filter(|&h| h > 0)?;

    let mut hist = [0u32; 256];
    for y in inset..inset + height {
        for x in inset..inset + width {
            hist[usize::from(image.get_pixel(x, y)[0])] += 1;
        }
    }
    let total = (width * height) as f32;

    let mut cumulative = Vec::with_capacity(256);
    let mut sum = 0;
    for count in hist {
        sum += count;
        cumulative.push(sum);
    }

    let step = usize::from(config.threshold_step.max(1));
    let mut best: Option<(u8, f32)> = None;
    for threshold in (config.min_threshold..=config.max_threshold).step_by(step) {
        let fraction = cumulative[usize::from(threshold)] as f32 / total;
        let error = (fraction - config.target_iris_fraction).abs();
        if best.map_or(true, |(_, e)| error < e) {
            best = Some((threshold, error));
        }
    }

    let (threshold, _) = best?;
    log::trace!("{:?} eye: best threshold {threshold}", eye.side());
    Some(threshold)
}
