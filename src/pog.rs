//! Point-of-gaze estimation.
//!
//! [`PointOfGaze`] drives the whole pipeline frame by frame: it runs the landmark detector,
//! extracts both eyes, feeds whichever calibration phase is active and, once calibrated, maps the
//! gaze ratio to the screen.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::ensure;
use image::RgbImage;

use crate::{
    blink::BlinkDetector,
    calibration::{GazeCalibration, IrisCalibration, Prompt, TestErrorLog},
    config::Config,
    eye::Eye,
    filter::{Epog, Filter, StabilizationFilter},
    gaze::{EyeReading, GazeRatio, GazeReading},
    image::{draw, Frame},
    landmark::{EyeSide, LandmarkDetector, Landmarks},
    screen::{Screen, ScreenPoint},
    timer::{FpsCounter, Timer},
};

/// The phase a [`PointOfGaze`] is in. Phases are passed through in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    IrisCalibration,
    GazeCalibration,
    /// Accuracy test of the fitted gaze calibration.
    Testing,
    Tracking,
}

/// Result of processing a single frame.
#[derive(Clone)]
pub struct Analysis {
    /// The phase the frame was processed in.
    pub phase: Phase,
    /// Eye and pupil detection results. `None` if no face was found.
    pub reading: Option<GazeReading>,
    pub blinking: bool,
    /// What the calibration display should show next, if a calibration display is needed.
    pub prompt: Option<Prompt>,
    /// The estimated point of gaze in desktop coordinates. Only computed while tracking.
    pub point: Option<ScreenPoint>,
}

impl Analysis {
    /// The combined gaze ratio of both eyes.
    pub fn ratio(&self) -> Option<GazeRatio> {
        self.reading.as_ref()?.ratio()
    }

    /// Returns a color copy of `frame` with the located pupils marked.
    pub fn annotated_frame(&self, frame: &Frame) -> RgbImage {
        draw::annotate_pupils(frame.image(), self.reading.as_ref())
    }
}

/// Cooperative cancellation of [`PointOfGaze::run`].
///
/// Clones share the same flag, so one can be handed to another thread (eg. a key handler).
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Estimates where on the screen the user is looking.
pub struct PointOfGaze<D> {
    detector: D,
    config: Config,
    screen: Screen,
    iris: IrisCalibration,
    calibration: GazeCalibration,
    stabilizer: StabilizationFilter,
    blink: BlinkDetector,
}

impl<D: LandmarkDetector> PointOfGaze<D> {
    /// Creates an estimator for `screen`, using `detector` to find facial landmarks.
    ///
    /// Fails if `config` is invalid for `screen`, or if the configured test error log cannot be
    /// created.
    pub fn new(detector: D, config: Config, screen: Screen) -> anyhow::Result<Self> {
        config.validate(&screen)?;

        let mut calibration =
            GazeCalibration::new(config.gaze_calibration.clone(), screen.resolution())?;
        calibration.set_log(TestErrorLog::from_config(
            &config.test_log,
            config.stabilization.enabled,
        )?);

        log::info!(
            "tracking gaze on {} screen at {}, stabilization {}",
            screen.resolution(),
            screen.origin(),
            if config.stabilization.enabled { "on" } else { "off" },
        );

        Ok(Self {
            detector,
            iris: IrisCalibration::new(config.iris.clone()),
            stabilizer: StabilizationFilter::new(&config.stabilization, &screen),
            blink: BlinkDetector::new(&config.blink),
            calibration,
            screen,
            config,
        })
    }

    pub fn phase(&self) -> Phase {
        if !self.iris.is_complete() {
            Phase::IrisCalibration
        } else if !self.calibration.is_fitted() {
            Phase::GazeCalibration
        } else if !self.calibration.is_done() {
            Phase::Testing
        } else {
            Phase::Tracking
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn iris_calibration(&self) -> &IrisCalibration {
        &self.iris
    }

    pub fn gaze_calibration(&self) -> &GazeCalibration {
        &self.calibration
    }

    pub fn stabilizer(&self) -> &StabilizationFilter {
        &self.stabilizer
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    pub fn is_blinking(&self) -> bool {
        self.blink.is_blinking()
    }

    /// Returns what the calibration display should show, or `None` if no display is needed.
    pub fn prompt(&self) -> Option<Prompt> {
        if self.iris.is_complete() {
            self.calibration.prompt()
        } else {
            None
        }
    }

    /// Processes a single frame.
    ///
    /// A frame without a detectable face leaves all state untouched.
    pub fn process(&mut self, frame: &Frame) -> Analysis {
        let phase = self.phase();
        let Some(landmarks) = self.detector.detect(frame) else {
            log::trace!("no face at {:?}", frame.timestamp());
            return Analysis {
                phase,
                reading: None,
                blinking: self.blink.is_blinking(),
                prompt: self.prompt(),
                point: None,
            };
        };

        let reading = self.read_eyes(frame, &landmarks, phase);
        let blinking = match reading.openness() {
            Some(openness) => self.blink.push(openness),
            None => self.blink.is_blinking(),
        };
        let ratio = reading.ratio();

        let point = match phase {
            Phase::IrisCalibration => {
                if self.iris.is_complete() {
                    log::info!("starting gaze calibration");
                }
                None
            }
            Phase::GazeCalibration => {
                self.calibration.collect(ratio);
                None
            }
            Phase::Testing => {
                let estimate = self.estimate(ratio, frame);
                self.calibration.test(estimate);
                if self.calibration.is_done() {
                    log::info!("calibration done, tracking");
                    self.stabilizer.reset();
                }
                None
            }
            Phase::Tracking => self
                .estimate(ratio, frame)
                .map(|p| self.screen.to_desktop(p)),
        };

        Analysis {
            phase,
            reading: Some(reading),
            blinking,
            prompt: self.prompt(),
            point,
        }
    }

    /// Processes a frame and returns only the estimated point of gaze.
    pub fn point_of_gaze(&mut self, frame: &Frame) -> Option<ScreenPoint> {
        self.process(frame).point
    }

    /// Processes frames until `frames` is exhausted or `cancel` is triggered, passing every
    /// frame's result to `on_frame`.
    ///
    /// Returns the number of processed frames.
    pub fn run<I, F>(&mut self, frames: I, cancel: &Cancellation, mut on_frame: F) -> usize
    where
        I: IntoIterator<Item = Frame>,
        F: FnMut(&Frame, &Analysis),
    {
        let mut fps = FpsCounter::new("epog");
        let mut t_process = Timer::new("process");
        let mut processed = 0;
        for frame in frames {
            if cancel.is_cancelled() {
                log::debug!("cancelled after {processed} frames");
                break;
            }

            let analysis = t_process.time(|| self.process(&frame));
            on_frame(&frame, &analysis);
            processed += 1;
            fps.tick_with([&t_process]);
        }
        processed
    }

    /// Starts both calibrations over.
    ///
    /// Fails unless `recalibration.allow` is set in the configuration.
    pub fn recalibrate(&mut self) -> anyhow::Result<()> {
        ensure!(
            self.config.recalibration.allow,
            "recalibration is disabled (set `recalibration.allow` to enable it)"
        );
        log::info!("restarting calibration");
        self.iris.reset();
        self.calibration.reset();
        self.stabilizer.reset();
        self.blink.reset();
        Ok(())
    }

    fn read_eyes(&mut self, frame: &Frame, landmarks: &Landmarks, phase: Phase) -> GazeReading {
        let mut readings = [None, None];
        for (slot, side) in readings.iter_mut().zip(EyeSide::BOTH) {
            let Some(eye) = Eye::isolate(frame, landmarks, side, &self.config.eye) else {
                continue;
            };
            if phase == Phase::IrisCalibration {
                self.iris.evaluate(&eye);
            }
            *slot = Some(EyeReading::new(eye, self.iris.threshold(side)));
        }

        let [left, right] = readings;
        GazeReading::new(left, right, self.config.bands)
    }

    /// Maps `ratio` to a screen-local point and passes it through the stabilization filter.
    fn estimate(&mut self, ratio: Option<GazeRatio>, frame: &Frame) -> Option<ScreenPoint> {
        let (x, y) = self.calibration.model()?.map(ratio?);
        let raw = self.screen.clamp(x, y);
        if !self.stabilizer.is_enabled() {
            log::debug!("EPOG raw: {raw}");
            return Some(raw);
        }

        let epog = Epog::new(raw.x as f32, raw.y as f32, frame.timestamp());
        match self.stabilizer.push(epog) {
            Some(stable) => {
                let stable = self.screen.clamp(stable.x, stable.y);
                log::debug!("EPOG: raw {raw} stab {stable}");
                Some(stable)
            }
            None => {
                log::debug!("EPOG: raw {raw} suppressed");
                None
            }
        }
    }
}
