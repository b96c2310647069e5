//! Gaze calibration: fitting gaze ratios to screen points and testing the fit.
//!
//! The user is shown a fixed sequence of targets. For each target, the first few frames are
//! discarded while the gaze settles, then gaze ratios are recorded. Once every target has been
//! handled, a [`CalibrationModel`] is fitted and the same targets are shown again to measure the
//! model's accuracy.

use anyhow::{bail, ensure};
use serde::Deserialize;

use super::{
    densest_value,
    model::{CalibrationModel, MappingKind},
    testlog::{TestErrorLog, TestErrorRecord},
    Prompt,
};
use crate::{gaze::GazeRatio, image::draw::TARGET_RADIUS, resolution::Resolution, screen::ScreenPoint};

/// Placement of the calibration targets.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetLayout {
    /// A regular grid spanning the screen, `inset` pixels away from its edges. Targets are
    /// visited row by row.
    Grid { rows: u32, cols: u32, inset: u32 },
    /// Explicit screen-local points, visited in order.
    Points { points: Vec<ScreenPoint> },
}

impl Default for TargetLayout {
    fn default() -> Self {
        Self::Grid {
            rows: 3,
            cols: 3,
            inset: TARGET_RADIUS,
        }
    }
}

impl TargetLayout {
    /// Computes the target points on a screen of the given resolution.
    pub fn points(&self, screen: Resolution) -> anyhow::Result<Vec<ScreenPoint>> {
        match self {
            TargetLayout::Grid { rows, cols, inset } => {
                ensure!(*rows > 0 && *cols > 0, "empty calibration grid ({rows}x{cols})");
                ensure!(
                    screen.width() > 2 * inset && screen.height() > 2 * inset,
                    "calibration grid inset {inset} does not fit on a {screen} screen"
                );

                let coord = |i: u32, n: u32, len: u32| -> i32 {
                    if n == 1 {
                        (len / 2) as i32
                    } else {
                        let span = len - 1 - 2 * inset;
                        (inset + i * span / (n - 1)) as i32
                    }
                };
                let mut points = Vec::with_capacity((rows * cols) as usize);
                for row in 0..*rows {
                    for col in 0..*cols {
                        points.push(ScreenPoint::new(
                            coord(col, *cols, screen.width()),
                            coord(row, *rows, screen.height()),
                        ));
                    }
                }
                Ok(points)
            }
            TargetLayout::Points { points } => {
                ensure!(!points.is_empty(), "no calibration targets given");
                for p in points {
                    if !screen.contains(p.x, p.y) {
                        bail!("calibration target {p} is outside of the {screen} screen");
                    }
                }
                Ok(points.clone())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GazeCalibrationConfig {
    pub targets: TargetLayout,
    /// Frames the instructions are shown for before the first target.
    pub instruction_frames: u32,
    /// Frames per target that are discarded while the user's gaze settles.
    pub settle_frames: u32,
    /// Length of the window in which samples are recorded, in frames.
    pub record_frames: u32,
    /// Minimum number of samples a target should get.
    pub min_samples: usize,
    /// Frames per target during the accuracy test, after settling.
    pub test_frames: u32,
    pub mapping: MappingKind,
}

impl Default for GazeCalibrationConfig {
    fn default() -> Self {
        Self {
            targets: TargetLayout::default(),
            instruction_frames: 20,
            settle_frames: 5,
            record_frames: 10,
            min_samples: 5,
            test_frames: 20,
            mapping: MappingKind::default(),
        }
    }
}

impl GazeCalibrationConfig {
    /// Checks the configuration against the screen and returns the calibration targets.
    pub fn validate(&self, screen: Resolution) -> anyhow::Result<Vec<ScreenPoint>> {
        ensure!(self.record_frames > 0, "`record_frames` must be positive");
        ensure!(self.test_frames > 0, "`test_frames` must be positive");
        ensure!(self.min_samples > 0, "`min_samples` must be positive");

        let targets = self.targets.points(screen)?;
        let needed = self.mapping.num_terms();
        ensure!(
            targets.len() >= needed,
            "{:?} mapping needs at least {} calibration targets, {} configured",
            self.mapping,
            needed,
            targets.len()
        );

        let positions = targets
            .iter()
            .map(|p| {
                (
                    f64::from(p.x) / f64::from(screen.width()),
                    f64::from(p.y) / f64::from(screen.height()),
                )
            })
            .collect::<Vec<_>>();
        ensure!(
            self.mapping.is_determined_by(&positions),
            "calibration targets are too regular to fit a {:?} mapping (eg. all on one line)",
            self.mapping
        );
        Ok(targets)
    }
}

/// How recording went for one calibration target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOutcome {
    /// The target got at least the minimum number of samples.
    Accepted(usize),
    /// Recording was extended, but stopped producing samples before reaching the minimum. The
    /// samples recorded so far are used.
    Relaxed(usize),
    /// No sample was recorded. The target does not take part in the fit.
    Skipped,
}

impl TargetOutcome {
    fn samples(&self) -> usize {
        match self {
            TargetOutcome::Accepted(n) | TargetOutcome::Relaxed(n) => *n,
            TargetOutcome::Skipped => 0,
        }
    }
}

/// Position in the target sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Cursor {
    target: usize,
    /// Frames spent on the current target.
    frame: u32,
}

impl Cursor {
    fn advance(&mut self) {
        self.target += 1;
        self.frame = 0;
    }
}

/// Progress of sample collection.
#[derive(Debug, Clone)]
pub struct Collection {
    instruction_frames_left: u32,
    cursor: Cursor,
    /// Samples the current target had at the start of its current record window.
    window_start: usize,
    samples: Vec<Vec<GazeRatio>>,
}

impl Collection {
    fn new(config: &GazeCalibrationConfig, num_targets: usize) -> Self {
        Self {
            instruction_frames_left: config.instruction_frames,
            cursor: Cursor::default(),
            window_start: 0,
            samples: vec![Vec::new(); num_targets],
        }
    }

    /// Samples recorded per target so far.
    pub fn samples(&self) -> &[Vec<GazeRatio>] {
        &self.samples
    }
}

/// Progress of the accuracy test.
#[derive(Debug, Clone)]
pub struct TestRun {
    model: CalibrationModel,
    cursor: Cursor,
    records: Vec<TestErrorRecord>,
}

#[derive(Debug, Clone)]
pub enum GazeCalibrationState {
    Collecting(Collection),
    /// A model was fitted, the test has not started yet.
    Fitted(CalibrationModel),
    Testing(TestRun),
    Done {
        model: CalibrationModel,
        records: Vec<TestErrorRecord>,
    },
}

/// The gaze calibration state machine.
///
/// Collection is driven by [`GazeCalibration::collect`], the accuracy test by
/// [`GazeCalibration::test`]. Both are called once per frame.
pub struct GazeCalibration {
    config: GazeCalibrationConfig,
    targets: Vec<ScreenPoint>,
    outcomes: Vec<TargetOutcome>,
    state: GazeCalibrationState,
    log: Option<TestErrorLog>,
}

impl GazeCalibration {
    /// Creates a calibration for a screen of the given resolution.
    ///
    /// Fails if the configuration is invalid for this screen.
    pub fn new(config: GazeCalibrationConfig, screen: Resolution) -> anyhow::Result<Self> {
        let targets = config.validate(screen)?;
        log::debug!("calibration targets: {targets:?}");
        Ok(Self {
            state: GazeCalibrationState::Collecting(Collection::new(&config, targets.len())),
            outcomes: Vec::with_capacity(targets.len()),
            targets,
            config,
            log: None,
        })
    }

    /// Sets the log that test errors are written to.
    pub fn set_log(&mut self, log: Option<TestErrorLog>) {
        self.log = log;
    }

    pub fn has_log(&self) -> bool {
        self.log.is_some()
    }

    pub fn state(&self) -> &GazeCalibrationState {
        &self.state
    }

    pub fn targets(&self) -> &[ScreenPoint] {
        &self.targets
    }

    /// Outcomes of the targets handled in the current collection.
    pub fn outcomes(&self) -> &[TargetOutcome] {
        &self.outcomes
    }

    /// Returns the fitted model, which exists once the calibration reached the fitted state.
    pub fn model(&self) -> Option<&CalibrationModel> {
        match &self.state {
            GazeCalibrationState::Collecting(_) => None,
            GazeCalibrationState::Fitted(model)
            | GazeCalibrationState::Testing(TestRun { model, .. })
            | GazeCalibrationState::Done { model, .. } => Some(model),
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.model().is_some()
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, GazeCalibrationState::Done { .. })
    }

    /// Test errors recorded so far.
    pub fn records(&self) -> &[TestErrorRecord] {
        match &self.state {
            GazeCalibrationState::Testing(run) => &run.records,
            GazeCalibrationState::Done { records, .. } => records,
            _ => &[],
        }
    }

    /// Mean distance between estimates and targets over all test records.
    pub fn mean_error(&self) -> Option<f32> {
        let records = self.records();
        if records.is_empty() {
            return None;
        }
        Some(records.iter().map(|r| r.distance).sum::<f32>() / records.len() as f32)
    }

    /// What should be displayed for the next frame, or `None` once the calibration is done.
    pub fn prompt(&self) -> Option<Prompt> {
        let settle = self.config.settle_frames;
        let target = |cursor: Cursor| Prompt::Target {
            point: self.targets[cursor.target],
            recording: cursor.frame >= settle,
        };
        match &self.state {
            GazeCalibrationState::Collecting(c) if c.instruction_frames_left > 0 => {
                Some(Prompt::Instructions)
            }
            GazeCalibrationState::Collecting(c) => Some(target(c.cursor)),
            GazeCalibrationState::Fitted(_) => Some(target(Cursor::default())),
            GazeCalibrationState::Testing(run) => Some(target(run.cursor)),
            GazeCalibrationState::Done { .. } => None,
        }
    }

    /// Advances sample collection by one frame.
    ///
    /// `ratio` is the frame's combined gaze ratio; frames without one are counted but not
    /// recorded. Does nothing unless collecting.
    pub fn collect(&mut self, ratio: Option<GazeRatio>) {
        let GazeCalibrationState::Collecting(c) = &mut self.state else {
            return;
        };
        if c.instruction_frames_left > 0 {
            c.instruction_frames_left -= 1;
            return;
        }

        let settle = self.config.settle_frames;
        let index = c.cursor.target;
        c.cursor.frame += 1;
        if c.cursor.frame <= settle {
            return;
        }

        let samples = &mut c.samples[index];
        if let Some(ratio) = ratio {
            samples.push(ratio);
        }
        if (c.cursor.frame - settle) % self.config.record_frames != 0 {
            return;
        }

        let n = samples.len();
        let outcome = if n >= self.config.min_samples {
            TargetOutcome::Accepted(n)
        } else if n == 0 {
            TargetOutcome::Skipped
        } else if n == c.window_start {
            TargetOutcome::Relaxed(n)
        } else {
            log::debug!(
                "target {} has {n} of {} samples, extending recording",
                self.targets[index],
                self.config.min_samples
            );
            c.window_start = n;
            return;
        };

        log::debug!("target {}: {outcome:?}", self.targets[index]);
        self.outcomes.push(outcome);
        c.cursor.advance();
        c.window_start = 0;
        if c.cursor.target == self.targets.len() {
            self.fit();
        }
    }

    fn fit(&mut self) {
        let GazeCalibrationState::Collecting(c) = &self.state else {
            return;
        };

        let points = self
            .targets
            .iter()
            .zip(&c.samples)
            .filter_map(|(target, samples)| {
                let h = samples.iter().map(|r| r.horizontal()).collect::<Vec<_>>();
                let v = samples.iter().map(|r| r.vertical()).collect::<Vec<_>>();
                let ratio = GazeRatio::new(densest_value(&h)?, densest_value(&v)?)?;
                Some((ratio, *target))
            })
            .collect::<Vec<_>>();

        match CalibrationModel::fit(self.config.mapping, &points) {
            Ok(model) => {
                let samples: usize = self.outcomes.iter().map(TargetOutcome::samples).sum();
                log::info!(
                    "gaze calibration fitted from {} targets ({} samples)",
                    points.len(),
                    samples
                );
                self.state = GazeCalibrationState::Fitted(model);
            }
            Err(e) => {
                log::warn!("gaze calibration failed, starting over: {e}");
                self.restart();
            }
        }
    }

    /// Advances the accuracy test by one frame.
    ///
    /// `estimate` is the point the tracker would output for this frame. Does nothing unless a
    /// model was fitted and the test is not yet done.
    pub fn test(&mut self, estimate: Option<ScreenPoint>) {
        if let GazeCalibrationState::Fitted(model) = &self.state {
            log::info!("testing gaze calibration");
            self.state = GazeCalibrationState::Testing(TestRun {
                model: model.clone(),
                cursor: Cursor::default(),
                records: Vec::new(),
            });
        }
        let GazeCalibrationState::Testing(run) = &mut self.state else {
            return;
        };

        let target = self.targets[run.cursor.target];
        run.cursor.frame += 1;
        if run.cursor.frame > self.config.settle_frames {
            if let Some(estimate) = estimate {
                let record = TestErrorRecord::new(target, estimate);
                log::debug!(
                    "target {target}: estimate {estimate}, error {:.1}px",
                    record.distance
                );

                let failed = match &mut self.log {
                    Some(sink) => sink.write(&record).err(),
                    None => None,
                };
                if let Some(e) = failed {
                    log::error!("failed to write test error log, disabling it: {e}");
                    self.log = None;
                }
                run.records.push(record);
            }
        }

        if run.cursor.frame < self.config.settle_frames + self.config.test_frames {
            return;
        }
        run.cursor.advance();
        if run.cursor.target < self.targets.len() {
            return;
        }

        let model = run.model.clone();
        let records = std::mem::take(&mut run.records);
        if let Some(sink) = &mut self.log {
            if let Err(e) = sink.flush() {
                log::error!("failed to flush test error log: {e}");
            }
        }
        self.state = GazeCalibrationState::Done { model, records };
        match self.mean_error() {
            Some(error) => log::info!(
                "gaze calibration test done, mean error {error:.1}px over {} estimates",
                self.records().len()
            ),
            None => log::info!("gaze calibration test done without any estimates"),
        }
    }

    fn restart(&mut self) {
        self.outcomes.clear();
        self.state =
            GazeCalibrationState::Collecting(Collection::new(&self.config, self.targets.len()));
    }

    /// Discards the model and all collected data, starting over with the instructions.
    pub fn reset(&mut self) {
        self.restart();
    }
}
