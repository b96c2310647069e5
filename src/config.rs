//! Runtime configuration.
//!
//! Every section and field has a default, so a configuration file only needs to mention the
//! values that differ from them:
//!
//! ```json
//! {
//!     "gaze_calibration": { "targets": { "kind": "grid", "rows": 2, "cols": 3, "inset": 40 } },
//!     "stabilization": { "enabled": true },
//!     "test_log": { "prefix": "subject01" }
//! }
//! ```

use std::{fs, path::Path};

use anyhow::{ensure, Context};
use serde::Deserialize;

use crate::{
    blink::BlinkConfig,
    calibration::{GazeCalibrationConfig, IrisConfig, TestErrorLogConfig},
    eye::EyeConfig,
    filter::StabilizationConfig,
    gaze::Bands,
    screen::Screen,
};

/// Whether completed calibrations may be started over.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecalibrationConfig {
    pub allow: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub iris: IrisConfig,
    pub eye: EyeConfig,
    pub blink: BlinkConfig,
    pub bands: Bands,
    pub gaze_calibration: GazeCalibrationConfig,
    pub stabilization: StabilizationConfig,
    pub recalibration: RecalibrationConfig,
    pub test_log: TestErrorLogConfig,
}

impl Config {
    /// Loads a configuration from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("invalid config file '{}'", path.display()))
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks that the configuration can be used on `screen`.
    pub fn validate(&self, screen: &Screen) -> anyhow::Result<()> {
        let iris = &self.iris;
        ensure!(iris.frames > 0, "`iris.frames` must be positive");
        ensure!(
            iris.target_iris_fraction > 0.0 && iris.target_iris_fraction < 1.0,
            "`iris.target_iris_fraction` must be between 0 and 1, got {}",
            iris.target_iris_fraction
        );
        ensure!(
            iris.min_threshold <= iris.max_threshold,
            "empty iris threshold range {}..={}",
            iris.min_threshold,
            iris.max_threshold
        );
        ensure!(iris.threshold_step > 0, "`iris.threshold_step` must be positive");

        ensure!(
            self.eye.bilateral.sigma_color > 0.0 && self.eye.bilateral.sigma_space > 0.0,
            "bilateral filter sigmas must be positive"
        );

        ensure!(
            self.blink.openness_threshold > 0.0,
            "`blink.openness_threshold` must be positive"
        );
        ensure!(self.blink.min_frames > 0, "`blink.min_frames` must be positive");

        self.bands.validate()?;

        self.gaze_calibration
            .validate(screen.resolution())
            .context("invalid gaze calibration config")?;

        let stab = &self.stabilization;
        ensure!(
            stab.merge_distance > 0.0,
            "`stabilization.merge_distance` must be positive"
        );
        ensure!(
            stab.min_members > 0 && stab.max_members > 0 && stab.max_clusters > 0,
            "stabilization cluster limits must be positive"
        );

        Ok(())
    }
}
