//! Accuracy test results and their optional log file.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

use crate::screen::ScreenPoint;

/// Error measured for one estimate during the accuracy test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestErrorRecord {
    pub target: ScreenPoint,
    pub estimate: ScreenPoint,
    /// Euclidean distance between target and estimate, in pixels.
    pub distance: f32,
}

impl TestErrorRecord {
    pub fn new(target: ScreenPoint, estimate: ScreenPoint) -> Self {
        Self {
            target,
            estimate,
            distance: target.distance(estimate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TestErrorLogConfig {
    /// File name prefix. No log file is written unless this is set.
    pub prefix: Option<String>,
    /// Directory the log files are created in.
    pub dir: PathBuf,
}

impl Default for TestErrorLogConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            dir: PathBuf::from("test_errors"),
        }
    }
}

/// Append-only sink for [`TestErrorRecord`]s, one distance per line.
pub struct TestErrorLog {
    writer: Box<dyn Write + Send>,
    path: Option<PathBuf>,
}

impl TestErrorLog {
    /// Creates a log file in `config.dir` if `config.prefix` is set.
    ///
    /// The file is named `{prefix}_{stab|raw}_{dd-mm-YYYY_HH.MM.SS}.txt`, where `stab` or `raw`
    /// tells whether the tested estimates were stabilized.
    pub fn from_config(config: &TestErrorLogConfig, stabilized: bool) -> anyhow::Result<Option<Self>> {
        match &config.prefix {
            Some(prefix) => Self::create(&config.dir, prefix, stabilized).map(Some),
            None => Ok(None),
        }
    }

    pub fn create(dir: &Path, prefix: &str, stabilized: bool) -> anyhow::Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create test log directory '{}'", dir.display()))?;

        let mode = if stabilized { "stab" } else { "raw" };
        let time = chrono::Local::now().format("%d-%m-%Y_%H.%M.%S");
        let path = dir.join(format!("{prefix}_{mode}_{time}.txt"));
        let file = File::create(&path)
            .with_context(|| format!("failed to create test log '{}'", path.display()))?;
        log::info!("writing test errors to '{}'", path.display());

        Ok(Self {
            writer: Box::new(BufWriter::new(file)),
            path: Some(path),
        })
    }

    /// Wraps an arbitrary writer.
    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Box::new(writer),
            path: None,
        }
    }

    /// Path of the log file, if the log was created with [`TestErrorLog::create`].
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn write(&mut self, record: &TestErrorRecord) -> io::Result<()> {
        writeln!(self.writer, "{:.6}", record.distance)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
