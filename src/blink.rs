//! Blink detection from eye openness.

use std::collections::VecDeque;

use serde::Deserialize;

use crate::filter::Filter;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    /// Eyes with a height-to-width ratio below this are considered closed.
    pub openness_threshold: f32,
    /// Number of consecutive frames on the other side of the threshold needed to toggle the
    /// blink state.
    pub min_frames: usize,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            // an eye 4.5 times as wide as it is tall is closed
            openness_threshold: 1.0 / 4.5,
            min_frames: 2,
        }
    }
}

/// Turns a stream of eye openness ratios into a debounced blink state.
#[derive(Debug, Clone)]
pub struct BlinkDetector {
    threshold: f32,
    min_frames: usize,
    history: VecDeque<f32>,
    blinking: bool,
}

impl BlinkDetector {
    pub fn new(config: &BlinkConfig) -> Self {
        let min_frames = config.min_frames.max(1);
        Self {
            threshold: config.openness_threshold,
            min_frames,
            history: VecDeque::with_capacity(min_frames),
            blinking: false,
        }
    }

    /// Returns the current blink state.
    #[inline]
    pub fn is_blinking(&self) -> bool {
        self.blinking
    }
}

impl Filter<f32> for BlinkDetector {
    type Output = bool;

    fn push(&mut self, openness: f32) -> bool {
        self.history.push_back(openness);
        if self.history.len() > self.min_frames {
            self.history.pop_front();
        }

        if self.history.len() == self.min_frames {
            let closed = |v: &f32| *v < self.threshold;
            if !self.blinking && self.history.iter().all(closed) {
                log::trace!("blink started");
                self.blinking = true;
            } else if self.blinking && !self.history.iter().any(closed) {
                log::trace!("blink ended");
                self.blinking = false;
            }
        }

        self.blinking
    }

    fn reset(&mut self) {
        self.history.clear();
        self.blinking = false;
    }
}
