//! Frame timing for the tracking loop.

use std::{
    cell::RefCell,
    fmt,
    time::{Duration, Instant},
};

use itertools::Itertools;

/// Averages the time an operation takes per frame.
///
/// Recorded timings are averaged and cleared when the timer is displayed using `{}`.
pub struct Timer {
    name: &'static str,
    durations: RefCell<Vec<Duration>>,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            durations: RefCell::new(Vec::new()),
        }
    }

    /// Invokes a closure, recording the time it takes.
    pub fn time<T>(&mut self, timee: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = timee();
        self.durations.get_mut().push(start.elapsed());
        result
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut durations = self.durations.borrow_mut();
        let len = durations.len();
        let avg_ms = if len == 0 {
            0.0
        } else {
            durations.iter().map(|d| d.as_secs_f32() * 1000.0).sum::<f32>() / len as f32
        };
        durations.clear();

        write!(f, "{}: {len}x{avg_ms:.01}ms", self.name)
    }
}

/// Logs the number of processed frames per second, together with [`Timer`] averages.
pub struct FpsCounter {
    name: &'static str,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            frames: 0,
            start: Instant::now(),
        }
    }

    /// Advances the frame counter by 1 and logs FPS and `timers` once a second has passed.
    pub fn tick_with<'a>(&mut self, timers: impl IntoIterator<Item = &'a Timer>) {
        self.frames += 1;
        if self.start.elapsed() > Duration::from_secs(1) {
            log::debug!(
                "{}: {} FPS ({})",
                self.name,
                self.frames,
                timers.into_iter().format(", ")
            );

            self.frames = 0;
            self.start = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_display_resets() {
        let mut timer = Timer::new("work");
        assert_eq!(timer.time(|| 7), 7);
        timer.time(|| ());
        assert!(timer.to_string().starts_with("work: 2x"));
        assert_eq!(timer.to_string(), "work: 0x0.0ms");
    }
}
