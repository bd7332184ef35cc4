//! Per-stage timing and frame rate logging.

use std::{
    fmt,
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

/// Weight of the newest sample in the running average.
const SMOOTHING: f32 = 0.3;

/// Measures how long a pipeline stage takes.
///
/// Samples are smoothed with an exponential moving average. Formatting the timer with `{}` prints
/// the average and the number of samples, then starts over.
pub struct Timer {
    name: String,
    stats: Mutex<Stats>,
}

#[derive(Default)]
struct Stats {
    avg_secs: Option<f32>,
    samples: usize,
}

impl Stats {
    fn add(&mut self, secs: f32) {
        let avg = match self.avg_secs {
            Some(avg) => avg + SMOOTHING * (secs - avg),
            None => secs,
        };
        self.avg_secs = Some(avg);
        self.samples += 1;
    }
}

impl Timer {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            stats: Mutex::default(),
        }
    }

    /// Runs `stage` and records how long it took.
    pub fn time<T>(&self, stage: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        stage()
    }

    /// Starts a measurement that ends when the returned guard is dropped.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            timer: self,
            started: Instant::now(),
        }
    }

    fn stats(&self) -> MutexGuard<'_, Stats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, elapsed: Duration) {
        self.stats().add(elapsed.as_secs_f32());
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Stats { avg_secs, samples } = std::mem::take(&mut *self.stats());
        let ms = avg_secs.unwrap_or(0.0) * 1000.0;
        write!(f, "{}: {samples}x{ms:.01}ms", self.name)
    }
}

/// Ends a [`Timer`] measurement on drop.
pub struct TimerGuard<'a> {
    timer: &'a Timer,
    started: Instant,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.started.elapsed());
    }
}

/// Counts frames and logs the frame rate at debug level about once per second.
pub struct FpsCounter {
    name: String,
    interval: Duration,
    frames: u32,
    since: Instant,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            interval: Duration::from_secs(1),
            frames: 0,
            since: Instant::now(),
        }
    }

    /// Counts a frame.
    pub fn tick(&mut self) {
        self.tick_with::<&Timer, _>([]);
    }

    /// Counts a frame. When a log line is due, `stages` are printed after the frame rate.
    ///
    /// `stages` are only formatted when a line is actually logged, so [`Timer`]s passed here
    /// average over one logging interval.
    pub fn tick_with<D, I>(&mut self, stages: I)
    where
        D: fmt::Display,
        I: IntoIterator<Item = D>,
    {
        self.frames += 1;
        if self.since.elapsed() < self.interval {
            return;
        }

        let stages = stages.into_iter().map(|s| s.to_string()).collect::<Vec<_>>();
        if stages.is_empty() {
            log::debug!("{}: {} FPS", self.name, self.frames);
        } else {
            log::debug!("{}: {} FPS ({})", self.name, self.frames, stages.join(", "));
        }
        self.frames = 0;
        self.since = Instant::now();
    }
}
