//! # Frame Rate Sampling
//!
//! Counts frames over fixed sampling windows and produces the classic
//! benchmark line once a window has elapsed:
//!
//! ```rust
//! use gears::performance::FrameRateSampler;
//!
//! let mut sampler = FrameRateSampler::new(0.0);
//! for i in 1..=300 {
//!     let t = i as f64 / 60.0;
//!     if let Some(report) = sampler.frame(t) {
//!         assert_eq!(report.frames, 300);
//!         assert_eq!(report.to_string(), "Gears: 300 frames in 5.0 seconds = 60.000 FPS");
//!     }
//! }
//! ```
//!
//! Time is passed in explicitly, in seconds, so sampling is deterministic and
//! independent of any particular clock.

use std::fmt;

/// Length of one sampling window in seconds.
pub const SAMPLE_WINDOW_SECS: f64 = 5.0;

/// Frames counted over one completed window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRateReport {
    pub frames: u64,
    pub seconds: f64,
}

impl FrameRateReport {
    pub fn fps(&self) -> f64 {
        self.frames as f64 / self.seconds
    }
}

impl fmt::Display for FrameRateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Gears: {} frames in {:.1} seconds = {:.3} FPS",
            self.frames,
            self.seconds,
            self.fps()
        )
    }
}

/// Frame counter with a sliding baseline.
#[derive(Debug, Clone)]
pub struct FrameRateSampler {
    frames: u64,
    window_start: f64,
    window: f64,
}

impl FrameRateSampler {
    /// Sampler whose first window starts at `now`.
    pub fn new(now: f64) -> Self {
        Self::with_window(now, SAMPLE_WINDOW_SECS)
    }

    pub fn with_window(now: f64, window: f64) -> Self {
        Self {
            frames: 0,
            window_start: now,
            window,
        }
    }

    /// Drops the current count and starts a new window at `now`.
    pub fn reset(&mut self, now: f64) {
        self.frames = 0;
        self.window_start = now;
    }

    /// Frames counted in the current window so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Counts one frame finished at `now`. Returns a report and starts a new
    /// window once at least one window length has passed.
    pub fn frame(&mut self, now: f64) -> Option<FrameRateReport> {
        self.frames += 1;

        let seconds = now - self.window_start;
        if seconds < self.window {
            return None;
        }

        let report = FrameRateReport {
            frames: self.frames,
            seconds,
        };
        self.reset(now);
        Some(report)
    }
}
