//! The hardware clock every scheduled event is measured against.
//!
//! The engine advances the clock by the number of frames it renders, so
//! "now" on the control side is exactly the position of the next block the
//! output callback will produce.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Debug)]
pub struct SampleClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl SampleClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames rendered so far.
    pub fn frame(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Current time in seconds.
    pub fn now(&self) -> f64 {
        self.frame() as f64 / f64::from(self.sample_rate)
    }

    pub fn seconds_to_frames(&self, seconds: f64) -> u64 {
        seconds_to_frames(seconds, self.sample_rate)
    }

    pub fn frames_to_seconds(&self, frames: u64) -> f64 {
        frames as f64 / f64::from(self.sample_rate)
    }

    // only the engine moves the clock
    pub(crate) fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Release);
    }
}

/// Rounds to the nearest frame; negative times clamp to frame zero.
pub fn seconds_to_frames(seconds: f64, sample_rate: u32) -> u64 {
    if seconds <= 0.0 {
        return 0;
    }
    (seconds * f64::from(sample_rate)).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_with_rendered_frames() {
        let clock = SampleClock::new(48_000);
        assert_eq!(clock.now(), 0.0);
        clock.advance(24_000);
        assert!((clock.now() - 0.5).abs() < 1e-12);
        let shared = clock.clone();
        shared.advance(24_000);
        assert_eq!(clock.frame(), 48_000);
    }

    #[test]
    fn test_seconds_to_frames() {
        assert_eq!(seconds_to_frames(8.0, 44_100), 352_800);
        assert_eq!(seconds_to_frames(-1.0, 44_100), 0);
        assert_eq!(seconds_to_frames(0.5, 48_000), 24_000);
    }
}
