// Types and helpers shared by the synth, looper, sequencer and scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_BPM: f64 = 120.0;
pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 300.0;
pub const DEFAULT_BARS: u32 = 4;
pub const DEFAULT_BEATS_PER_BAR: u32 = 4;

pub fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_finite() { bpm.clamp(MIN_BPM, MAX_BPM) } else { DEFAULT_BPM }
}

pub fn seconds_per_beat(bpm: f64) -> f64 {
    60.0 / bpm
}

/// `bars * beats_per_bar * 60 / bpm`
pub fn bars_duration(bars: u32, beats_per_bar: u32, bpm: f64) -> f64 {
    f64::from(bars) * f64::from(beats_per_bar) * seconds_per_beat(bpm)
}

/// Result of a name lookup that may have fallen back to a default.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Resolved<T> {
    Exact(T),
    Fallback(T),
}

impl<T> Resolved<T> {
    pub fn value(self) -> T {
        match self {
            Resolved::Exact(v) | Resolved::Fallback(v) => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolved::Fallback(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        match self {
            Resolved::Exact(v) => Resolved::Exact(f(v)),
            Resolved::Fallback(v) => Resolved::Fallback(f(v)),
        }
    }
}

/// Which lookup fell back, carrying the input that was not recognised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fallback {
    Note(String),
    Chord(String),
    Timbre(String),
    EffectsPreset(String),
}

/// Tempo shared between the control thread and scheduler threads.
#[derive(Clone, Debug)]
pub struct Tempo(Arc<AtomicU64>);

impl Tempo {
    pub fn new(bpm: f64) -> Self {
        Self(Arc::new(AtomicU64::new(clamp_bpm(bpm).to_bits())))
    }

    pub fn bpm(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set_bpm(&self, bpm: f64) {
        self.0.store(clamp_bpm(bpm).to_bits(), Ordering::Relaxed);
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_length_scenario() {
        // 4 bars × 4 beats × 0.5 s
        assert_eq!(bars_duration(4, 4, 120.0), 8.0);
    }

    #[test]
    fn test_tempo_is_shared_and_clamped() {
        let tempo = Tempo::new(90.0);
        let other = tempo.clone();
        other.set_bpm(1_000.0);
        assert_eq!(tempo.bpm(), MAX_BPM);
        other.set_bpm(f64::NAN);
        assert_eq!(tempo.bpm(), DEFAULT_BPM);
    }

    #[test]
    fn test_resolved_keeps_tag_through_map() {
        let r = Resolved::Fallback(2).map(|x| x * 10);
        assert!(r.is_fallback());
        assert_eq!(r.value(), 20);
    }
}
