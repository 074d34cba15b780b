use crate::audio::{Envelope, FilterSpec, Waveform};
use crate::shared::Resolved;

/// A fixed instrument voicing: oscillator, envelope, tone filter and level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timbre {
    pub name: &'static str,
    pub waveform: Waveform,
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
    pub filter_cutoff: f32,
    pub filter_resonance: f32,
    pub volume: f64,
}

pub const TIMBRES: &[Timbre] = &[
    Timbre {
        name: "piano",
        waveform: Waveform::Triangle,
        attack: 0.01,
        decay: 0.3,
        sustain: 0.4,
        release: 0.8,
        filter_cutoff: 5000.0,
        filter_resonance: 1.0,
        volume: 0.8,
    },
    Timbre {
        name: "guitar",
        waveform: Waveform::Sawtooth,
        attack: 0.005,
        decay: 0.2,
        sustain: 0.3,
        release: 0.5,
        filter_cutoff: 3000.0,
        filter_resonance: 2.0,
        volume: 0.7,
    },
    Timbre {
        name: "electric",
        waveform: Waveform::Square,
        attack: 0.01,
        decay: 0.1,
        sustain: 0.7,
        release: 0.3,
        filter_cutoff: 2500.0,
        filter_resonance: 4.0,
        volume: 0.5,
    },
    Timbre {
        name: "organ",
        waveform: Waveform::Sine,
        attack: 0.05,
        decay: 0.1,
        sustain: 0.9,
        release: 0.1,
        filter_cutoff: 8000.0,
        filter_resonance: 0.7,
        volume: 0.6,
    },
    Timbre {
        name: "strings",
        waveform: Waveform::Sawtooth,
        attack: 0.3,
        decay: 0.2,
        sustain: 0.8,
        release: 1.0,
        filter_cutoff: 4000.0,
        filter_resonance: 0.7,
        volume: 0.5,
    },
    Timbre {
        name: "pad",
        waveform: Waveform::Triangle,
        attack: 0.8,
        decay: 0.5,
        sustain: 0.7,
        release: 2.0,
        filter_cutoff: 2000.0,
        filter_resonance: 0.5,
        volume: 0.5,
    },
    Timbre {
        name: "bass",
        waveform: Waveform::Square,
        attack: 0.01,
        decay: 0.2,
        sustain: 0.6,
        release: 0.3,
        filter_cutoff: 800.0,
        filter_resonance: 2.0,
        volume: 0.8,
    },
    Timbre {
        name: "synth",
        waveform: Waveform::Sawtooth,
        attack: 0.02,
        decay: 0.1,
        sustain: 0.6,
        release: 0.4,
        filter_cutoff: 3500.0,
        filter_resonance: 6.0,
        volume: 0.5,
    },
    Timbre {
        name: "bell",
        waveform: Waveform::Sine,
        attack: 0.001,
        decay: 1.0,
        sustain: 0.0,
        release: 1.5,
        filter_cutoff: 10000.0,
        filter_resonance: 0.7,
        volume: 0.6,
    },
];

impl Timbre {
    /// Unknown names fall back to piano.
    pub fn lookup(name: &str) -> Resolved<&'static Timbre> {
        let wanted = name.trim().to_ascii_lowercase();
        match TIMBRES.iter().find(|t| t.name == wanted) {
            Some(t) => Resolved::Exact(t),
            None => Resolved::Fallback(&TIMBRES[0]),
        }
    }

    pub fn envelope(&self) -> Envelope {
        Envelope::new(self.attack, self.decay, self.sustain, self.release)
    }

    pub fn filter(&self) -> FilterSpec {
        FilterSpec {
            cutoff: self.filter_cutoff,
            resonance: self.filter_resonance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive_and_falls_back() {
        assert_eq!(Timbre::lookup("Organ").value().name, "organ");
        let missing = Timbre::lookup("theremin");
        assert!(missing.is_fallback());
        assert_eq!(missing.value().name, super::super::DEFAULT_TIMBRE);
    }

    #[test]
    fn test_presets_are_sane() {
        for t in TIMBRES {
            assert!((0.0..=1.0).contains(&t.sustain), "{}", t.name);
            assert!((0.0..=1.0).contains(&t.volume), "{}", t.name);
            assert!(t.filter_cutoff > 0.0 && t.filter_resonance > 0.0, "{}", t.name);
        }
    }
}
