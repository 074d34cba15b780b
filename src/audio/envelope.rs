/// Linear-ramp ADSR. Times are in seconds, `sustain` is a ratio of the peak.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Envelope {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Envelope {
    pub fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Self {
            attack: attack.max(0.0),
            decay: decay.max(0.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(0.0),
        }
    }

    /// Gain `t` seconds after note-on for a note held for `hold` seconds.
    ///
    /// Rises 0 → peak over attack, falls to `peak * sustain` over decay and
    /// stays there until `hold`; from `hold` it ramps from the sustain level
    /// to zero over release.
    pub fn gain_at(&self, t: f64, hold: f64, peak: f64) -> f64 {
        if t < 0.0 {
            return 0.0;
        }
        let sustain_level = peak * self.sustain;
        if t >= hold {
            let into_release = t - hold;
            if self.release <= 0.0 || into_release >= self.release {
                return 0.0;
            }
            return sustain_level * (1.0 - into_release / self.release);
        }
        if t < self.attack {
            return peak * t / self.attack;
        }
        let into_decay = t - self.attack;
        if into_decay < self.decay {
            return peak + (sustain_level - peak) * into_decay / self.decay;
        }
        sustain_level
    }

    /// Total time a voice sounds for a note held `hold` seconds.
    pub fn lifetime(&self, hold: f64) -> f64 {
        hold + self.release
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_envelope_shape() {
        let env = Envelope::new(0.1, 0.2, 0.5, 0.4);
        assert!(close(env.gain_at(0.0, 1.0, 1.0), 0.0));
        assert!(close(env.gain_at(0.05, 1.0, 1.0), 0.5));
        assert!(close(env.gain_at(0.1, 1.0, 1.0), 1.0));
        assert!(close(env.gain_at(0.2, 1.0, 1.0), 0.75));
        assert!(close(env.gain_at(0.5, 1.0, 1.0), 0.5));
        assert!(close(env.gain_at(1.2, 1.0, 1.0), 0.25));
        assert!(close(env.gain_at(1.4, 1.0, 1.0), 0.0));
        assert!(close(env.gain_at(3.0, 1.0, 1.0), 0.0));
    }

    #[test]
    fn test_zero_attack_starts_at_peak() {
        let env = Envelope::new(0.0, 0.0, 1.0, 0.0);
        assert!(close(env.gain_at(0.0, 1.0, 0.3), 0.3));
        assert!(close(env.gain_at(1.0, 1.0, 0.3), 0.0));
    }

    #[test]
    fn test_lifetime_includes_release() {
        let env = Envelope::new(0.01, 0.1, 0.7, 0.8);
        assert!(close(env.lifetime(1.0), 1.8));
    }

    #[test]
    fn test_parameters_are_clamped() {
        let env = Envelope::new(-1.0, 0.1, 4.0, -0.5);
        assert_eq!(env.attack, 0.0);
        assert_eq!(env.sustain, 1.0);
        assert_eq!(env.release, 0.0);
    }
}
