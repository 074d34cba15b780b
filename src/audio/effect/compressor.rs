use super::{Effect, EffectKind, blend};
use crate::audio::frame::StereoFrame;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CompressorParam {
    /// dBFS, -60..=0
    Threshold(f32),
    /// 1..=20
    Ratio(f32),
    /// Seconds, 0..=1
    Attack(f32),
    /// Seconds, 0..=1
    Release(f32),
    Mix(f32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompressorSettings {
    pub threshold: f32,
    pub ratio: f32,
    pub attack: f32,
    pub release: f32,
    pub mix: f32,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold: -24.0,
            ratio: 4.0,
            attack: 0.003,
            release: 0.25,
            mix: 1.0,
        }
    }
}

/// Feed-forward peak compressor with a smoothed detector.
pub struct Compressor {
    pub settings: CompressorSettings,
    bypassed: bool,
    sample_rate: f32,
    envelope: f32,
}

impl Compressor {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            settings: CompressorSettings::default(),
            bypassed: false,
            sample_rate: sample_rate as f32,
            envelope: 0.0,
        }
    }

    pub fn set(&mut self, param: CompressorParam) {
        match param {
            CompressorParam::Threshold(v) => self.settings.threshold = v.clamp(-60.0, 0.0),
            CompressorParam::Ratio(v) => self.settings.ratio = v.clamp(1.0, 20.0),
            CompressorParam::Attack(v) => self.settings.attack = v.clamp(0.0, 1.0),
            CompressorParam::Release(v) => self.settings.release = v.clamp(0.0, 1.0),
            CompressorParam::Mix(v) => self.settings.mix = v.clamp(0.0, 1.0),
        }
    }

    fn coeff(&self, time: f32) -> f32 {
        if time <= 0.0 {
            0.0
        } else {
            (-1.0 / (time * self.sample_rate)).exp()
        }
    }

    /// Gain reduction for a detector level, as a linear factor.
    pub fn gain_for(&self, level: f32) -> f32 {
        let ratio = if self.bypassed { 1.0 } else { self.settings.ratio };
        let level_db = 20.0 * level.max(1e-6).log10();
        let over = level_db - self.settings.threshold;
        if over <= 0.0 {
            return 1.0;
        }
        let reduction_db = over * (1.0 - 1.0 / ratio);
        10f32.powf(-reduction_db / 20.0)
    }
}

impl Effect for Compressor {
    fn kind(&self) -> EffectKind {
        EffectKind::Compressor
    }

    fn process(&mut self, buf: &mut [StereoFrame]) {
        let attack = self.coeff(self.settings.attack);
        let release = self.coeff(self.settings.release);
        let mix = self.settings.mix;
        for f in buf.iter_mut() {
            let peak = f.peak();
            let coeff = if peak > self.envelope { attack } else { release };
            self.envelope = peak + coeff * (self.envelope - peak);
            let gain = self.gain_for(self.envelope);
            f.left = blend(f.left, f.left * gain, mix);
            f.right = blend(f.right, f.right * gain, mix);
        }
    }

    fn reset(&mut self) {
        self.settings = CompressorSettings::default();
        self.envelope = 0.0;
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypassed = bypass;
    }

    fn is_bypassed(&self) -> bool {
        self.bypassed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_is_clamped() {
        let mut comp = Compressor::new(48_000);
        comp.set(CompressorParam::Ratio(0.5));
        assert_eq!(comp.settings.ratio, 1.0);
        comp.set(CompressorParam::Ratio(40.0));
        assert_eq!(comp.settings.ratio, 20.0);
    }

    #[test]
    fn test_loud_signal_is_reduced() {
        let mut comp = Compressor::new(48_000);
        comp.set(CompressorParam::Threshold(-20.0));
        comp.set(CompressorParam::Ratio(4.0));
        comp.set(CompressorParam::Attack(0.0));
        let mut buf = vec![StereoFrame::mono(1.0); 32];
        comp.process(&mut buf);
        // 20 dB over threshold at 4:1 leaves 5 dB over, i.e. -15 dBFS
        let expected = 10f32.powf(-15.0 / 20.0);
        assert!((buf[31].left - expected).abs() < 1e-3);
    }

    #[test]
    fn test_bypass_is_unity_gain() {
        let mut comp = Compressor::new(48_000);
        comp.set_bypass(true);
        assert_eq!(comp.gain_for(1.0), 1.0);
        assert!(comp.is_bypassed());
    }
}
