use super::{Effect, EffectKind, blend};
use crate::audio::frame::StereoFrame;

const BASE_DELAY_SECS: f32 = 0.015;
const MAX_SWEEP_SECS: f32 = 0.005;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChorusParam {
    /// LFO rate in Hz, 0.1..=10
    Rate(f32),
    Depth(f32),
    Mix(f32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChorusSettings {
    pub rate: f32,
    pub depth: f32,
    pub mix: f32,
}

impl Default for ChorusSettings {
    fn default() -> Self {
        Self { rate: 1.5, depth: 0.5, mix: 0.3 }
    }
}

pub struct Chorus {
    pub settings: ChorusSettings,
    bypassed: bool,
    sample_rate: f32,
    line: Vec<StereoFrame>,
    write: usize,
    lfo_phase: f32,
}

impl Chorus {
    pub fn new(sample_rate: u32) -> Self {
        let len = (sample_rate as f32 * (BASE_DELAY_SECS + MAX_SWEEP_SECS) * 2.0) as usize + 2;
        Self {
            settings: ChorusSettings::default(),
            bypassed: false,
            sample_rate: sample_rate as f32,
            line: vec![StereoFrame::zero(); len],
            write: 0,
            lfo_phase: 0.0,
        }
    }

    pub fn set(&mut self, param: ChorusParam) {
        match param {
            ChorusParam::Rate(v) => self.settings.rate = v.clamp(0.1, 10.0),
            ChorusParam::Depth(v) => self.settings.depth = v.clamp(0.0, 1.0),
            ChorusParam::Mix(v) => self.settings.mix = v.clamp(0.0, 1.0),
        }
    }

    // linear interpolation between the two frames around `delay` samples ago
    fn tap(&self, delay: f32) -> StereoFrame {
        let len = self.line.len();
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;
        let a = self.line[(self.write + len - whole) % len];
        let b = self.line[(self.write + len - whole - 1) % len];
        StereoFrame {
            left: a.left * (1.0 - frac) + b.left * frac,
            right: a.right * (1.0 - frac) + b.right * frac,
        }
    }
}

impl Effect for Chorus {
    fn kind(&self) -> EffectKind {
        EffectKind::Chorus
    }

    fn process(&mut self, buf: &mut [StereoFrame]) {
        let mix = if self.bypassed { 0.0 } else { self.settings.mix };
        let base = BASE_DELAY_SECS * self.sample_rate;
        let sweep = MAX_SWEEP_SECS * self.sample_rate * self.settings.depth;
        let phase_inc = self.settings.rate / self.sample_rate;
        let len = self.line.len();
        for f in buf.iter_mut() {
            self.line[self.write] = *f;
            let angle = std::f32::consts::TAU * self.lfo_phase;
            // right channel runs a quarter cycle behind for width
            let left = self.tap(base + sweep * angle.sin());
            let right = self.tap(base + sweep * angle.cos());
            self.write = (self.write + 1) % len;
            self.lfo_phase = (self.lfo_phase + phase_inc).fract();
            f.left = blend(f.left, left.left, mix);
            f.right = blend(f.right, right.right, mix);
        }
    }

    fn reset(&mut self) {
        self.settings = ChorusSettings::default();
        self.line.fill(StereoFrame::zero());
        self.write = 0;
        self.lfo_phase = 0.0;
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
    fn test_zero_mix_is_transparent() {
        let mut chorus = Chorus::new(8_000);
        chorus.set(ChorusParam::Mix(0.0));
        let mut buf: Vec<StereoFrame> = (0..256).map(|i| StereoFrame::mono((i as f32 * 0.1).sin())).collect();
        let expected = buf.clone();
        chorus.process(&mut buf);
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_wet_signal_is_delayed() {
        let mut chorus = Chorus::new(8_000);
        chorus.set(ChorusParam::Mix(1.0));
        chorus.set(ChorusParam::Depth(0.0));
        let mut buf = vec![StereoFrame::zero(); 400];
        buf[0] = StereoFrame::mono(1.0);
        chorus.process(&mut buf);
        assert_eq!(buf[0].left, 0.0);
        // 15 ms at 8 kHz
        assert!((buf[120].left - 1.0).abs() < 1e-3);
    }
}
