// Small Schroeder/Freeverb-style room: four damped combs into two allpasses
// per channel, right channel detuned by a fixed spread.

use super::{Effect, EffectKind, blend};
use crate::audio::frame::StereoFrame;

const COMB_TUNING: [usize; 4] = [1116, 1188, 1277, 1356];
const ALLPASS_TUNING: [usize; 2] = [556, 441];
const STEREO_SPREAD: usize = 23;
const INPUT_GAIN: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReverbParam {
    RoomSize(f32),
    Damping(f32),
    Mix(f32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReverbSettings {
    pub room_size: f32,
    pub damping: f32,
    pub mix: f32,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self { room_size: 0.5, damping: 0.5, mix: 0.3 }
    }
}

struct Comb {
    buf: Vec<f32>,
    idx: usize,
    store: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self { buf: vec![0.0; len.max(1)], idx: 0, store: 0.0 }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let out = self.buf[self.idx];
        self.store = out * (1.0 - damp) + self.store * damp;
        self.buf[self.idx] = input + self.store * feedback;
        self.idx = (self.idx + 1) % self.buf.len();
        out
    }

    fn clear(&mut self) {
        self.buf.fill(0.0);
        self.store = 0.0;
    }
}

struct Allpass {
    buf: Vec<f32>,
    idx: usize,
}

impl Allpass {
    fn new(len: usize) -> Self {
        Self { buf: vec![0.0; len.max(1)], idx: 0 }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buf[self.idx];
        self.buf[self.idx] = input + delayed * 0.5;
        self.idx = (self.idx + 1) % self.buf.len();
        delayed - input
    }

    fn clear(&mut self) {
        self.buf.fill(0.0);
    }
}

pub struct Reverb {
    pub settings: ReverbSettings,
    bypassed: bool,
    combs: [Vec<Comb>; 2],
    allpasses: [Vec<Allpass>; 2],
}

impl Reverb {
    pub fn new(sample_rate: u32) -> Self {
        let scale = sample_rate as f32 / 44_100.0;
        let sized = |n: usize, spread: usize| ((n + spread) as f32 * scale) as usize;
        Self {
            settings: ReverbSettings::default(),
            bypassed: false,
            combs: [
                COMB_TUNING.iter().map(|&n| Comb::new(sized(n, 0))).collect(),
                COMB_TUNING.iter().map(|&n| Comb::new(sized(n, STEREO_SPREAD))).collect(),
            ],
            allpasses: [
                ALLPASS_TUNING.iter().map(|&n| Allpass::new(sized(n, 0))).collect(),
                ALLPASS_TUNING.iter().map(|&n| Allpass::new(sized(n, STEREO_SPREAD))).collect(),
            ],
        }
    }

    pub fn set(&mut self, param: ReverbParam) {
        match param {
            ReverbParam::RoomSize(v) => self.settings.room_size = v.clamp(0.0, 1.0),
            ReverbParam::Damping(v) => self.settings.damping = v.clamp(0.0, 1.0),
            ReverbParam::Mix(v) => self.settings.mix = v.clamp(0.0, 1.0),
        }
    }

    fn effective_mix(&self) -> f32 {
        if self.bypassed { 0.0 } else { self.settings.mix }
    }
}

impl Effect for Reverb {
    fn kind(&self) -> EffectKind {
        EffectKind::Reverb
    }

    fn process(&mut self, buf: &mut [StereoFrame]) {
        let mix = self.effective_mix();
        let feedback = 0.7 + self.settings.room_size * 0.28;
        let damp = self.settings.damping * 0.4;
        for f in buf.iter_mut() {
            let input = (f.left + f.right) * 0.5 * INPUT_GAIN;
            let mut wet = [0.0f32; 2];
            for (ch, out) in wet.iter_mut().enumerate() {
                let mut acc: f32 = self.combs[ch].iter_mut().map(|c| c.process(input, feedback, damp)).sum();
                for ap in &mut self.allpasses[ch] {
                    acc = ap.process(acc);
                }
                *out = acc;
            }
            f.left = blend(f.left, wet[0], mix);
            f.right = blend(f.right, wet[1], mix);
        }
    }

    fn reset(&mut self) {
        self.settings = ReverbSettings::default();
        self.combs.iter_mut().flatten().for_each(Comb::clear);
        self.allpasses.iter_mut().flatten().for_each(Allpass::clear);
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
    fn test_reverb_tail_rings_after_impulse() {
        let mut reverb = Reverb::new(44_100);
        reverb.set(ReverbParam::Mix(1.0));
        let mut buf = vec![StereoFrame::zero(); 4_000];
        buf[0] = StereoFrame::mono(1.0);
        reverb.process(&mut buf);
        assert!(buf[1_500..].iter().any(|f| f.left.abs() > 1e-4));
    }

    #[test]
    fn test_bypassed_reverb_passes_dry_signal() {
        let mut reverb = Reverb::new(44_100);
        reverb.set_bypass(true);
        let mut buf = vec![StereoFrame::mono(0.25); 64];
        reverb.process(&mut buf);
        assert!(buf.iter().all(|f| f.left == 0.25));
        assert_eq!(reverb.settings.mix, 0.3);
    }
}
