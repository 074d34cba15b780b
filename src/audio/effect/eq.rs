use biquad::{Biquad, Coefficients, DirectForm1, Q_BUTTERWORTH_F32, ToHertz, Type};

use super::{Effect, EffectKind, blend};
use crate::audio::frame::StereoFrame;

const LOW_SHELF_HZ: f32 = 200.0;
const MID_PEAK_HZ: f32 = 1_000.0;
const HIGH_SHELF_HZ: f32 = 4_000.0;
pub const MAX_GAIN_DB: f32 = 12.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EqParam {
    /// dB, -12..=12
    Low(f32),
    Mid(f32),
    High(f32),
    Mix(f32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EqSettings {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
    pub mix: f32,
}

impl Default for EqSettings {
    fn default() -> Self {
        Self { low: 0.0, mid: 0.0, high: 0.0, mix: 1.0 }
    }
}

/// Three-band equaliser: low shelf, mid peak, high shelf.
pub struct Equalizer {
    pub settings: EqSettings,
    bypassed: bool,
    sample_rate: f32,
    // [band][channel]
    bands: [[DirectForm1<f32>; 2]; 3],
}

impl Equalizer {
    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = sample_rate as f32;
        let flat = band_coefficients(sample_rate, 0, 0.0);
        let mut eq = Self {
            settings: EqSettings::default(),
            bypassed: false,
            sample_rate,
            bands: std::array::from_fn(|_| [DirectForm1::<f32>::new(flat), DirectForm1::<f32>::new(flat)]),
        };
        eq.rebuild();
        eq
    }

    pub fn set(&mut self, param: EqParam) {
        match param {
            EqParam::Low(db) => self.settings.low = db.clamp(-MAX_GAIN_DB, MAX_GAIN_DB),
            EqParam::Mid(db) => self.settings.mid = db.clamp(-MAX_GAIN_DB, MAX_GAIN_DB),
            EqParam::High(db) => self.settings.high = db.clamp(-MAX_GAIN_DB, MAX_GAIN_DB),
            EqParam::Mix(v) => self.settings.mix = v.clamp(0.0, 1.0),
        }
        self.rebuild();
    }

    fn gains(&self) -> [f32; 3] {
        if self.bypassed {
            [0.0; 3]
        } else {
            [self.settings.low, self.settings.mid, self.settings.high]
        }
    }

    fn rebuild(&mut self) {
        for (band, gain) in self.gains().into_iter().enumerate() {
            let coeffs = band_coefficients(self.sample_rate, band, gain);
            for filter in &mut self.bands[band] {
                filter.update_coefficients(coeffs);
            }
        }
    }
}

fn band_coefficients(sample_rate: f32, band: usize, gain_db: f32) -> Coefficients<f32> {
    let (kind, freq) = match band {
        0 => (Type::LowShelf(gain_db), LOW_SHELF_HZ),
        1 => (Type::PeakingEQ(gain_db), MID_PEAK_HZ),
        _ => (Type::HighShelf(gain_db), HIGH_SHELF_HZ),
    };
    let freq = freq.min(sample_rate * 0.45);
    Coefficients::<f32>::from_params(kind, sample_rate.hz(), freq.hz(), Q_BUTTERWORTH_F32).unwrap_or(
        // pass-through
        Coefficients { a1: 0.0, a2: 0.0, b0: 1.0, b1: 0.0, b2: 0.0 },
    )
}

impl Effect for Equalizer {
    fn kind(&self) -> EffectKind {
        EffectKind::Eq
    }

    fn process(&mut self, buf: &mut [StereoFrame]) {
        let mix = self.settings.mix;
        for f in buf.iter_mut() {
            let mut l = f.left;
            let mut r = f.right;
            for [fl, fr] in &mut self.bands {
                l = fl.run(l);
                r = fr.run(r);
            }
            f.left = blend(f.left, l, mix);
            f.right = blend(f.right, r, mix);
        }
    }

    fn reset(&mut self) {
        self.settings = EqSettings::default();
        for filter in self.bands.iter_mut().flatten() {
            filter.reset_state();
        }
        self.rebuild();
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypassed = bypass;
        self.rebuild();
    }

    fn is_bypassed(&self) -> bool {
        self.bypassed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_clamped_to_twelve_db() {
        let mut eq = Equalizer::new(44_100);
        eq.set(EqParam::Low(30.0));
        eq.set(EqParam::High(-30.0));
        assert_eq!(eq.settings.low, 12.0);
        assert_eq!(eq.settings.high, -12.0);
    }

    #[test]
    fn test_flat_eq_passes_dc() {
        let mut eq = Equalizer::new(44_100);
        let mut buf = vec![StereoFrame::mono(0.5); 2_000];
        eq.process(&mut buf);
        assert!((buf[1_999].left - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_low_boost_raises_dc() {
        let mut eq = Equalizer::new(44_100);
        eq.set(EqParam::Low(6.0));
        let mut buf = vec![StereoFrame::mono(0.25); 20_000];
        eq.process(&mut buf);
        assert!(buf[19_999].left > 0.4);
    }
}
