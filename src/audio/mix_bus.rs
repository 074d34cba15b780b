use super::effect::EffectsChain;
use super::frame::StereoFrame;

pub const DEFAULT_MASTER_VOLUME: f32 = 0.7;

/// Master stage: everything the engine renders ends up here.
pub struct MixBus {
    master_volume: f32,
    pan: f32,
    effects_enabled: bool,
    pub effects: EffectsChain,
}

impl MixBus {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            master_volume: DEFAULT_MASTER_VOLUME,
            pan: 0.0,
            effects_enabled: true,
            effects: EffectsChain::new(sample_rate),
        }
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
    }

    /// -1.0 is hard left, 1.0 hard right.
    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
    }

    pub fn set_effects_enabled(&mut self, enabled: bool) {
        self.effects_enabled = enabled;
    }

    // constant-power pan law, centre is -3 dB per side
    fn pan_gains(&self) -> (f32, f32) {
        let angle = (self.pan + 1.0) * std::f32::consts::FRAC_PI_4;
        (angle.cos(), angle.sin())
    }

    pub fn process(&mut self, buf: &mut [StereoFrame]) {
        if self.effects_enabled {
            self.effects.process(buf);
        }
        let (pan_l, pan_r) = self.pan_gains();
        let gain_l = self.master_volume * pan_l * std::f32::consts::SQRT_2;
        let gain_r = self.master_volume * pan_r * std::f32::consts::SQRT_2;
        for f in buf.iter_mut() {
            f.left = (f.left * gain_l).clamp(-1.0, 1.0);
            f.right = (f.right * gain_r).clamp(-1.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_volume_clamped() {
        let mut bus = MixBus::new(44_100);
        bus.set_master_volume(3.0);
        assert_eq!(bus.master_volume(), 1.0);
        bus.set_master_volume(-1.0);
        assert_eq!(bus.master_volume(), 0.0);
    }

    #[test]
    fn test_centre_pan_is_unity_and_output_is_clipped() {
        let mut bus = MixBus::new(44_100);
        bus.set_effects_enabled(false);
        bus.set_master_volume(1.0);
        let mut buf = vec![StereoFrame::mono(0.5), StereoFrame::mono(4.0)];
        bus.process(&mut buf);
        assert!((buf[0].left - 0.5).abs() < 1e-5);
        assert!((buf[0].right - 0.5).abs() < 1e-5);
        assert_eq!(buf[1].left, 1.0);
    }

    #[test]
    fn test_hard_left_silences_right() {
        let mut bus = MixBus::new(44_100);
        bus.set_effects_enabled(false);
        bus.set_master_volume(1.0);
        bus.set_pan(-1.0);
        let mut buf = vec![StereoFrame::mono(0.5)];
        bus.process(&mut buf);
        assert!(buf[0].right.abs() < 1e-6);
        assert!(buf[0].left > 0.5);
    }
}
