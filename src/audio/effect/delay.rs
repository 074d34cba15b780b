use super::{Effect, EffectKind, blend};
use crate::audio::frame::StereoFrame;

pub const MAX_DELAY_SECS: f32 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DelayParam {
    /// Seconds, 0.01..=2.0
    Time(f32),
    /// 0.0..=0.95 so the loop always decays
    Feedback(f32),
    Mix(f32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DelaySettings {
    pub time: f32,
    pub feedback: f32,
    pub mix: f32,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self { time: 0.25, feedback: 0.3, mix: 0.25 }
    }
}

pub struct Delay {
    pub settings: DelaySettings,
    bypassed: bool,
    sample_rate: f32,
    line: Vec<StereoFrame>,
    write: usize,
}

impl Delay {
    pub fn new(sample_rate: u32) -> Self {
        let len = (sample_rate as f32 * MAX_DELAY_SECS) as usize + 1;
        Self {
            settings: DelaySettings::default(),
            bypassed: false,
            sample_rate: sample_rate as f32,
            line: vec![StereoFrame::zero(); len],
            write: 0,
        }
    }

    pub fn set(&mut self, param: DelayParam) {
        match param {
            DelayParam::Time(v) => self.settings.time = v.clamp(0.01, MAX_DELAY_SECS),
            DelayParam::Feedback(v) => self.settings.feedback = v.clamp(0.0, 0.95),
            DelayParam::Mix(v) => self.settings.mix = v.clamp(0.0, 1.0),
        }
    }

    fn delay_frames(&self) -> usize {
        ((self.settings.time * self.sample_rate) as usize).clamp(1, self.line.len() - 1)
    }
}

impl Effect for Delay {
    fn kind(&self) -> EffectKind {
        EffectKind::Delay
    }

    fn process(&mut self, buf: &mut [StereoFrame]) {
        let mix = if self.bypassed { 0.0 } else { self.settings.mix };
        let feedback = self.settings.feedback;
        let len = self.line.len();
        let delay = self.delay_frames();
        for f in buf.iter_mut() {
            let read = (self.write + len - delay) % len;
            let echo = self.line[read];
            self.line[self.write] = StereoFrame {
                left: f.left + echo.left * feedback,
                right: f.right + echo.right * feedback,
            };
            self.write = (self.write + 1) % len;
            f.left = blend(f.left, echo.left, mix);
            f.right = blend(f.right, echo.right, mix);
        }
    }

    fn reset(&mut self) {
        self.settings = DelaySettings::default();
        self.line.fill(StereoFrame::zero());
        self.write = 0;
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
    fn test_echo_arrives_after_delay_time() {
        let mut delay = Delay::new(1_000);
        delay.set(DelayParam::Time(0.1));
        delay.set(DelayParam::Feedback(0.0));
        delay.set(DelayParam::Mix(1.0));
        let mut buf = vec![StereoFrame::zero(); 200];
        buf[0] = StereoFrame::mono(1.0);
        delay.process(&mut buf);
        assert_eq!(buf[0].left, 0.0);
        assert_eq!(buf[100].left, 1.0);
        assert_eq!(buf[150].left, 0.0);
    }

    #[test]
    fn test_parameters_clamped() {
        let mut delay = Delay::new(1_000);
        delay.set(DelayParam::Time(10.0));
        delay.set(DelayParam::Feedback(3.0));
        assert_eq!(delay.settings.time, MAX_DELAY_SECS);
        assert_eq!(delay.settings.feedback, 0.95);
    }
}
