use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type};
use serde::{Deserialize, Serialize};

use super::envelope::Envelope;
use super::frame::StereoFrame;
use super::ids::VoiceId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// One sample at `phase` in cycles, [0, 1).
    #[inline]
    pub fn sample(self, phase: f64) -> f32 {
        let s = match self {
            Waveform::Sine => (std::f64::consts::TAU * phase).sin(),
            Waveform::Square => if phase < 0.5 { 1.0 } else { -1.0 },
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Triangle => 4.0 * (phase - 0.5).abs() - 1.0,
        };
        s as f32
    }
}

/// Low-pass shaping applied to a voice.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterSpec {
    pub cutoff: f32,
    pub resonance: f32,
}

/// Everything the engine needs to start one oscillator voice.
#[derive(Clone, Debug)]
pub struct VoiceSpec {
    pub id: VoiceId,
    pub waveform: Waveform,
    pub frequency: f64,
    pub start_time: f64,
    /// `None` holds the note until a release command arrives.
    pub duration: Option<f64>,
    pub envelope: Envelope,
    pub volume: f64,
    pub filter: Option<FilterSpec>,
}

pub struct OscVoice {
    pub id: VoiceId,
    waveform: Waveform,
    frequency: f64,
    phase: f64,
    peak: f64,
    envelope: Envelope,
    sample_rate: f64,
    start_frame: u64,
    release_frame: Option<u64>,
    filter: Option<DirectForm1<f32>>,
    finished: bool,
}

impl OscVoice {
    pub fn new(spec: &VoiceSpec, sample_rate: u32) -> Self {
        let sr = f64::from(sample_rate);
        let start_frame = super::clock::seconds_to_frames(spec.start_time, sample_rate);
        let release_frame = spec
            .duration
            .map(|d| start_frame + super::clock::seconds_to_frames(d, sample_rate).max(1));
        Self {
            id: spec.id,
            waveform: spec.waveform,
            frequency: spec.frequency,
            phase: 0.0,
            peak: spec.volume,
            envelope: spec.envelope,
            sample_rate: sr,
            start_frame,
            release_frame,
            filter: spec.filter.and_then(|f| lowpass(f, sample_rate)),
            finished: false,
        }
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Idempotent; stopping a finished voice does nothing.
    pub fn force_stop(&mut self) {
        self.finished = true;
    }

    /// Starts the release ramp at `frame` (never before the voice starts).
    pub fn release_at(&mut self, frame: u64) {
        if self.release_frame.is_none() {
            self.release_frame = Some(frame.max(self.start_frame + 1));
        }
    }

    pub fn stop_frame(&self) -> Option<u64> {
        let release = super::clock::seconds_to_frames(self.envelope.release, self.sample_rate as u32);
        self.release_frame.map(|r| r + release)
    }

    pub fn render_into(&mut self, out: &mut [StereoFrame], block_start: u64, pitch_ratio: f64) {
        if self.finished {
            return;
        }
        let stop_frame = self.stop_frame();
        let hold = self
            .release_frame
            .map(|r| (r - self.start_frame) as f64 / self.sample_rate)
            .unwrap_or(f64::INFINITY);
        let phase_inc = self.frequency * pitch_ratio / self.sample_rate;

        for (i, frame) in out.iter_mut().enumerate() {
            let at = block_start + i as u64;
            if at < self.start_frame {
                continue;
            }
            if stop_frame.is_some_and(|stop| at >= stop) {
                self.finished = true;
                break;
            }
            let t = (at - self.start_frame) as f64 / self.sample_rate;
            let gain = self.envelope.gain_at(t, hold, self.peak) as f32;
            let mut s = self.waveform.sample(self.phase) * gain;
            if let Some(filter) = self.filter.as_mut() {
                s = filter.run(s);
            }
            frame.left += s;
            frame.right += s;

            self.phase += phase_inc;
            if self.phase >= 1.0 {
                self.phase -= self.phase.floor();
            }
        }
    }
}

fn lowpass(spec: FilterSpec, sample_rate: u32) -> Option<DirectForm1<f32>> {
    let nyquist = sample_rate as f32 / 2.0;
    let cutoff = spec.cutoff.clamp(20.0, nyquist * 0.95);
    let q = spec.resonance.max(0.1);
    match Coefficients::<f32>::from_params(Type::LowPass, (sample_rate as f32).hz(), cutoff.hz(), q) {
        Ok(coeffs) => Some(DirectForm1::<f32>::new(coeffs)),
        Err(e) => {
            log::warn!("voice filter disabled, bad coefficients: {e:?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ids::next_voice_id;

    fn spec(duration: Option<f64>) -> VoiceSpec {
        VoiceSpec {
            id: next_voice_id(),
            waveform: Waveform::Square,
            frequency: 100.0,
            start_time: 0.01,
            duration,
            envelope: Envelope::new(0.0, 0.0, 1.0, 0.01),
            volume: 0.5,
            filter: None,
        }
    }

    #[test]
    fn test_voice_is_silent_before_start_and_after_stop() {
        let mut voice = OscVoice::new(&spec(Some(0.02)), 1_000);
        let mut out = vec![StereoFrame::zero(); 100];
        voice.render_into(&mut out, 0, 1.0);
        assert!(out[..10].iter().all(|f| f.left == 0.0));
        assert!((out[10].left - 0.5).abs() < 1e-6);
        // start 10 + hold 20 + release 10
        assert_eq!(voice.stop_frame(), Some(40));
        assert!(out[40..].iter().all(|f| f.left == 0.0));
        assert!(voice.is_finished());
    }

    #[test]
    fn test_held_voice_sounds_until_released() {
        let mut voice = OscVoice::new(&spec(None), 1_000);
        assert_eq!(voice.stop_frame(), None);
        let mut out = vec![StereoFrame::zero(); 50];
        voice.render_into(&mut out, 0, 1.0);
        assert!(!voice.is_finished());
        voice.release_at(60);
        voice.release_at(500); // second release is ignored
        assert_eq!(voice.stop_frame(), Some(70));
        let mut out = vec![StereoFrame::zero(); 50];
        voice.render_into(&mut out, 50, 1.0);
        assert!(voice.is_finished());
    }

    #[test]
    fn test_force_stop_is_idempotent() {
        let mut voice = OscVoice::new(&spec(Some(1.0)), 1_000);
        voice.force_stop();
        voice.force_stop();
        let mut out = vec![StereoFrame::zero(); 20];
        voice.render_into(&mut out, 0, 1.0);
        assert!(out.iter().all(|f| f.left == 0.0));
    }

    #[test]
    fn test_waveform_ranges() {
        for w in [Waveform::Sine, Waveform::Square, Waveform::Sawtooth, Waveform::Triangle] {
            for i in 0..100 {
                let s = w.sample(i as f64 / 100.0);
                assert!((-1.0..=1.0).contains(&s), "{w:?} out of range");
            }
        }
    }
}
