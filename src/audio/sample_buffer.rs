use std::path::Path;
use super::frame::StereoFrame;

#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    pub data: Vec<StereoFrame>, // the audio data array
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(data: Vec<StereoFrame>, sample_rate: u32) -> Self {
        Self { data, sample_rate }
    }

    pub fn silent(frames: usize, sample_rate: u32) -> Self {
        Self {
            data: vec![StereoFrame::zero(); frames],
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / f64::from(self.sample_rate.max(1))
    }

    /// Pads with silence or truncates so the buffer is exactly `frames` long.
    pub fn fit_to(&mut self, frames: usize) {
        self.data.resize(frames, StereoFrame::zero());
    }

    // Load a WAV file from disk into the sample buffer
    pub fn load_wav(path: &Path, target_rate: u32) -> anyhow::Result<Self> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let file_rate = spec.sample_rate;
        let file_channels = spec.channels as usize;

        // Read the samples from the WAV file
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader // float, just pass it through
                .samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => { // int, convert to float
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max))
                    .collect::<Result<Vec<_>, _>>()?
            },
        };

        if file_channels == 0 {
            anyhow::bail!("WAV file declares zero channels");
        }

        let mut frames: Vec<StereoFrame> = if file_channels == 1 {
            samples.into_iter().map(StereoFrame::mono).collect() // mono, duplicate
        } else {
            // anything past the first two channels is dropped
            samples
                .chunks_exact(file_channels)
                .map(|c| StereoFrame {
                    left: c[0],
                    right: c[1],
                })
                .collect()
        };

        if file_rate != target_rate {
            log::debug!("resampling {} from {file_rate} Hz to {target_rate} Hz", path.display());
            frames = resample_linear(&frames, file_rate, target_rate);
        }

        Ok(Self { data: frames, sample_rate: target_rate })
    }
}

fn resample_linear(frames: &[StereoFrame], source_rate: u32, target_rate: u32) -> Vec<StereoFrame> {
    if source_rate == target_rate || source_rate == 0 {
        return frames.to_vec();
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let out_len = (frames.len() as f64 * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        // fractional position in the source buffer
        let src_pos = i as f64 / ratio; // ex. 3.7
        let idx = src_pos.floor() as usize; // ex. 3
        let frac = (src_pos - idx as f64) as f32; // ex. 0.7
        if idx >= frames.len().saturating_sub(1) { // edge case
            out.push(*frames.last().unwrap_or(&StereoFrame::zero()));
        } else {
            let a = frames[idx];
            let b = frames[idx + 1];
            out.push(StereoFrame { // blend via frac and linear interpolation
                left: a.left * (1.0 - frac) + b.left * frac,
                right: a.right * (1.0 - frac) + b.right * frac,
            });
        }
    }
    out
}
