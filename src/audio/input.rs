use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;

use crate::error::{LooperError, LooperResult};
use crate::looper::{InputConstraints, InputGuard, Microphone};

use super::frame::StereoFrame;

/// The host's default input device, delivering frames to the engine's
/// input queue at the engine sample rate.
pub struct CpalMicrophone {
    tx: Sender<Vec<StereoFrame>>,
    sample_rate: u32,
}

impl CpalMicrophone {
    pub fn new(tx: Sender<Vec<StereoFrame>>, sample_rate: u32) -> Self {
        Self { tx, sample_rate }
    }
}

impl Microphone for CpalMicrophone {
    fn open(&self, constraints: &InputConstraints) -> LooperResult<InputGuard> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| LooperError::InputUnavailable("no default input device".into()))?;

        let supported = device
            .default_input_config()
            .map_err(|e| LooperError::InputUnavailable(e.to_string()))?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(LooperError::InputUnavailable(format!(
                "unsupported input sample format {:?}",
                supported.sample_format()
            )));
        }

        let mut stream_config: cpal::StreamConfig = supported.into();
        stream_config.sample_rate = self.sample_rate;
        let in_channels = (stream_config.channels as usize).max(1);

        // cpal exposes no processing switches; keep the request visible
        log::info!(
            "opening input: {} ch @ {} Hz (echo_cancellation={}, noise_suppression={}, auto_gain_control={})",
            in_channels,
            self.sample_rate,
            constraints.echo_cancellation,
            constraints.noise_suppression,
            constraints.auto_gain_control,
        );

        let tx = self.tx.clone();
        let err_fn = |err| log::error!("audio input stream error: {err}");
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let _ = tx.try_send(deinterleave(data, in_channels));
                },
                err_fn,
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable
                | cpal::BuildStreamError::StreamConfigNotSupported => {
                    LooperError::InputUnavailable(e.to_string())
                }
                other => LooperError::PermissionDenied(other.to_string()),
            })?;

        stream.play().map_err(|e| match e {
            cpal::PlayStreamError::DeviceNotAvailable => LooperError::InputUnavailable(e.to_string()),
            other => LooperError::PermissionDenied(other.to_string()),
        })?;

        Ok(InputGuard::from_stream(stream))
    }
}

// Mono is duplicated to both sides; anything wider keeps the first two channels.
fn deinterleave(data: &[f32], channels: usize) -> Vec<StereoFrame> {
    if channels == 1 {
        return data.iter().map(|&s| StereoFrame::mono(s)).collect();
    }
    data.chunks_exact(channels)
        .map(|c| StereoFrame { left: c[0], right: c[1] })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave_mono_and_wide() {
        let mono = deinterleave(&[0.1, 0.2], 1);
        assert_eq!(mono, vec![StereoFrame::mono(0.1), StereoFrame::mono(0.2)]);

        let quad = deinterleave(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], 4);
        assert_eq!(
            quad,
            vec![StereoFrame { left: 1.0, right: 2.0 }, StereoFrame { left: 5.0, right: 6.0 }]
        );
    }
}
