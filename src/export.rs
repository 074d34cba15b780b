//! Offline mixdown and WAV encoding.

use std::io::Cursor;
use std::sync::Arc;

use crate::audio::{self, next_source_id, SampleBuffer, StereoFrame};
use crate::audio_api::{AudioCommand, EffectsCommand};
use crate::error::{LooperError, LooperResult};

pub const EXPORT_CHANNELS: u16 = 2;
pub const EXPORT_BITS: u16 = 16;

/// Renders `layers` (buffer, gain) from time zero for exactly `frames`
/// frames on a private engine. Effects are off and master gain is unity.
pub fn render_mixdown(
    layers: &[(Arc<SampleBuffer>, f32)],
    sample_rate: u32,
    frames: usize,
) -> LooperResult<Vec<StereoFrame>> {
    let mut off = audio::offline(sample_rate);
    off.link
        .send(AudioCommand::Effects(EffectsCommand::SetEnabled(false)));
    off.link.send(AudioCommand::SetMasterVolume(1.0));
    for (buffer, gain) in layers {
        let sent = off.link.send(AudioCommand::PlayBuffer {
            id: next_source_id(),
            buffer: Arc::clone(buffer),
            start_time: 0.0,
            gain: *gain,
        });
        if !sent {
            return Err(LooperError::Render("offline engine refused a layer".into()));
        }
    }
    let out = off.engine.render_frames(frames, audio::OFFLINE_BLOCK);
    if out.len() != frames {
        return Err(LooperError::Render(format!("rendered {} of {frames} frames", out.len())));
    }
    Ok(out)
}

/// 16-bit PCM stereo WAV, 44-byte header.
pub fn encode_wav(frames: &[StereoFrame], sample_rate: u32) -> LooperResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: EXPORT_CHANNELS,
        sample_rate,
        bits_per_sample: EXPORT_BITS,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + frames.len() * 4));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for frame in frames {
            writer.write_sample(to_i16(frame.left))?;
            writer.write_sample(to_i16(frame.right))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}
