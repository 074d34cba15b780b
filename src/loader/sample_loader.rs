use std::path::Path;

use crate::audio::SampleBuffer;

// Load a WAV from disk as a loop layer: resampled to the engine rate, then
// padded or cut to exactly `frames` frames.
pub fn load_layer(path: &Path, target_rate: u32, frames: usize) -> anyhow::Result<SampleBuffer> {
    let mut buffer = SampleBuffer::load_wav(path, target_rate)?;
    if buffer.is_empty() {
        anyhow::bail!("{} contains no audio", path.display());
    }
    if buffer.len() != frames {
        log::debug!("fitting {} from {} to {frames} frames", path.display(), buffer.len());
    }
    buffer.fit_to(frames);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, rate: u32, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            w.write_sample(s).unwrap();
        }
        w.finalize().unwrap();
    }

    #[test]
    fn test_layer_is_fitted_to_loop_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_wav(&path, 1_000, &[16_384; 10]);
        let buf = load_layer(&path, 1_000, 25).unwrap();
        assert_eq!(buf.len(), 25);
        assert!((buf.data[0].left - 0.5).abs() < 1e-3);
        assert_eq!(buf.data[24].left, 0.0);
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, 1_000, &[]);
        assert!(load_layer(&path, 1_000, 25).is_err());
    }
}
