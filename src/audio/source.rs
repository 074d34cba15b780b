use std::sync::Arc;

use super::frame::StereoFrame;
use super::ids::SourceId;
use super::sample_buffer::SampleBuffer;

/// A one-shot playback of a shared buffer, starting at an absolute frame.
pub struct BufferSource {
    pub id: SourceId,
    buffer: Arc<SampleBuffer>,
    start_frame: u64,
    gain: f32,
    finished: bool,
}

impl BufferSource {
    pub fn new(id: SourceId, buffer: Arc<SampleBuffer>, start_frame: u64, gain: f32) -> Self {
        Self {
            id,
            buffer,
            start_frame,
            gain,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stop(&mut self) {
        self.finished = true;
    }

    pub fn render_into(&mut self, out: &mut [StereoFrame], block_start: u64) {
        if self.finished {
            return;
        }
        let data = &self.buffer.data;
        let end_frame = self.start_frame + data.len() as u64;
        for (i, frame) in out.iter_mut().enumerate() {
            let at = block_start + i as u64;
            if at < self.start_frame {
                continue;
            }
            if at >= end_frame {
                self.finished = true;
                return;
            }
            frame.mix(data[(at - self.start_frame) as usize], self.gain);
        }
        if block_start + out.len() as u64 >= end_frame {
            self.finished = true;
        }
    }
}
