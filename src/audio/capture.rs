use super::frame::StereoFrame;
use super::ids::CaptureId;
use super::sample_buffer::SampleBuffer;

/// Request to record `frames` frames of microphone input from `start_time`.
#[derive(Clone, Debug)]
pub struct CaptureSpec {
    pub id: CaptureId,
    pub start_time: f64,
    pub frames: usize,
}

/// Raw audio handed back to the control side once a capture ends.
#[derive(Clone, Debug)]
pub struct CompletedCapture {
    pub id: CaptureId,
    pub buffer: SampleBuffer,
    pub expected_frames: usize,
    pub stopped_early: bool,
}

// Recording state machine living on the audio thread. Input frames that
// arrive before the start frame are dropped; the capture ends itself once
// `target_frames` have been collected.
pub struct Capture {
    id: CaptureId,
    start_frame: u64,
    target_frames: usize,
    data: Vec<StereoFrame>,
    sample_rate: u32,
}

impl Capture {
    pub fn new(spec: &CaptureSpec, sample_rate: u32) -> Self {
        Self {
            id: spec.id,
            start_frame: super::clock::seconds_to_frames(spec.start_time, sample_rate),
            target_frames: spec.frames,
            data: Vec::with_capacity(spec.frames), // allocate up front, not per block
            sample_rate,
        }
    }

    pub fn id(&self) -> CaptureId {
        self.id
    }

    pub fn is_complete(&self) -> bool {
        self.data.len() >= self.target_frames
    }

    pub fn push(&mut self, frames: &[StereoFrame], now_frame: u64) {
        if now_frame < self.start_frame {
            return;
        }
        let remaining = self.target_frames.saturating_sub(self.data.len());
        let take = remaining.min(frames.len());
        self.data.extend_from_slice(&frames[..take]);
    }

    pub fn finish(self, stopped_early: bool) -> CompletedCapture {
        CompletedCapture {
            id: self.id,
            expected_frames: self.target_frames,
            buffer: SampleBuffer::new(self.data, self.sample_rate),
            stopped_early,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ids::next_capture_id;

    #[test]
    fn test_capture_stops_at_target_length() {
        let spec = CaptureSpec { id: next_capture_id(), start_time: 0.0, frames: 5 };
        let mut cap = Capture::new(&spec, 1_000);
        cap.push(&[StereoFrame::mono(0.1); 3], 0);
        assert!(!cap.is_complete());
        cap.push(&[StereoFrame::mono(0.2); 3], 3);
        assert!(cap.is_complete());
        let done = cap.finish(false);
        assert_eq!(done.buffer.len(), 5);
        assert_eq!(done.buffer.data[4], StereoFrame::mono(0.2));
    }

    #[test]
    fn test_input_before_start_is_dropped() {
        let spec = CaptureSpec { id: next_capture_id(), start_time: 0.01, frames: 4 };
        let mut cap = Capture::new(&spec, 1_000);
        cap.push(&[StereoFrame::mono(0.5); 4], 0);
        assert!(cap.finish(true).buffer.is_empty());
    }
}
