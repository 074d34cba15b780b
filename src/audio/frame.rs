// The smallest unit of audio; one stereo frame
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub fn zero() -> Self { // just giving `default` a better name for clarity
        Self::default()
    }

    pub fn mono(x: f32) -> Self {
        Self { left: x, right: x }
    }

    pub fn scaled(self, gain: f32) -> Self {
        Self {
            left: self.left * gain,
            right: self.right * gain,
        }
    }

    pub fn mix(&mut self, other: StereoFrame, gain: f32) {
        self.left += other.left * gain;
        self.right += other.right * gain;
    }

    pub fn peak(self) -> f32 {
        self.left.abs().max(self.right.abs())
    }
}
