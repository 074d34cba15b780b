use std::sync::Arc;

pub use crate::audio::{
    CaptureId, CaptureSpec, EffectKind, EffectParam, EffectsPreset, SampleBuffer, SourceId,
    VoiceId, VoiceSpec,
};

// Everything the control side can ask of the engine. Times are absolute
// seconds on the engine clock; the engine converts them to frames.
#[derive(Clone, Debug)]
pub enum AudioCommand {
    StartVoice(VoiceSpec),
    // Begin the release ramp of a held voice
    ReleaseVoice { id: VoiceId, at: f64 },
    StopVoice(VoiceId),
    StopAllVoices,

    // Buffers are decoded off the audio thread and shared, never copied
    PlayBuffer {
        id: SourceId,
        buffer: Arc<SampleBuffer>,
        start_time: f64,
        gain: f32,
    },
    StopSource(SourceId),

    StartCapture(CaptureSpec),
    StopCapture(CaptureId),
    CancelCapture(CaptureId),

    SetMasterVolume(f32),
    SetPan(f32),
    SetPitchBend { semitones: f32 },
    Effects(EffectsCommand),
}

#[derive(Clone, Debug)]
pub enum EffectsCommand {
    SetParameter(EffectParam),
    SetDryWet(f32),
    ApplyPreset(&'static EffectsPreset),
    SetBypass(EffectKind, bool),
    Reset(EffectKind),
    SetEnabled(bool),
}
