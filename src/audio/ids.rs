use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CAPTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one oscillator voice. Ids only ever increase, so a released
/// voice's id is never handed out again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

/// Identifies one buffer playback started on the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceId(pub u64);

/// Identifies one microphone capture pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CaptureId(pub u64);

// fancy atomic counters let us generate unique ids from any thread
pub fn next_voice_id() -> VoiceId {
    VoiceId(NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed))
}

pub fn next_source_id() -> SourceId {
    SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
}

pub fn next_capture_id() -> CaptureId {
    CaptureId(NEXT_CAPTURE_ID.fetch_add(1, Ordering::Relaxed))
}
