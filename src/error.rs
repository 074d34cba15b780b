//! Error types for the library surface.

use thiserror::Error;

use crate::sequencer::PartId;

/// Errors from the looper: input acquisition, recording and export.
#[derive(Error, Debug)]
pub enum LooperError {
    /// The user or the platform refused microphone access. Not retried.
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    /// There is no usable input device.
    #[error("No audio input available: {0}")]
    InputUnavailable(String),

    /// `start_recording` was called before `acquire_input`.
    #[error("Input has not been acquired")]
    InputNotAcquired,

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("No loop layers")]
    NoLayers,

    #[error("Unknown layer: {0}")]
    UnknownLayer(i64),

    /// Captured audio could not be turned into a layer; nothing was added.
    #[error("Failed to decode captured audio: {0}")]
    Decode(String),

    /// Offline rendering failed; nothing was produced.
    #[error("Failed to render mix: {0}")]
    Render(String),

    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from sequence edits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequencerError {
    #[error("Unknown part: {0}")]
    UnknownPart(PartId),

    #[error("Sequence index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Part {0} must have at least one bar")]
    ZeroBars(PartId),
}

/// Result type for looper operations
pub type LooperResult<T = ()> = Result<T, LooperError>;

/// Result type for sequencer operations
pub type SequencerResult<T = ()> = Result<T, SequencerError>;
