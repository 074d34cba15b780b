//! fretlab: a real-time note, chord, loop and song-structure engine.
//!
//! ```text
//!  Synthesizer ─┐
//!  Looper ──────┼─ AudioCommand ─▶ Engine (voices, buffers, capture) ─▶ MixBus ─▶ device
//!  Sequencer ───┘        ▲                          │
//!   (via SequencePlayer) └── SampleClock ◀──────────┘
//! ```
//!
//! Control objects talk to the engine only through an [`audio::AudioLink`];
//! use [`audio::start_audio`] for a device or [`audio::offline`] to render
//! by hand.

pub mod audio;
pub mod audio_api;
pub mod config;
pub mod error;
pub mod export;
pub mod loader;
pub mod looper;
pub mod midi;
pub mod pipeline;
pub mod scheduler;
pub mod sequencer;
pub mod shared;
pub mod synth;
pub mod theory;

pub use error::{LooperError, LooperResult, SequencerError, SequencerResult};
pub use shared::{Fallback, Resolved, Tempo};
