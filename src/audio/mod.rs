use anyhow::Context;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio_api::AudioCommand;
use crate::config::EngineConfig;

mod capture;
pub mod clock;
pub mod effect;
mod engine;
mod envelope;
mod ids;
mod input;
pub mod mix_bus;
mod frame;
mod sample_buffer;
mod source;
mod voice;

pub use capture::{CaptureSpec, CompletedCapture};
pub use clock::SampleClock;
pub use effect::{EffectKind, EffectParam, EffectsChain, EffectsPreset};
pub use engine::Engine;
pub use envelope::Envelope;
pub use frame::StereoFrame;
pub use ids::{next_capture_id, next_source_id, next_voice_id, CaptureId, SourceId, VoiceId};
pub use input::CpalMicrophone;
pub use sample_buffer::SampleBuffer;
pub use voice::{FilterSpec, VoiceSpec, Waveform};

const INPUT_QUEUE: usize = 2048;
const COMPLETED_QUEUE: usize = 16;

/// Control-side connection to a running engine: the command queue, the
/// engine clock, and the queue finished recordings come back on.
#[derive(Clone)]
pub struct AudioLink {
    tx: Sender<AudioCommand>,
    clock: SampleClock,
    completed_rx: Receiver<CompletedCapture>,
}

impl AudioLink {
    /// Never blocks; a full queue drops the command.
    pub fn send(&self, cmd: AudioCommand) -> bool {
        match self.tx.try_send(cmd) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("audio command queue full, command dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("audio engine gone, command ignored");
                false
            }
        }
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn clock(&self) -> &SampleClock {
        &self.clock
    }

    pub fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }

    pub fn poll_completed_capture(&self) -> Option<CompletedCapture> {
        self.completed_rx.try_recv().ok()
    }
}

/// A live engine running inside a cpal output stream.
pub struct AudioHandle {
    link: AudioLink,
    input_tx: Sender<Vec<StereoFrame>>,
    _output_stream: cpal::Stream,
}

impl AudioHandle {
    pub fn link(&self) -> AudioLink {
        self.link.clone()
    }

    /// The default input device, feeding this engine once opened.
    pub fn microphone(&self) -> CpalMicrophone {
        CpalMicrophone::new(self.input_tx.clone(), self.link.sample_rate())
    }
}

pub fn start_audio(config: &EngineConfig) -> anyhow::Result<AudioHandle> {
    let (tx, rx) = crossbeam_channel::bounded::<AudioCommand>(config.command_queue);

    let host = cpal::default_host();
    let device = host.default_output_device().context("no default output device")?;
    let supported = device.default_output_config().context("no default output config")?;

    let sample_rate = supported.sample_rate();
    let channels = supported.channels() as usize;
    log::info!("audio output: {sample_rate} Hz, {channels} channel(s)");

    let (input_tx, input_rx) = crossbeam_channel::bounded::<Vec<StereoFrame>>(INPUT_QUEUE);
    let (completed_tx, completed_rx) = crossbeam_channel::bounded::<CompletedCapture>(COMPLETED_QUEUE);

    let clock = SampleClock::new(sample_rate);
    let mut engine = Engine::new(clock.clone(), rx);
    engine.set_input_rx(input_rx);
    engine.set_completed_tx(completed_tx);

    let link = AudioLink { tx, clock, completed_rx };
    link.send(AudioCommand::SetMasterVolume(config.master_volume));

    match supported.sample_format() {
        cpal::SampleFormat::F32 => {
            let output_stream = build_output_stream_f32(&device, &supported.into(), engine, channels)?;
            output_stream.play().context("failed to play output stream")?;
            Ok(AudioHandle {
                link,
                input_tx,
                _output_stream: output_stream,
            })
        }
        other => anyhow::bail!("unsupported sample format {other:?} (only f32 supported for now)"),
    }
}

// ── Output stream ─────────────────────────────────────────────────

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut engine: Engine,
    channels: usize,
) -> anyhow::Result<cpal::Stream> {
    let err_fn = |err| log::error!("audio output stream error: {err}");
    let mut frames: Vec<StereoFrame> = Vec::with_capacity(4096);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info| {
            let n_frames = data.len() / channels.max(1);
            frames.resize(n_frames, StereoFrame::zero());
            engine.render_block(&mut frames);
            write_interleaved(&frames, data, channels);
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

// Stereo into whatever layout the device wants: mono gets the average,
// extra channels beyond two get the average too.
fn write_interleaved(frames: &[StereoFrame], data: &mut [f32], channels: usize) {
    if channels == 0 {
        return;
    }
    for (frame, out) in frames.iter().zip(data.chunks_exact_mut(channels)) {
        let mid = (frame.left + frame.right) * 0.5;
        match out {
            [mono] => *mono = mid,
            [l, r, rest @ ..] => {
                *l = frame.left;
                *r = frame.right;
                rest.fill(mid);
            }
            [] => {}
        }
    }
}

/// An engine that is rendered by hand instead of by a device callback.
/// Used for offline export and for exercising the engine in tests.
pub struct OfflineAudio {
    pub link: AudioLink,
    pub engine: Engine,
    pub input_tx: Sender<Vec<StereoFrame>>,
}

pub const OFFLINE_BLOCK: usize = 256;

pub fn offline(sample_rate: u32) -> OfflineAudio {
    let (tx, rx) = crossbeam_channel::unbounded::<AudioCommand>();
    let (input_tx, input_rx) = crossbeam_channel::unbounded::<Vec<StereoFrame>>();
    let (completed_tx, completed_rx) = crossbeam_channel::bounded::<CompletedCapture>(COMPLETED_QUEUE);
    let clock = SampleClock::new(sample_rate);
    let mut engine = Engine::new(clock.clone(), rx);
    engine.set_input_rx(input_rx);
    engine.set_completed_tx(completed_tx);
    OfflineAudio {
        link: AudioLink { tx, clock, completed_rx },
        engine,
        input_tx,
    }
}

impl OfflineAudio {
    pub fn render_seconds(&mut self, seconds: f64) -> Vec<StereoFrame> {
        let frames = self.link.clock().seconds_to_frames(seconds) as usize;
        self.engine.render_frames(frames, OFFLINE_BLOCK)
    }

    /// Feeds `input` to the engine as microphone audio while rendering the
    /// same number of frames.
    pub fn record_input(&mut self, input: &[StereoFrame]) -> Vec<StereoFrame> {
        let mut rendered = Vec::with_capacity(input.len());
        for chunk in input.chunks(OFFLINE_BLOCK) {
            let _ = self.input_tx.send(chunk.to_vec());
            let mut out = vec![StereoFrame::zero(); chunk.len()];
            self.engine.render_block(&mut out);
            rendered.extend_from_slice(&out);
        }
        rendered
    }
}
