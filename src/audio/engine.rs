use crossbeam_channel::{Receiver, Sender};

use crate::audio_api::{AudioCommand, EffectsCommand};

use super::capture::{Capture, CompletedCapture};
use super::clock::{SampleClock, seconds_to_frames};
use super::frame::StereoFrame;
use super::mix_bus::MixBus;
use super::source::BufferSource;
use super::voice::OscVoice;

// Polyphony cap; past it the oldest voice is stolen.
const MAX_VOICES: usize = 64;
// Initial room for buffer sources. Sources are never evicted, so a loop with
// more layers than this grows the pool on the audio thread.
const SOURCE_CAPACITY: usize = 64;

pub struct Engine {
    sample_rate: u32,
    clock: SampleClock,
    rx: Receiver<AudioCommand>,
    input_rx: Option<Receiver<Vec<StereoFrame>>>,
    completed_tx: Option<Sender<CompletedCapture>>,
    voices: Vec<OscVoice>,
    sources: Vec<BufferSource>,
    capture: Option<Capture>,
    pitch_ratio: f64,
    bus: MixBus,
    scratch: Vec<StereoFrame>,
}

impl Engine {
    pub fn new(clock: SampleClock, rx: Receiver<AudioCommand>) -> Self {
        let sample_rate = clock.sample_rate();
        Self {
            sample_rate,
            clock,
            rx,
            input_rx: None,
            completed_tx: None,
            voices: Vec::with_capacity(MAX_VOICES),
            sources: Vec::with_capacity(SOURCE_CAPACITY),
            capture: None,
            pitch_ratio: 1.0,
            bus: MixBus::new(sample_rate),
            scratch: Vec::with_capacity(4096),
        }
    }

    pub fn set_input_rx(&mut self, rx: Receiver<Vec<StereoFrame>>) {
        self.input_rx = Some(rx);
    }

    pub fn set_completed_tx(&mut self, tx: Sender<CompletedCapture>) {
        self.completed_tx = Some(tx);
    }

    pub fn bus(&self) -> &MixBus {
        &self.bus
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Unbent frequencies of the voices currently in the pool.
    pub fn voice_frequencies(&self) -> Vec<f64> {
        self.voices.iter().map(OscVoice::frequency).collect()
    }

    pub fn active_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    pub fn handle_cmd(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::StartVoice(spec) => {
                if self.voices.len() >= MAX_VOICES {
                    // steal the oldest voice rather than grow the pool
                    self.voices.remove(0);
                }
                self.voices.push(OscVoice::new(&spec, self.sample_rate));
            }
            AudioCommand::ReleaseVoice { id, at } => {
                let frame = seconds_to_frames(at, self.sample_rate);
                if let Some(v) = self.voices.iter_mut().find(|v| v.id == id) {
                    v.release_at(frame);
                }
            }
            AudioCommand::StopVoice(id) => {
                // already-finished voices are simply not found
                if let Some(v) = self.voices.iter_mut().find(|v| v.id == id) {
                    v.force_stop();
                }
            }
            AudioCommand::StopAllVoices => {
                self.voices.iter_mut().for_each(OscVoice::force_stop);
            }
            AudioCommand::PlayBuffer { id, buffer, start_time, gain } => {
                let start = seconds_to_frames(start_time, self.sample_rate);
                self.sources.push(BufferSource::new(id, buffer, start, gain));
            }
            AudioCommand::StopSource(id) => {
                if let Some(s) = self.sources.iter_mut().find(|s| s.id == id) {
                    s.stop();
                }
            }
            AudioCommand::StartCapture(spec) => {
                if let Some(old) = self.capture.take() {
                    self.complete_capture(old, true);
                }
                self.capture = Some(Capture::new(&spec, self.sample_rate));
            }
            AudioCommand::StopCapture(id) => {
                if self.capture.as_ref().is_some_and(|c| c.id() == id) {
                    if let Some(cap) = self.capture.take() {
                        self.complete_capture(cap, true);
                    }
                }
            }
            AudioCommand::CancelCapture(id) => {
                if self.capture.as_ref().is_some_and(|c| c.id() == id) {
                    self.capture = None;
                }
            }
            AudioCommand::SetMasterVolume(v) => self.bus.set_master_volume(v),
            AudioCommand::SetPan(p) => self.bus.set_pan(p),
            AudioCommand::SetPitchBend { semitones } => {
                self.pitch_ratio = 2f64.powf(f64::from(semitones) / 12.0);
            }
            AudioCommand::Effects(cmd) => self.handle_effects_cmd(cmd),
        }
    }

    fn handle_effects_cmd(&mut self, cmd: EffectsCommand) {
        let chain = &mut self.bus.effects;
        match cmd {
            EffectsCommand::SetParameter(p) => chain.set_parameter(p),
            EffectsCommand::SetDryWet(m) => chain.set_dry_wet_mix(m),
            EffectsCommand::ApplyPreset(preset) => chain.apply_preset(preset),
            EffectsCommand::SetBypass(kind, bypass) => chain.set_bypass(kind, bypass),
            EffectsCommand::Reset(kind) => chain.reset(kind),
            EffectsCommand::SetEnabled(on) => self.bus.set_effects_enabled(on),
        }
    }

    fn complete_capture(&mut self, capture: Capture, stopped_early: bool) {
        let done = capture.finish(stopped_early);
        log::debug!("capture {:?} finished with {} frames", done.id, done.buffer.len());
        if let Some(tx) = &self.completed_tx {
            let _ = tx.try_send(done);
        }
    }

    // Drain mic input into the recording state machine. Input that arrives
    // while nothing is recording is thrown away so it can't pile up.
    pub fn drain_input(&mut self) {
        let Some(rx) = &self.input_rx else {
            return;
        };
        let now = self.clock.frame();
        while let Ok(frames) = rx.try_recv() {
            if let Some(cap) = self.capture.as_mut() {
                cap.push(&frames, now);
            }
        }
        if self.capture.as_ref().is_some_and(Capture::is_complete) {
            if let Some(cap) = self.capture.take() {
                self.complete_capture(cap, false);
            }
        }
    }

    /// Pulls pending commands and input, renders one block, then advances
    /// the clock past it.
    pub fn render_block(&mut self, out: &mut [StereoFrame]) {
        while let Ok(cmd) = self.rx.try_recv() {
            self.handle_cmd(cmd);
        }
        self.drain_input();

        let block_start = self.clock.frame();
        self.scratch.clear();
        self.scratch.resize(out.len(), StereoFrame::zero());

        for voice in &mut self.voices {
            voice.render_into(&mut self.scratch, block_start, self.pitch_ratio);
        }
        for source in &mut self.sources {
            source.render_into(&mut self.scratch, block_start);
        }
        self.voices.retain(|v| !v.is_finished());
        self.sources.retain(|s| !s.is_finished());

        self.bus.process(&mut self.scratch);
        out.copy_from_slice(&self.scratch);

        self.clock.advance(out.len() as u64);
    }

    /// Renders `frames` frames into a fresh buffer, block by block.
    pub fn render_frames(&mut self, frames: usize, block: usize) -> Vec<StereoFrame> {
        let block = block.max(1);
        let mut out = vec![StereoFrame::zero(); frames];
        for chunk in out.chunks_mut(block) {
            self.render_block(chunk);
        }
        out
    }
}
