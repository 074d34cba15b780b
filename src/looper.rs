//! Multi-layer overdub looper.
//!
//! Recording is two-phase: [`Looper::acquire_input`] opens the microphone
//! once, then every [`Looper::start_recording`] asks the engine to capture
//! exactly one loop length of input. Finished captures come back through
//! the engine's completed queue and are turned into layers by
//! [`Looper::update`], which also keeps playback cycling.
//!
//! Looping is driven from `update()` against the absolute clock: each cycle
//! is queued at `cycle_start + loop_duration`, never at "now", so late
//! calls do not shift the loop.

use std::path::Path;
use std::sync::Arc;

use crate::audio::{
    next_capture_id, next_source_id, AudioLink, CaptureId, CaptureSpec, CompletedCapture, SampleBuffer,
    SourceId,
};
use crate::audio_api::AudioCommand;
use crate::error::{LooperError, LooperResult};
use crate::export;
use crate::loader::sample_loader;
use crate::shared::{bars_duration, clamp_bpm, DEFAULT_BARS, DEFAULT_BEATS_PER_BAR, DEFAULT_BPM};

/// Layer ids are creation timestamps in milliseconds.
pub type LayerId = i64;

pub const DEFAULT_LOOP_LOOKAHEAD: f64 = 0.1;

// ── Input ─────────────────────────────────────────────────────────

/// Processing the caller would like on the input. Recorded and logged; the
/// platform decides what it honours.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for InputConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// An input device that can be opened into the engine's input queue.
pub trait Microphone {
    fn open(&self, constraints: &InputConstraints) -> LooperResult<InputGuard>;
}

/// Keeps an opened input alive; dropping it closes the device.
pub struct InputGuard {
    _stream: Option<cpal::Stream>,
}

impl InputGuard {
    pub fn from_stream(stream: cpal::Stream) -> Self {
        Self { _stream: Some(stream) }
    }

    /// For inputs whose lifetime is managed elsewhere.
    pub fn detached() -> Self {
        Self { _stream: None }
    }
}

// ── Layers ────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct LoopLayer {
    pub id: LayerId,
    pub buffer: Arc<SampleBuffer>,
    pub volume: f32,
    pub muted: bool,
    pub solo: bool,
}

impl LoopLayer {
    fn new(id: LayerId, buffer: SampleBuffer) -> Self {
        Self {
            id,
            buffer: Arc::new(buffer),
            volume: 1.0,
            muted: false,
            solo: false,
        }
    }

    pub fn duration(&self) -> f64 {
        self.buffer.duration()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LooperState {
    Idle,
    Recording,
    Overdubbing,
    /// Stopped early; the capture is still on its way back from the engine.
    Finalizing,
}

struct Recording {
    capture: CaptureId,
    start_time: f64,
    frames: usize,
}

struct Cycle {
    start_time: f64,
    sources: Vec<SourceId>,
}

struct Playback {
    current: Cycle,
    queued: Option<Cycle>,
}

pub struct Looper {
    link: AudioLink,
    input: Option<InputGuard>,
    denied: Option<String>,
    constraints: InputConstraints,
    state: LooperState,
    recording: Option<Recording>,
    playback: Option<Playback>,
    layers: Vec<LoopLayer>,
    last_layer_id: LayerId,
    bpm: f64,
    bars: u32,
    beats_per_bar: u32,
    volume: f32,
    // fixed when the first layer starts recording, cleared with the layers
    loop_duration: Option<f64>,
    loop_lookahead: f64,
}

impl Looper {
    pub fn new(link: AudioLink) -> Self {
        Self {
            link,
            input: None,
            denied: None,
            constraints: InputConstraints::default(),
            state: LooperState::Idle,
            recording: None,
            playback: None,
            layers: Vec::new(),
            last_layer_id: 0,
            bpm: DEFAULT_BPM,
            bars: DEFAULT_BARS,
            beats_per_bar: DEFAULT_BEATS_PER_BAR,
            volume: 1.0,
            loop_duration: None,
            loop_lookahead: DEFAULT_LOOP_LOOKAHEAD,
        }
    }

    pub fn with_loop_lookahead(mut self, seconds: f64) -> Self {
        self.loop_lookahead = seconds.max(0.0);
        self
    }

    pub fn with_constraints(mut self, constraints: InputConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    // ── Settings ──────────────────────────────────────────────────

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Applies to the next recording that starts a fresh loop.
    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = clamp_bpm(bpm);
    }

    pub fn bars(&self) -> u32 {
        self.bars
    }

    pub fn set_bars(&mut self, bars: u32) {
        self.bars = bars.max(1);
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn set_beats_per_bar(&mut self, beats: u32) {
        self.beats_per_bar = beats.max(1);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.restart_if_playing();
    }

    /// Length every layer shares: fixed once layers exist, otherwise what
    /// the current tempo settings would give.
    pub fn loop_duration(&self) -> f64 {
        self.loop_duration
            .unwrap_or_else(|| bars_duration(self.bars, self.beats_per_bar, self.bpm))
    }

    fn loop_frames(&self) -> usize {
        self.link.clock().seconds_to_frames(self.loop_duration()) as usize
    }

    // ── State ─────────────────────────────────────────────────────

    pub fn state(&self) -> LooperState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state != LooperState::Idle
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_some()
    }

    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    pub fn layers(&self) -> &[LoopLayer] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&LoopLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Start time of the cycle currently sounding.
    pub fn cycle_start(&self) -> Option<f64> {
        self.playback.as_ref().map(|p| p.current.start_time)
    }

    // ── Input ─────────────────────────────────────────────────────

    /// Opens the microphone. A denial is remembered and returned again
    /// without asking the device a second time.
    pub fn acquire_input(&mut self, microphone: &dyn Microphone) -> LooperResult<()> {
        if self.input.is_some() {
            return Ok(());
        }
        if let Some(reason) = &self.denied {
            return Err(LooperError::PermissionDenied(reason.clone()));
        }
        match microphone.open(&self.constraints) {
            Ok(guard) => {
                log::info!("looper input acquired");
                self.input = Some(guard);
                Ok(())
            }
            Err(LooperError::PermissionDenied(reason)) => {
                log::error!("microphone permission denied: {reason}");
                self.denied = Some(reason.clone());
                Err(LooperError::PermissionDenied(reason))
            }
            Err(e) => {
                log::warn!("could not open input: {e}");
                Err(e)
            }
        }
    }

    pub fn release_input(&mut self) {
        self.cancel_recording();
        self.input = None;
    }

    // ── Recording ─────────────────────────────────────────────────

    /// Begins capturing one loop length from now. With existing layers this
    /// is an overdub and the layers restart in step with the capture.
    /// Returns the capture start time.
    pub fn start_recording(&mut self) -> LooperResult<f64> {
        if self.input.is_none() {
            return Err(match &self.denied {
                Some(reason) => LooperError::PermissionDenied(reason.clone()),
                None => LooperError::InputNotAcquired,
            });
        }
        if self.recording.is_some() {
            return Err(LooperError::AlreadyRecording);
        }

        let duration = self.loop_duration();
        self.loop_duration = Some(duration);
        let frames = self.loop_frames();
        let start_time = self.link.now();
        let capture = next_capture_id();

        self.link.send(AudioCommand::StartCapture(CaptureSpec {
            id: capture,
            start_time,
            frames,
        }));
        self.recording = Some(Recording {
            capture,
            start_time,
            frames,
        });

        if self.layers.is_empty() {
            self.state = LooperState::Recording;
        } else {
            self.state = LooperState::Overdubbing;
            self.start_playback_at(start_time);
        }
        log::info!("recording {duration:.3}s ({frames} frames) from {start_time:.3}");
        Ok(start_time)
    }

    /// Ends the capture early; the part already recorded becomes a layer
    /// padded to the loop length once [`update`](Self::update) collects it.
    /// Until then the looper stays in [`LooperState::Finalizing`].
    pub fn stop_recording(&mut self) -> LooperResult<()> {
        let Some(rec) = &self.recording else {
            return Err(LooperError::NotRecording);
        };
        if self.state != LooperState::Finalizing {
            self.link.send(AudioCommand::StopCapture(rec.capture));
            self.state = LooperState::Finalizing;
        }
        Ok(())
    }

    fn cancel_recording(&mut self) {
        if let Some(rec) = self.recording.take() {
            self.link.send(AudioCommand::CancelCapture(rec.capture));
        }
        self.state = LooperState::Idle;
        self.forget_length_if_empty();
    }

    // A loop length only sticks once a layer holds it.
    fn forget_length_if_empty(&mut self) {
        if self.layers.is_empty() && self.recording.is_none() {
            self.loop_duration = None;
        }
    }

    // ── Driving ───────────────────────────────────────────────────

    /// Call regularly. Keeps playback cycling and turns finished captures
    /// into layers. Returns the id of a layer added by this call.
    pub fn update(&mut self) -> LooperResult<Option<LayerId>> {
        self.advance_playback();

        let Some(done) = self.link.poll_completed_capture() else {
            return Ok(None);
        };
        let Some(rec) = self.recording.take_if(|r| r.capture == done.id) else {
            log::debug!("ignoring stale capture {:?}", done.id);
            return Ok(None);
        };
        self.state = LooperState::Idle;

        let buffer = match self.decode(done, rec.frames) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.forget_length_if_empty();
                return Err(e);
            }
        };
        let was_empty = self.layers.is_empty();
        let id = self.push_layer(buffer);

        if was_empty {
            // first layer: loop from where the take began
            self.start_playback_at(rec.start_time);
            self.advance_playback();
        } else if self.is_playing() {
            self.restart_if_playing();
        }
        Ok(Some(id))
    }

    fn decode(&self, done: CompletedCapture, frames: usize) -> LooperResult<SampleBuffer> {
        let mut buffer = done.buffer;
        if buffer.is_empty() {
            log::warn!("capture {:?} produced no audio, discarded", done.id);
            return Err(LooperError::Decode("capture contained no audio".into()));
        }
        if buffer.sample_rate != self.link.sample_rate() {
            return Err(LooperError::Decode(format!(
                "capture at {} Hz, engine at {} Hz",
                buffer.sample_rate,
                self.link.sample_rate()
            )));
        }
        if done.stopped_early {
            log::debug!("padding early stop from {} to {frames} frames", buffer.len());
        }
        buffer.fit_to(frames);
        Ok(buffer)
    }

    fn push_layer(&mut self, buffer: SampleBuffer) -> LayerId {
        let id = chrono::Utc::now().timestamp_millis().max(self.last_layer_id + 1);
        self.last_layer_id = id;
        self.layers.push(LoopLayer::new(id, buffer));
        log::info!("layer {id} added ({} total)", self.layers.len());
        id
    }

    fn advance_playback(&mut self) {
        let now = self.link.now();
        let duration = self.loop_duration();
        if duration <= 0.0 {
            return;
        }
        let Some(playback) = self.playback.as_mut() else {
            return;
        };

        if playback.queued.as_ref().is_some_and(|q| q.start_time <= now) {
            if let Some(next) = playback.queued.take() {
                playback.current = next;
            }
        }
        if playback.queued.is_some() {
            return;
        }

        let current_start = playback.current.start_time;
        if current_start + duration <= now {
            // missed whole cycles; rejoin the grid part way through
            let grid = current_start + ((now - current_start) / duration).floor() * duration;
            log::debug!("looper update late, rejoining cycle at {grid:.3}");
            let sources = self.send_layers(grid);
            if let Some(playback) = self.playback.as_mut() {
                playback.current = Cycle {
                    start_time: grid,
                    sources,
                };
            }
        }

        let Some(current_start) = self.cycle_start() else {
            return;
        };
        let next_start = current_start + duration;
        if next_start <= now + self.loop_lookahead {
            let sources = self.send_layers(next_start);
            if let Some(playback) = self.playback.as_mut() {
                playback.queued = Some(Cycle {
                    start_time: next_start,
                    sources,
                });
            }
        }
    }

    // ── Playback ──────────────────────────────────────────────────

    fn audible(&self) -> impl Iterator<Item = &LoopLayer> {
        self.layers.iter().filter(|l| !l.muted)
    }

    fn send_layers(&self, start_time: f64) -> Vec<SourceId> {
        let mut ids = Vec::new();
        for layer in self.audible() {
            let id = next_source_id();
            let sent = self.link.send(AudioCommand::PlayBuffer {
                id,
                buffer: Arc::clone(&layer.buffer),
                start_time,
                gain: layer.volume * self.volume,
            });
            if sent {
                ids.push(id);
            }
        }
        ids
    }

    fn stop_sources(&mut self) {
        if let Some(playback) = self.playback.take() {
            let queued = playback.queued.into_iter().flat_map(|c| c.sources);
            for id in playback.current.sources.into_iter().chain(queued) {
                self.link.send(AudioCommand::StopSource(id));
            }
        }
    }

    fn start_playback_at(&mut self, start_time: f64) {
        self.stop_sources();
        let sources = self.send_layers(start_time);
        self.playback = Some(Playback {
            current: Cycle { start_time, sources },
            queued: None,
        });
    }

    /// Starts every audible layer together from now. Returns the start time.
    pub fn play_all_layers(&mut self) -> LooperResult<f64> {
        if self.layers.is_empty() {
            return Err(LooperError::NoLayers);
        }
        let start = self.link.now();
        self.start_playback_at(start);
        Ok(start)
    }

    /// Idempotent.
    pub fn stop_playback(&mut self) {
        self.stop_sources();
    }

    // Re-sends layers on the current cycle so edits are heard at once
    // without moving the loop's phase.
    fn restart_if_playing(&mut self) {
        let Some(start) = self.cycle_start() else {
            return;
        };
        self.start_playback_at(start);
        self.advance_playback();
    }

    // ── Layer edits ───────────────────────────────────────────────

    fn layer_mut(&mut self, id: LayerId) -> LooperResult<&mut LoopLayer> {
        self.layers
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(LooperError::UnknownLayer(id))
    }

    /// Returns the new muted flag.
    pub fn toggle_mute(&mut self, id: LayerId) -> LooperResult<bool> {
        let layer = self.layer_mut(id)?;
        layer.muted = !layer.muted;
        let muted = layer.muted;
        self.restart_if_playing();
        Ok(muted)
    }

    /// At most one layer is soloed; soloing another clears the previous one.
    /// Soloing mutes every other layer, un-soloing unmutes all of them.
    pub fn toggle_solo(&mut self, id: LayerId) -> LooperResult<bool> {
        let solo = !self.layer_mut(id)?.solo;
        for layer in &mut self.layers {
            layer.solo = solo && layer.id == id;
            layer.muted = solo && layer.id != id;
        }
        self.restart_if_playing();
        Ok(solo)
    }

    pub fn set_layer_volume(&mut self, id: LayerId, volume: f32) -> LooperResult<()> {
        self.layer_mut(id)?.volume = volume.clamp(0.0, 1.0);
        self.restart_if_playing();
        Ok(())
    }

    pub fn remove_layer(&mut self, id: LayerId) -> LooperResult<LoopLayer> {
        let index = self
            .layers
            .iter()
            .position(|l| l.id == id)
            .ok_or(LooperError::UnknownLayer(id))?;
        let removed = self.layers.remove(index);
        self.after_removal();
        Ok(removed)
    }

    pub fn undo_last_layer(&mut self) -> LooperResult<LoopLayer> {
        let removed = self.layers.pop().ok_or(LooperError::NoLayers)?;
        self.after_removal();
        Ok(removed)
    }

    fn after_removal(&mut self) {
        if self.layers.is_empty() {
            self.stop_sources();
            self.forget_length_if_empty();
        } else {
            self.restart_if_playing();
        }
    }

    /// Stops everything and forgets all layers. Input stays open.
    pub fn clear(&mut self) {
        self.cancel_recording();
        self.stop_sources();
        self.layers.clear();
        self.loop_duration = None;
        log::info!("looper cleared");
    }

    /// Loads a WAV file as a new layer, resampled and fitted to the loop.
    pub fn import_layer(&mut self, path: &Path) -> LooperResult<LayerId> {
        let frames = self.loop_frames();
        let buffer = sample_loader::load_layer(path, self.link.sample_rate(), frames)
            .map_err(|e| LooperError::Decode(format!("{e:#}")))?;
        self.loop_duration = Some(self.loop_duration());
        let id = self.push_layer(buffer);
        if self.is_playing() {
            self.restart_if_playing();
        }
        Ok(id)
    }

    // ── Export ────────────────────────────────────────────────────

    /// The audible layers mixed for exactly one loop, as a 16-bit stereo WAV.
    pub fn export_wav(&self) -> LooperResult<Vec<u8>> {
        if self.layers.is_empty() {
            return Err(LooperError::NoLayers);
        }
        let layers: Vec<(Arc<SampleBuffer>, f32)> = self
            .audible()
            .map(|l| (Arc::clone(&l.buffer), l.volume * self.volume))
            .collect();
        let rate = self.link.sample_rate();
        let mix = export::render_mixdown(&layers, rate, self.loop_frames())?;
        export::encode_wav(&mix, rate)
    }

    pub fn save_wav(&self, path: &Path) -> LooperResult<()> {
        let bytes = self.export_wav()?;
        std::fs::write(path, bytes)?;
        log::info!("loop exported to {}", path.display());
        Ok(())
    }
}
