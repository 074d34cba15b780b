//! Lookahead scheduling.
//!
//! A [`Scheduler`] wakes periodically and places every event that falls
//! inside the lookahead window onto the engine timeline at its exact
//! absolute time. Wake-up jitter only changes *when* an event is queued,
//! never *where* it lands, so timing error does not accumulate.
//!
//! ```text
//!   now                 now + lookahead
//!    |=====================|
//!    ^ next_event_time     events here are sent now
//! ```

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::audio::{next_voice_id, AudioLink, Envelope, VoiceSpec, Waveform};
use crate::audio_api::AudioCommand;
use crate::config::EngineConfig;
use crate::shared::{seconds_per_beat, Tempo};

// keeps a zero interval from spinning forever inside one wake
const MIN_INTERVAL: f64 = 0.001;

/// Something that emits events on a regular grid.
pub trait ScheduledSource: Send {
    /// Put the event for absolute clock time `time` on the timeline.
    fn schedule(&mut self, time: f64);

    /// Seconds from this event to the next. Read after every event, so a
    /// tempo change applies from the next event on.
    fn interval(&self) -> f64;

    fn is_finished(&self) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scheduling,
}

pub struct Scheduler<S> {
    source: S,
    state: SchedulerState,
    next_event_time: f64,
    lookahead: f64,
}

impl<S: ScheduledSource> Scheduler<S> {
    pub fn new(source: S, lookahead: f64) -> Self {
        Self {
            source,
            state: SchedulerState::Idle,
            next_event_time: 0.0,
            lookahead: lookahead.max(0.0),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Scheduling
    }

    pub fn next_event_time(&self) -> f64 {
        self.next_event_time
    }

    /// First event lands at `now`.
    pub fn start(&mut self, now: f64) {
        self.next_event_time = now;
        self.state = SchedulerState::Scheduling;
    }

    /// Nothing is scheduled after this; already-queued events still play.
    pub fn stop(&mut self) {
        self.state = SchedulerState::Idle;
    }

    /// One wake: schedule everything before `now + lookahead`.
    /// Returns how many events were placed.
    pub fn pump(&mut self, now: f64) -> usize {
        let mut placed = 0;
        while self.is_running() && self.next_event_time < now + self.lookahead {
            if self.source.is_finished() {
                self.stop();
                break;
            }
            self.source.schedule(self.next_event_time);
            self.next_event_time += self.source.interval().max(MIN_INTERVAL);
            placed += 1;
        }
        if self.source.is_finished() {
            self.stop();
        }
        placed
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

/// A [`Scheduler`] driven from its own thread by a periodic tick.
pub struct SchedulerLoop<S> {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<S>>,
}

impl<S: ScheduledSource + 'static> SchedulerLoop<S> {
    pub fn spawn(source: S, link: AudioLink, config: &EngineConfig) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let interval = config.schedule_interval();
        let lookahead = config.lookahead_secs();

        let handle = thread::Builder::new()
            .name("fretlab-scheduler".into())
            .spawn(move || run(Scheduler::new(source, lookahead), link, interval, stop_rx))?;

        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// True until the source finishes or `stop` is called.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancels the next wake and hands the source back.
    pub fn stop(mut self) -> Option<S> {
        let _ = self.stop_tx.try_send(());
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(source) => Some(source),
            Err(_) => {
                log::error!("scheduler thread panicked");
                None
            }
        }
    }
}

impl<S> Drop for SchedulerLoop<S> {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run<S: ScheduledSource>(
    mut scheduler: Scheduler<S>,
    link: AudioLink,
    interval: Duration,
    stop_rx: Receiver<()>,
) -> S {
    let ticker = crossbeam_channel::tick(interval);
    scheduler.start(link.now());
    scheduler.pump(link.now());
    log::debug!("scheduler started, waking every {interval:?}");

    while scheduler.is_running() {
        crossbeam_channel::select! {
            recv(stop_rx) -> _ => break,
            recv(ticker) -> _ => {
                scheduler.pump(link.now());
            }
        }
    }

    scheduler.stop();
    log::debug!("scheduler stopped");
    scheduler.into_source()
}

// ── Metronome ─────────────────────────────────────────────────────

const CLICK_FREQ: f64 = 1000.0;
const ACCENT_FREQ: f64 = 1500.0;
const CLICK_LENGTH: f64 = 0.03;

/// A click on every beat, higher on the first beat of each bar.
pub struct Metronome {
    link: AudioLink,
    tempo: Tempo,
    beats_per_bar: u32,
    volume: f64,
    beat: u64,
    max_beats: Option<u64>,
}

impl Metronome {
    pub fn new(link: AudioLink, tempo: Tempo, beats_per_bar: u32) -> Self {
        Self {
            link,
            tempo,
            beats_per_bar: beats_per_bar.max(1),
            volume: 0.5,
            beat: 0,
            max_beats: None,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }

    /// Count-in style: finish after `beats` clicks.
    pub fn with_max_beats(mut self, beats: u64) -> Self {
        self.max_beats = Some(beats);
        self
    }

    pub fn beats_played(&self) -> u64 {
        self.beat
    }

    fn is_downbeat(&self) -> bool {
        self.beat % u64::from(self.beats_per_bar) == 0
    }
}

impl ScheduledSource for Metronome {
    fn schedule(&mut self, time: f64) {
        let frequency = if self.is_downbeat() { ACCENT_FREQ } else { CLICK_FREQ };
        self.link.send(AudioCommand::StartVoice(VoiceSpec {
            id: next_voice_id(),
            waveform: Waveform::Sine,
            frequency,
            start_time: time,
            duration: Some(CLICK_LENGTH),
            envelope: Envelope::new(0.001, 0.02, 0.0, 0.01),
            volume: self.volume,
            filter: None,
        }));
        self.beat += 1;
    }

    fn interval(&self) -> f64 {
        seconds_per_beat(self.tempo.bpm())
    }

    fn is_finished(&self) -> bool {
        self.max_beats.is_some_and(|max| self.beat >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::offline;

    struct Recorder {
        times: Vec<f64>,
        interval: f64,
        limit: Option<usize>,
    }

    impl Recorder {
        fn new(interval: f64) -> Self {
            Self { times: Vec::new(), interval, limit: None }
        }
    }

    impl ScheduledSource for Recorder {
        fn schedule(&mut self, time: f64) {
            self.times.push(time);
        }

        fn interval(&self) -> f64 {
            self.interval
        }

        fn is_finished(&self) -> bool {
            self.limit.is_some_and(|l| self.times.len() >= l)
        }
    }

    #[test]
    fn test_idle_scheduler_places_nothing() {
        let mut s = Scheduler::new(Recorder::new(0.25), 0.1);
        assert_eq!(s.pump(10.0), 0);
        assert_eq!(s.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_pump_fills_the_lookahead_window() {
        let mut s = Scheduler::new(Recorder::new(0.25), 0.1);
        s.start(0.0);
        assert_eq!(s.pump(0.0), 1);
        assert_eq!(s.pump(0.1), 0);
        assert_eq!(s.pump(0.2), 1);
        assert_eq!(s.pump(0.3), 0);
        assert_eq!(s.source().times, vec![0.0, 0.25]);
    }

    #[test]
    fn test_late_wake_keeps_absolute_grid() {
        let mut s = Scheduler::new(Recorder::new(0.25), 0.1);
        s.start(2.0);
        s.pump(2.0);
        // the thread slept far too long
        s.pump(2.9);
        assert_eq!(s.source().times, vec![2.0, 2.25, 2.5, 2.75]);
        assert_eq!(s.next_event_time(), 3.0);
    }

    #[test]
    fn test_stop_prevents_further_events() {
        let mut s = Scheduler::new(Recorder::new(0.25), 0.1);
        s.start(0.0);
        s.pump(0.0);
        s.stop();
        assert_eq!(s.pump(5.0), 0);
        assert_eq!(s.into_source().times.len(), 1);
    }

    #[test]
    fn test_finished_source_stops_scheduler() {
        let mut rec = Recorder::new(0.1);
        rec.limit = Some(3);
        let mut s = Scheduler::new(rec, 1.0);
        s.start(0.0);
        assert_eq!(s.pump(0.0), 3);
        assert!(!s.is_running());
    }

    #[test]
    fn test_loop_thread_returns_source() {
        let off = offline(1_000);
        let config = EngineConfig::default();
        let sched = SchedulerLoop::spawn(Recorder::new(0.25), off.link.clone(), &config).unwrap();
        // the offline clock never moves, so only the first event is due
        let rec = sched.stop().unwrap();
        assert_eq!(rec.times, vec![0.0]);
    }

    #[test]
    fn test_metronome_accents_downbeats() {
        let mut off = offline(8_000);
        let tempo = Tempo::new(120.0);
        let mut s = Scheduler::new(Metronome::new(off.link.clone(), tempo.clone(), 4).with_max_beats(8), 0.1);
        s.start(0.0);
        let mut t = 0.0;
        while s.is_running() {
            s.pump(t);
            t += 0.025;
        }
        assert_eq!(s.source().beats_played(), 8);
        assert!((s.next_event_time() - 4.0).abs() < 1e-9);
        off.render_seconds(0.01);
        assert!(off.engine.active_voices() >= 1);
    }

    #[test]
    fn test_metronome_follows_tempo_changes() {
        let off = offline(1_000);
        let tempo = Tempo::new(60.0);
        let mut s = Scheduler::new(Metronome::new(off.link.clone(), tempo.clone(), 4), 0.1);
        s.start(0.0);
        s.pump(0.0);
        assert_eq!(s.next_event_time(), 1.0);
        tempo.set_bpm(120.0);
        s.pump(0.95);
        assert_eq!(s.next_event_time(), 1.5);
    }
}
