//! Song structure: a catalog of parts and an ordered sequence over it.
//!
//! The sequence only stores part ids and may repeat them. Every id in the
//! sequence refers to a part in the catalog; edits that would break that
//! are rejected or filtered.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::error::{SequencerError, SequencerResult};
use crate::scheduler::ScheduledSource;
use crate::shared::{bars_duration, Tempo, DEFAULT_BEATS_PER_BAR};
use crate::synth::Synthesizer;
use crate::theory::ChordSymbol;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartId(pub u32);

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub name: String,
    /// Chord symbols, one per bar, repeating when the part is longer.
    pub chords: Vec<String>,
    pub bars: u32,
    pub intensity: f32,
    pub drum_intensity: f32,
    pub bass_intensity: f32,
    #[serde(default)]
    pub active: bool,
}

impl Part {
    pub fn new(id: u32, name: &str, chords: &[&str], bars: u32, intensity: f32) -> Self {
        Self {
            id: PartId(id),
            name: name.to_string(),
            chords: chords.iter().map(|c| c.to_string()).collect(),
            bars,
            intensity: intensity.clamp(0.0, 1.0),
            drum_intensity: intensity.clamp(0.0, 1.0),
            bass_intensity: intensity.clamp(0.0, 1.0),
            active: false,
        }
    }

    pub fn duration(&self, beats_per_bar: u32, bpm: f64) -> f64 {
        bars_duration(self.bars, beats_per_bar, bpm)
    }

    /// The chord for `bar` (0-based), cycling through the list.
    pub fn chord_at_bar(&self, bar: u32) -> Option<&str> {
        if self.chords.is_empty() {
            return None;
        }
        Some(self.chords[bar as usize % self.chords.len()].as_str())
    }

    fn clamp_levels(&mut self) {
        self.intensity = self.intensity.clamp(0.0, 1.0);
        self.drum_intensity = self.drum_intensity.clamp(0.0, 1.0);
        self.bass_intensity = self.bass_intensity.clamp(0.0, 1.0);
    }
}

pub fn default_catalog() -> Vec<Part> {
    vec![
        Part::new(1, "Intro", &["C", "Am"], 4, 0.4),
        Part::new(2, "Verse", &["C", "G", "Am", "F"], 8, 0.6),
        Part::new(3, "Chorus", &["F", "G", "C", "Am"], 8, 0.9),
        Part::new(4, "Bridge", &["Dm", "Em", "F", "G"], 4, 0.7),
        Part::new(5, "Outro", &["F", "G", "C"], 4, 0.3),
    ]
}

fn default_sequence() -> Vec<PartId> {
    [1, 2, 3, 2, 3, 4, 3, 5].into_iter().map(PartId).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequencerState {
    Stopped,
    Playing,
}

/// Sent whenever the current slot changes.
#[derive(Clone, Debug, PartialEq)]
pub struct PartChange {
    pub index: usize,
    pub part: PartId,
}

pub struct Sequencer {
    parts: Vec<Part>,
    sequence: Vec<PartId>,
    current_index: usize,
    state: SequencerState,
    loop_enabled: bool,
    beats_per_bar: u32,
    listeners: Vec<Sender<PartChange>>,
}

impl Default for Sequencer {
    fn default() -> Self {
        let mut seq = Self::new(default_catalog());
        seq.set_sequence(&default_sequence());
        seq
    }
}

impl Sequencer {
    /// Parts with zero bars are left out of the catalog.
    pub fn new(parts: Vec<Part>) -> Self {
        let mut seq = Self {
            parts: Vec::with_capacity(parts.len()),
            sequence: Vec::new(),
            current_index: 0,
            state: SequencerState::Stopped,
            loop_enabled: true,
            beats_per_bar: DEFAULT_BEATS_PER_BAR,
            listeners: Vec::new(),
        };
        for part in parts {
            if let Err(e) = seq.add_part(part) {
                log::warn!("skipping part: {e}");
            }
        }
        seq
    }

    // ── Catalog ───────────────────────────────────────────────────

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn part(&self, id: PartId) -> Option<&Part> {
        self.parts.iter().find(|p| p.id == id)
    }

    /// Adds or replaces by id.
    pub fn add_part(&mut self, mut part: Part) -> SequencerResult {
        if part.bars == 0 {
            return Err(SequencerError::ZeroBars(part.id));
        }
        part.clamp_levels();
        match self.parts.iter_mut().find(|p| p.id == part.id) {
            Some(existing) => *existing = part,
            None => self.parts.push(part),
        }
        self.sync_active();
        Ok(())
    }

    /// Replaces an existing part; the sequence is untouched.
    pub fn update_part(&mut self, part: Part) -> SequencerResult {
        if self.part(part.id).is_none() {
            return Err(SequencerError::UnknownPart(part.id));
        }
        self.add_part(part)
    }

    /// Removes the part and every slot that referenced it.
    pub fn remove_part(&mut self, id: PartId) -> SequencerResult<Part> {
        let index = self
            .parts
            .iter()
            .position(|p| p.id == id)
            .ok_or(SequencerError::UnknownPart(id))?;
        let removed = self.parts.remove(index);
        let current = self.current_part_id();
        self.sequence.retain(|p| *p != id);
        self.reseat(current);
        Ok(removed)
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn set_beats_per_bar(&mut self, beats: u32) {
        self.beats_per_bar = beats.max(1);
    }

    // ── Sequence edits ────────────────────────────────────────────

    pub fn sequence(&self) -> &[PartId] {
        &self.sequence
    }

    /// Ids not in the catalog are dropped.
    pub fn set_sequence(&mut self, ids: &[PartId]) {
        let mut kept = Vec::with_capacity(ids.len());
        for &id in ids {
            if self.part(id).is_some() {
                kept.push(id);
            } else {
                log::warn!("set_sequence: dropping unknown part {id}");
            }
        }
        self.sequence = kept;
        self.current_index = 0;
        self.sync_active();
    }

    pub fn add_to_sequence(&mut self, id: PartId) -> SequencerResult {
        if self.part(id).is_none() {
            return Err(SequencerError::UnknownPart(id));
        }
        self.sequence.push(id);
        self.sync_active();
        Ok(())
    }

    pub fn remove_from_sequence(&mut self, index: usize) -> SequencerResult<PartId> {
        let len = self.sequence.len();
        if index >= len {
            return Err(SequencerError::IndexOutOfRange { index, len });
        }
        let removed = self.sequence.remove(index);
        if index < self.current_index {
            self.current_index -= 1;
        }
        self.current_index = self.current_index.min(self.sequence.len().saturating_sub(1));
        self.sync_active();
        Ok(removed)
    }

    /// Moves the slot at `from` so it ends up at `to`. The current slot
    /// follows its part.
    pub fn move_in_sequence(&mut self, from: usize, to: usize) -> SequencerResult {
        let len = self.sequence.len();
        for index in [from, to] {
            if index >= len {
                return Err(SequencerError::IndexOutOfRange { index, len });
            }
        }
        let id = self.sequence.remove(from);
        self.sequence.insert(to, id);
        self.current_index = if self.current_index == from {
            to
        } else if from < self.current_index && to >= self.current_index {
            self.current_index - 1
        } else if from > self.current_index && to <= self.current_index {
            self.current_index + 1
        } else {
            self.current_index
        };
        Ok(())
    }

    // after a structural edit, point at the first slot of `id` if it survived
    fn reseat(&mut self, id: Option<PartId>) {
        self.current_index = id
            .and_then(|id| self.sequence.iter().position(|p| *p == id))
            .unwrap_or(0);
        self.sync_active();
    }

    // ── Transport ─────────────────────────────────────────────────

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == SequencerState::Playing
    }

    /// Does nothing on an empty sequence.
    pub fn start(&mut self) {
        if self.sequence.is_empty() {
            log::warn!("sequencer: nothing to play");
            return;
        }
        self.state = SequencerState::Playing;
        self.notify();
    }

    pub fn stop(&mut self) {
        self.state = SequencerState::Stopped;
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    fn current_part_id(&self) -> Option<PartId> {
        self.sequence.get(self.current_index).copied()
    }

    pub fn current_part(&self) -> Option<&Part> {
        self.current_part_id().and_then(|id| self.part(id))
    }

    /// What `next_part` would move to.
    pub fn upcoming_part(&self) -> Option<&Part> {
        let next = self.current_index + 1;
        let index = if next < self.sequence.len() {
            next
        } else if self.loop_enabled {
            0
        } else {
            return None;
        };
        self.sequence.get(index).and_then(|id| self.part(*id))
    }

    /// Advances one slot. Past the end it wraps when looping, otherwise the
    /// sequencer stops and `None` is returned.
    pub fn next_part(&mut self) -> Option<&Part> {
        if self.sequence.is_empty() {
            self.stop();
            return None;
        }
        let next = self.current_index + 1;
        if next < self.sequence.len() {
            self.current_index = next;
        } else if self.loop_enabled {
            self.current_index = 0;
        } else {
            self.stop();
            return None;
        }
        self.sync_active();
        self.notify();
        self.current_part()
    }

    /// Goes back one slot, wrapping to the last.
    pub fn previous_part(&mut self) -> Option<&Part> {
        if self.sequence.is_empty() {
            return None;
        }
        self.current_index = match self.current_index {
            0 => self.sequence.len() - 1,
            i => i - 1,
        };
        self.sync_active();
        self.notify();
        self.current_part()
    }

    /// Jumps to the first slot that plays `id`. No-op if there is none.
    pub fn go_to_part(&mut self, id: PartId) -> bool {
        let Some(index) = self.sequence.iter().position(|p| *p == id) else {
            return false;
        };
        self.current_index = index;
        self.sync_active();
        self.notify();
        true
    }

    // ── Timing ────────────────────────────────────────────────────

    pub fn total_duration(&self, bpm: f64) -> f64 {
        self.sequence
            .iter()
            .filter_map(|id| self.part(*id))
            .map(|p| p.duration(self.beats_per_bar, bpm))
            .sum()
    }

    /// The slot sounding `elapsed` seconds into the sequence, with the
    /// seconds already played of it. A time on a boundary belongs to the
    /// slot that starts there, at offset zero. Past the end this wraps when
    /// looping and is `None` otherwise.
    pub fn part_at_time(&self, elapsed: f64, bpm: f64) -> Option<(usize, &Part, f64)> {
        let total = self.total_duration(bpm);
        if total <= 0.0 || elapsed < 0.0 {
            return None;
        }
        let t = if elapsed >= total {
            if !self.loop_enabled {
                return None;
            }
            elapsed % total
        } else {
            elapsed
        };

        let mut start = 0.0;
        for (index, id) in self.sequence.iter().enumerate() {
            let Some(part) = self.part(*id) else {
                continue;
            };
            let end = start + part.duration(self.beats_per_bar, bpm);
            if t < end {
                return Some((index, part, t - start));
            }
            start = end;
        }
        None
    }

    // ── Notification ──────────────────────────────────────────────

    /// A queue that receives every part change from now on.
    pub fn subscribe(&mut self) -> Receiver<PartChange> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.listeners.push(tx);
        rx
    }

    fn notify(&mut self) {
        let Some(part) = self.current_part_id() else {
            return;
        };
        let change = PartChange {
            index: self.current_index,
            part,
        };
        log::debug!("sequencer: slot {} → part {}", change.index, change.part);
        // listeners that went away are dropped
        self.listeners.retain(|tx| tx.send(change.clone()).is_ok());
    }

    fn sync_active(&mut self) {
        let current = self.current_part_id();
        for part in &mut self.parts {
            part.active = Some(part.id) == current;
        }
    }
}

// ── Playback ──────────────────────────────────────────────────────

pub const DEFAULT_CHORD_OCTAVE: i32 = 3;

fn read(seq: &RwLock<Sequencer>) -> RwLockReadGuard<'_, Sequencer> {
    seq.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(seq: &RwLock<Sequencer>) -> RwLockWriteGuard<'_, Sequencer> {
    seq.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Plays one chord per bar of the current part and moves the sequencer on
/// at each part boundary. Runs under a [`Scheduler`](crate::scheduler::Scheduler).
pub struct SequencePlayer {
    sequencer: Arc<RwLock<Sequencer>>,
    synth: Synthesizer,
    tempo: Tempo,
    timbre: String,
    octave: i32,
    bar: u32,
}

impl SequencePlayer {
    pub fn new(sequencer: Arc<RwLock<Sequencer>>, synth: Synthesizer, tempo: Tempo, timbre: &str) -> Self {
        Self {
            sequencer,
            synth,
            tempo,
            timbre: timbre.to_string(),
            octave: DEFAULT_CHORD_OCTAVE,
            bar: 0,
        }
    }

    pub fn with_octave(mut self, octave: i32) -> Self {
        self.octave = octave;
        self
    }

    pub fn synth(&mut self) -> &mut Synthesizer {
        &mut self.synth
    }

    pub fn into_synth(self) -> Synthesizer {
        self.synth
    }

    /// Bar within the current part.
    pub fn bar(&self) -> u32 {
        self.bar
    }

    fn bar_seconds(&self) -> f64 {
        let beats = read(&self.sequencer).beats_per_bar();
        bars_duration(1, beats, self.tempo.bpm())
    }
}

impl ScheduledSource for SequencePlayer {
    fn schedule(&mut self, time: f64) {
        let bar_seconds = self.bar_seconds();
        let (chord, volume, bars) = {
            let seq = read(&self.sequencer);
            if !seq.is_playing() {
                return;
            }
            let Some(part) = seq.current_part() else {
                return;
            };
            (part.chord_at_bar(self.bar).map(str::to_string), part.intensity, part.bars)
        };

        match chord.as_deref().map(|c| (c, ChordSymbol::parse(c))) {
            Some((_, Some(symbol))) => {
                self.synth.play_chord_at(
                    symbol.root_name(),
                    symbol.chord.name(),
                    self.octave,
                    bar_seconds * 0.95,
                    &self.timbre,
                    f64::from(volume),
                    time,
                );
            }
            Some((raw, None)) => log::warn!("sequence player: cannot parse chord {raw:?}, bar skipped"),
            None => {}
        }

        self.bar += 1;
        if self.bar >= bars {
            self.bar = 0;
            write(&self.sequencer).next_part();
        }
    }

    fn interval(&self) -> f64 {
        self.bar_seconds()
    }

    fn is_finished(&self) -> bool {
        !read(&self.sequencer).is_playing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::offline;
    use crate::scheduler::Scheduler;

    fn ids(raw: &[u32]) -> Vec<PartId> {
        raw.iter().copied().map(PartId).collect()
    }

    fn three_parts() -> Sequencer {
        Sequencer::new(vec![
            Part::new(1, "A", &["C"], 2, 0.5),
            Part::new(2, "B", &["G"], 4, 0.5),
            Part::new(3, "C", &["Am"], 1, 0.5),
        ])
    }

    #[test]
    fn test_set_sequence_drops_unknown_ids() {
        let mut seq = three_parts();
        seq.set_sequence(&ids(&[1, 9, 2, 1, 42]));
        assert_eq!(seq.sequence(), ids(&[1, 2, 1]).as_slice());
    }

    #[test]
    fn test_total_duration() {
        let mut seq = Sequencer::default();
        seq.set_sequence(&ids(&[1, 2, 3, 2, 3]));
        // bars 4 + 8 + 8 + 8 + 8 = 36, at 100 bpm a bar is 2.4 s
        assert!((seq.total_duration(100.0) - 86.4).abs() < 1e-9);
    }

    #[test]
    fn test_part_at_time_boundaries() {
        let mut seq = three_parts();
        seq.set_sequence(&ids(&[1, 2, 3]));
        // 120 bpm: part 1 is 4 s, part 2 is 8 s, part 3 is 2 s
        assert_eq!(seq.part_at_time(0.0, 120.0).map(|(i, _, o)| (i, o)), Some((0, 0.0)));
        let (i, _, offset) = seq.part_at_time(3.999, 120.0).unwrap();
        assert_eq!(i, 0);
        assert!((offset - 3.999).abs() < 1e-9);
        assert_eq!(seq.part_at_time(4.0, 120.0).map(|(i, _, o)| (i, o)), Some((1, 0.0)));
        let (i, _, offset) = seq.part_at_time(9.5, 120.0).unwrap();
        assert_eq!(i, 1);
        assert!((offset - 5.5).abs() < 1e-9);
        assert_eq!(
            seq.part_at_time(12.0, 120.0).map(|(i, p, o)| (i, p.id, o)),
            Some((2, PartId(3), 0.0))
        );
        // wraps when looping
        let (i, _, offset) = seq.part_at_time(15.0, 120.0).unwrap();
        assert_eq!(i, 0);
        assert!((offset - 1.0).abs() < 1e-9);
        assert_eq!(seq.part_at_time(14.0, 120.0).map(|(i, _, o)| (i, o)), Some((0, 0.0)));
        seq.set_loop(false);
        assert!(seq.part_at_time(14.0, 120.0).is_none());
        assert!(seq.part_at_time(-1.0, 120.0).is_none());
    }

    #[test]
    fn test_next_part_loops_or_stops() {
        let mut seq = three_parts();
        seq.set_sequence(&ids(&[1, 2]));
        seq.start();
        assert_eq!(seq.next_part().map(|p| p.id), Some(PartId(2)));
        assert_eq!(seq.next_part().map(|p| p.id), Some(PartId(1)));
        assert!(seq.is_playing());

        seq.set_loop(false);
        seq.next_part();
        assert!(seq.upcoming_part().is_none());
        assert!(seq.next_part().is_none());
        assert_eq!(seq.state(), SequencerState::Stopped);
    }

    #[test]
    fn test_previous_part_wraps() {
        let mut seq = three_parts();
        seq.set_sequence(&ids(&[1, 2, 3]));
        assert_eq!(seq.previous_part().map(|p| p.id), Some(PartId(3)));
        assert_eq!(seq.current_index(), 2);
    }

    #[test]
    fn test_go_to_part_picks_first_slot() {
        let mut seq = three_parts();
        seq.set_sequence(&ids(&[1, 2, 3, 2]));
        assert!(seq.go_to_part(PartId(2)));
        assert_eq!(seq.current_index(), 1);
        assert!(!seq.go_to_part(PartId(7)));
        assert_eq!(seq.current_index(), 1);
        assert!(seq.part(PartId(2)).unwrap().active);
        assert!(!seq.part(PartId(1)).unwrap().active);
    }

    #[test]
    fn test_listener_sees_changes() {
        let mut seq = three_parts();
        seq.set_sequence(&ids(&[1, 2, 3]));
        let rx = seq.subscribe();
        seq.start();
        seq.next_part();
        let changes: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            changes,
            vec![
                PartChange { index: 0, part: PartId(1) },
                PartChange { index: 1, part: PartId(2) },
            ]
        );
    }

    #[test]
    fn test_sequence_edits_keep_catalog_invariant() {
        let mut seq = three_parts();
        seq.set_sequence(&ids(&[1, 2]));
        assert_eq!(seq.add_to_sequence(PartId(9)), Err(SequencerError::UnknownPart(PartId(9))));
        seq.add_to_sequence(PartId(3)).unwrap();
        assert_eq!(
            seq.remove_from_sequence(5),
            Err(SequencerError::IndexOutOfRange { index: 5, len: 3 })
        );
        seq.move_in_sequence(2, 0).unwrap();
        assert_eq!(seq.sequence(), ids(&[3, 1, 2]).as_slice());
        assert_eq!(seq.remove_from_sequence(0), Ok(PartId(3)));

        seq.remove_part(PartId(1)).unwrap();
        assert_eq!(seq.sequence(), ids(&[2]).as_slice());
        assert!(seq.sequence().iter().all(|id| seq.part(*id).is_some()));
    }

    #[test]
    fn test_move_keeps_current_slot() {
        let mut seq = three_parts();
        seq.set_sequence(&ids(&[1, 2, 3]));
        seq.go_to_part(PartId(2));
        seq.move_in_sequence(0, 2).unwrap();
        assert_eq!(seq.sequence(), ids(&[2, 3, 1]).as_slice());
        assert_eq!(seq.current_part().map(|p| p.id), Some(PartId(2)));
    }

    #[test]
    fn test_update_part_validates() {
        let mut seq = three_parts();
        let mut b = seq.part(PartId(2)).unwrap().clone();
        b.bars = 0;
        assert_eq!(seq.update_part(b.clone()), Err(SequencerError::ZeroBars(PartId(2))));
        b.bars = 6;
        b.intensity = 3.0;
        seq.update_part(b).unwrap();
        assert_eq!(seq.part(PartId(2)).unwrap().bars, 6);
        assert_eq!(seq.part(PartId(2)).unwrap().intensity, 1.0);
        let ghost = Part::new(77, "Ghost", &[], 1, 0.1);
        assert_eq!(seq.update_part(ghost), Err(SequencerError::UnknownPart(PartId(77))));
    }

    #[test]
    fn test_player_walks_bars_and_parts() {
        let off = offline(8_000);
        let mut seq = three_parts();
        seq.set_sequence(&ids(&[1, 3]));
        seq.set_loop(false);
        seq.start();
        let seq = Arc::new(RwLock::new(seq));

        let tempo = Tempo::new(240.0);
        let player = SequencePlayer::new(seq.clone(), Synthesizer::new(off.link.clone()), tempo, "piano");
        let mut sched = Scheduler::new(player, 0.1);
        sched.start(0.0);
        let mut t = 0.0;
        while sched.is_running() && t < 10.0 {
            sched.pump(t);
            t += 0.025;
        }
        // 2 bars of part 1, 1 bar of part 3, 1 s per bar
        assert!(!sched.is_running());
        assert!((sched.next_event_time() - 3.0).abs() < 1e-9);
        assert!(!read(&seq).is_playing());
    }
}
