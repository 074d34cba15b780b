//! Note and chord playback on top of the engine's oscillator voices.
//!
//! The synthesizer never renders audio itself. Each call resolves names to
//! frequencies and a [`Timbre`], builds one [`VoiceSpec`] per pitch and sends
//! it to the engine with an absolute start time. A small registry remembers
//! which voices are still sounding so held notes can be released and the
//! caller can ask what is active; finished entries are pruned lazily.

mod timbre;

use std::collections::BTreeMap;

use crate::audio::{next_voice_id, AudioLink, EffectKind, EffectParam, EffectsPreset, VoiceId, VoiceSpec};
use crate::audio_api::{AudioCommand, EffectsCommand};
use crate::shared::Fallback;
use crate::theory::{self, ChordType};

pub use timbre::{Timbre, TIMBRES};

pub const DEFAULT_TIMBRE: &str = "piano";
/// Notes shorter than this are stretched so every voice has a positive lifetime.
pub const MIN_NOTE_DURATION: f64 = 0.01;
/// MIDI-style bend range, in semitones either way.
pub const PITCH_BEND_RANGE: f32 = 2.0;

/// What a play call put on the engine's timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct Scheduled {
    pub voice_ids: Vec<VoiceId>,
    /// Pitch of each voice, in the same order as `voice_ids`.
    pub frequencies: Vec<f64>,
    pub start_time: f64,
    /// When the last voice falls silent; `None` for held notes.
    pub stop_time: Option<f64>,
    /// Every lookup that fell back to a default.
    pub fallbacks: Vec<Fallback>,
}

impl Scheduled {
    pub fn is_exact(&self) -> bool {
        self.fallbacks.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
struct ActiveVoice {
    stop_time: Option<f64>,
    release: f64,
}

pub struct Synthesizer {
    link: AudioLink,
    voices: BTreeMap<VoiceId, ActiveVoice>,
    sustain: bool,
    sustained: Vec<VoiceId>,
    master_volume: f32,
    pan: f32,
    pitch_bend: f32,
}

impl Synthesizer {
    pub fn new(link: AudioLink) -> Self {
        Self {
            link,
            voices: BTreeMap::new(),
            sustain: false,
            sustained: Vec::new(),
            master_volume: crate::audio::mix_bus::DEFAULT_MASTER_VOLUME,
            pan: 0.0,
            pitch_bend: 0.0,
        }
    }

    pub fn link(&self) -> &AudioLink {
        &self.link
    }

    pub fn now(&self) -> f64 {
        self.link.now()
    }

    // ── One-shot notes ────────────────────────────────────────────

    pub fn play_note(&mut self, note: &str, octave: i32, duration: f64, timbre: &str, volume: f64) -> Scheduled {
        let start = self.link.now();
        self.play_note_at(note, octave, duration, timbre, volume, start)
    }

    pub fn play_note_at(
        &mut self,
        note: &str,
        octave: i32,
        duration: f64,
        timbre: &str,
        volume: f64,
        start_time: f64,
    ) -> Scheduled {
        let mut fallbacks = Vec::new();
        let frequency = theory::note_frequency(note, octave);
        if frequency.is_fallback() {
            fallbacks.push(Fallback::Note(note.to_string()));
        }
        let timbre = self.resolve_timbre(timbre, &mut fallbacks);
        self.schedule(&[frequency.value()], start_time, Some(duration), timbre, volume, fallbacks)
    }

    pub fn play_chord(
        &mut self,
        root: &str,
        chord_type: &str,
        octave: i32,
        duration: f64,
        timbre: &str,
        volume: f64,
    ) -> Scheduled {
        let start = self.link.now();
        self.play_chord_at(root, chord_type, octave, duration, timbre, volume, start)
    }

    /// One voice per chord interval, all starting at `start_time`.
    #[allow(clippy::too_many_arguments)]
    pub fn play_chord_at(
        &mut self,
        root: &str,
        chord_type: &str,
        octave: i32,
        duration: f64,
        timbre: &str,
        volume: f64,
        start_time: f64,
    ) -> Scheduled {
        let mut fallbacks = Vec::new();
        let root_freq = theory::note_frequency(root, octave);
        if root_freq.is_fallback() {
            fallbacks.push(Fallback::Note(root.to_string()));
        }
        let chord = ChordType::lookup(chord_type);
        if chord.is_fallback() {
            fallbacks.push(Fallback::Chord(chord_type.to_string()));
        }
        let timbre = self.resolve_timbre(timbre, &mut fallbacks);
        let freqs: Vec<f64> = chord
            .value()
            .intervals()
            .iter()
            .map(|&i| theory::transpose(root_freq.value(), i))
            .collect();
        self.schedule(&freqs, start_time, Some(duration), timbre, volume, fallbacks)
    }

    // ── Held notes ────────────────────────────────────────────────

    /// Starts a voice that sounds until [`note_off`](Self::note_off).
    pub fn note_on(&mut self, note: &str, octave: i32, timbre: &str, volume: f64) -> Scheduled {
        let mut fallbacks = Vec::new();
        let frequency = theory::note_frequency(note, octave);
        if frequency.is_fallback() {
            fallbacks.push(Fallback::Note(note.to_string()));
        }
        let timbre = self.resolve_timbre(timbre, &mut fallbacks);
        let start = self.link.now();
        self.schedule(&[frequency.value()], start, None, timbre, volume, fallbacks)
    }

    /// Releases a held voice, or parks it while the sustain pedal is down.
    /// Unknown or already-released ids are ignored.
    pub fn note_off(&mut self, id: VoiceId) {
        if self.voices.get(&id).is_none_or(|v| v.stop_time.is_some()) {
            return;
        }
        if self.sustain {
            if !self.sustained.contains(&id) {
                self.sustained.push(id);
            }
            return;
        }
        self.release(id);
    }

    fn release(&mut self, id: VoiceId) {
        let now = self.link.now();
        if let Some(voice) = self.voices.get_mut(&id) {
            voice.stop_time = Some(now + voice.release);
            self.link.send(AudioCommand::ReleaseVoice { id, at: now });
        }
    }

    pub fn set_sustain(&mut self, on: bool) {
        self.sustain = on;
        if !on {
            for id in std::mem::take(&mut self.sustained) {
                self.release(id);
            }
        }
    }

    pub fn sustain(&self) -> bool {
        self.sustain
    }

    /// Cuts one voice immediately. Stopping a finished voice is harmless.
    pub fn stop_note(&mut self, id: VoiceId) {
        self.voices.remove(&id);
        self.sustained.retain(|v| *v != id);
        self.link.send(AudioCommand::StopVoice(id));
    }

    /// Idempotent.
    pub fn stop_all(&mut self) {
        self.voices.clear();
        self.sustained.clear();
        self.link.send(AudioCommand::StopAllVoices);
    }

    // ── Master controls ───────────────────────────────────────────

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
        self.link.send(AudioCommand::SetMasterVolume(self.master_volume));
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
        self.link.send(AudioCommand::SetPan(self.pan));
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Bends every voice, clamped to the bend range.
    pub fn set_pitch_bend(&mut self, semitones: f32) {
        self.pitch_bend = semitones.clamp(-PITCH_BEND_RANGE, PITCH_BEND_RANGE);
        self.link.send(AudioCommand::SetPitchBend { semitones: self.pitch_bend });
    }

    pub fn pitch_bend(&self) -> f32 {
        self.pitch_bend
    }

    // ── Effects ───────────────────────────────────────────────────

    /// Returns the fallback when `name` is not a known preset.
    pub fn apply_effects_preset(&mut self, name: &str) -> Option<Fallback> {
        let preset = EffectsPreset::lookup(name);
        let fallback = preset.is_fallback().then(|| Fallback::EffectsPreset(name.to_string()));
        if fallback.is_some() {
            log::warn!("unknown effects preset {name:?}, using {}", preset.value().name);
        }
        self.link
            .send(AudioCommand::Effects(EffectsCommand::ApplyPreset(preset.value())));
        fallback
    }

    pub fn set_effect_parameter(&mut self, param: EffectParam) {
        self.link.send(AudioCommand::Effects(EffectsCommand::SetParameter(param)));
    }

    pub fn set_dry_wet_mix(&mut self, mix: f32) {
        self.link
            .send(AudioCommand::Effects(EffectsCommand::SetDryWet(mix.clamp(0.0, 1.0))));
    }

    pub fn set_effect_bypass(&mut self, kind: EffectKind, bypass: bool) {
        self.link
            .send(AudioCommand::Effects(EffectsCommand::SetBypass(kind, bypass)));
    }

    pub fn reset_effect(&mut self, kind: EffectKind) {
        self.link.send(AudioCommand::Effects(EffectsCommand::Reset(kind)));
    }

    pub fn set_effects_enabled(&mut self, enabled: bool) {
        self.link
            .send(AudioCommand::Effects(EffectsCommand::SetEnabled(enabled)));
    }

    // ── Registry ──────────────────────────────────────────────────

    /// Voices that have not yet reached their stop time.
    pub fn active_voices(&mut self) -> usize {
        self.prune();
        self.voices.len()
    }

    pub fn is_active(&mut self, id: VoiceId) -> bool {
        self.prune();
        self.voices.contains_key(&id)
    }

    fn prune(&mut self) {
        let now = self.link.now();
        self.voices.retain(|_, v| v.stop_time.is_none_or(|stop| stop > now));
    }

    fn resolve_timbre(&self, name: &str, fallbacks: &mut Vec<Fallback>) -> &'static Timbre {
        let timbre = Timbre::lookup(name);
        if timbre.is_fallback() {
            log::debug!("unknown timbre {name:?}, using {DEFAULT_TIMBRE}");
            fallbacks.push(Fallback::Timbre(name.to_string()));
        }
        timbre.value()
    }

    fn schedule(
        &mut self,
        frequencies: &[f64],
        start_time: f64,
        duration: Option<f64>,
        timbre: &'static Timbre,
        volume: f64,
        fallbacks: Vec<Fallback>,
    ) -> Scheduled {
        self.prune();
        let start_time = start_time.max(0.0);
        let duration = duration.map(|d| if d.is_finite() { d.max(MIN_NOTE_DURATION) } else { MIN_NOTE_DURATION });
        let envelope = timbre.envelope();
        let stop_time = duration.map(|d| start_time + envelope.lifetime(d));
        let gain = volume.clamp(0.0, 1.0) * timbre.volume;

        let mut voice_ids = Vec::with_capacity(frequencies.len());
        let mut sent = Vec::with_capacity(frequencies.len());
        for &frequency in frequencies {
            let id = next_voice_id();
            let spec = VoiceSpec {
                id,
                waveform: timbre.waveform,
                frequency,
                start_time,
                duration,
                envelope,
                volume: gain,
                filter: Some(timbre.filter()),
            };
            if self.link.send(AudioCommand::StartVoice(spec)) {
                self.voices.insert(id, ActiveVoice { stop_time, release: envelope.release });
                voice_ids.push(id);
                sent.push(frequency);
            }
        }

        Scheduled {
            voice_ids,
            frequencies: sent,
            start_time,
            stop_time,
            fallbacks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::offline;

    #[test]
    fn test_play_note_lifetime() {
        let off = offline(48_000);
        let mut synth = Synthesizer::new(off.link.clone());
        let s = synth.play_note("C", 4, 1.0, "piano", 0.3);
        assert!(s.is_exact());
        assert_eq!(s.voice_ids.len(), 1);
        let piano = Timbre::lookup("piano").value();
        assert_eq!(s.stop_time, Some(s.start_time + 1.0 + piano.release));
        assert_eq!(synth.active_voices(), 1);
    }

    #[test]
    fn test_play_note_reaches_engine() {
        let mut off = offline(48_000);
        let mut synth = Synthesizer::new(off.link.clone());
        synth.play_note("C", 4, 1.0, "piano", 0.3);
        let out = off.render_seconds(0.1);
        assert_eq!(off.engine.active_voices(), 1);
        assert!(out.iter().any(|f| f.peak() > 0.0));
    }

    #[test]
    fn test_chords_schedule_one_voice_per_interval() {
        let mut off = offline(48_000);
        let mut synth = Synthesizer::new(off.link.clone());
        // A3
        let root = 220.0;
        for chord in ChordType::ALL {
            let s = synth.play_chord_at("A", chord.name(), 3, 0.5, "organ", 0.5, 1.0);
            assert_eq!(s.voice_ids.len(), chord.intervals().len(), "{chord:?}");
            assert_eq!(s.start_time, 1.0);
            assert!(s.is_exact());

            let expected: Vec<f64> = chord
                .intervals()
                .iter()
                .map(|&i| root * 2f64.powf(f64::from(i) / 12.0))
                .collect();
            assert_eq!(s.frequencies.len(), expected.len());
            for (got, want) in s.frequencies.iter().zip(&expected) {
                assert!((got - want).abs() < 1e-6, "{chord:?}: {got} != {want}");
            }

            // and the engine received exactly those pitches
            off.render_seconds(0.001);
            let mut heard = off.engine.voice_frequencies();
            heard.sort_by(f64::total_cmp);
            let mut sent = s.frequencies.clone();
            sent.sort_by(f64::total_cmp);
            assert_eq!(heard, sent, "{chord:?}");

            synth.stop_all();
            off.render_seconds(0.001);
        }
    }

    #[test]
    fn test_fallbacks_are_reported() {
        let off = offline(48_000);
        let mut synth = Synthesizer::new(off.link.clone());
        let s = synth.play_chord("H", "weird", 4, 1.0, "kazoo", 0.5);
        assert_eq!(s.voice_ids.len(), 3);
        assert_eq!(
            s.fallbacks,
            vec![
                Fallback::Note("H".into()),
                Fallback::Chord("weird".into()),
                Fallback::Timbre("kazoo".into()),
            ]
        );
    }

    #[test]
    fn test_stop_all_is_idempotent() {
        let mut off = offline(48_000);
        let mut synth = Synthesizer::new(off.link.clone());
        synth.play_chord("C", "major", 4, 5.0, "piano", 0.5);
        off.render_seconds(0.01);
        assert_eq!(off.engine.active_voices(), 3);
        synth.stop_all();
        synth.stop_all();
        off.render_seconds(0.01);
        assert_eq!(off.engine.active_voices(), 0);
        assert_eq!(synth.active_voices(), 0);
        synth.stop_all();
        assert_eq!(synth.active_voices(), 0);
    }

    #[test]
    fn test_finished_voices_are_pruned() {
        let mut off = offline(48_000);
        let mut synth = Synthesizer::new(off.link.clone());
        synth.play_note("E", 4, 0.05, "organ", 0.5);
        assert_eq!(synth.active_voices(), 1);
        // 0.05 hold + 0.1 release
        off.render_seconds(0.2);
        assert_eq!(synth.active_voices(), 0);
        assert_eq!(off.engine.active_voices(), 0);
    }

    #[test]
    fn test_zero_duration_is_stretched() {
        let off = offline(48_000);
        let mut synth = Synthesizer::new(off.link.clone());
        let s = synth.play_note("G", 4, 0.0, "bell", 0.5);
        let stop = s.stop_time.unwrap();
        assert!(stop > s.start_time);
    }

    #[test]
    fn test_sustain_defers_note_off() {
        let mut off = offline(48_000);
        let mut synth = Synthesizer::new(off.link.clone());
        let held = synth.note_on("A", 4, "organ", 0.5);
        let id = held.voice_ids[0];
        assert_eq!(held.stop_time, None);

        synth.set_sustain(true);
        synth.note_off(id);
        off.render_seconds(0.5);
        assert!(synth.is_active(id));
        assert_eq!(off.engine.active_voices(), 1);

        synth.set_sustain(false);
        off.render_seconds(0.5);
        assert!(!synth.is_active(id));
        assert_eq!(off.engine.active_voices(), 0);
    }

    #[test]
    fn test_master_controls_clamp() {
        let mut off = offline(48_000);
        let mut synth = Synthesizer::new(off.link.clone());
        synth.set_master_volume(3.0);
        assert_eq!(synth.master_volume(), 1.0);
        synth.set_master_volume(-1.0);
        off.render_seconds(0.01);
        assert_eq!(off.engine.bus().master_volume(), 0.0);
        synth.set_pitch_bend(7.0);
        assert_eq!(synth.pitch_bend(), PITCH_BEND_RANGE);
    }

    #[test]
    fn test_unknown_effects_preset_falls_back() {
        let mut off = offline(48_000);
        let mut synth = Synthesizer::new(off.link.clone());
        assert_eq!(synth.apply_effects_preset("hall"), None);
        assert_eq!(
            synth.apply_effects_preset("cathedral"),
            Some(Fallback::EffectsPreset("cathedral".into()))
        );
        synth.set_dry_wet_mix(4.0);
        off.render_seconds(0.01);
        assert_eq!(off.engine.bus().effects.dry_wet(), 1.0);
    }

    #[test]
    fn test_synth_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Synthesizer>();
    }
}
