// Everything about a jam we want back after a restart. Audio (loop layers)
// is not stored here; export those as WAV.

use serde::{Deserialize, Serialize};

use crate::audio::effect::{DEFAULT_DRY_WET, DEFAULT_PRESET};
use crate::config::EngineConfig;
use crate::looper::Looper;
use crate::sequencer::{default_catalog, Part, PartId, Sequencer};
use crate::shared::clamp_bpm;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub bpm: f64,
    pub bars: u32,
    pub beats_per_bar: u32,
    pub master_volume: f32,
    pub timbre: String,
    pub effects_preset: String,
    pub dry_wet: f32,
    pub loop_volume: f32,
    pub parts: Vec<Part>,
    pub sequence: Vec<PartId>,
    pub loop_sequence: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl SessionState {
    pub fn from_config(config: &EngineConfig) -> Self {
        let defaults = Sequencer::default();
        Self {
            bpm: config.default_bpm,
            bars: config.default_bars,
            beats_per_bar: config.default_beats_per_bar,
            master_volume: config.master_volume,
            timbre: config.default_timbre.clone(),
            effects_preset: DEFAULT_PRESET.to_string(),
            dry_wet: DEFAULT_DRY_WET,
            loop_volume: 1.0,
            parts: default_catalog(),
            sequence: defaults.sequence().to_vec(),
            loop_sequence: true,
        }
    }

    // the sequence is filtered against the catalog on the way in, so a
    // hand-edited file can't break the invariant
    pub fn sequencer(&self) -> Sequencer {
        let mut seq = Sequencer::new(self.parts.clone());
        seq.set_sequence(&self.sequence);
        seq.set_loop(self.loop_sequence);
        seq.set_beats_per_bar(self.beats_per_bar);
        seq
    }

    pub fn capture_sequencer(&mut self, seq: &Sequencer) {
        self.parts = seq.parts().to_vec();
        for part in &mut self.parts {
            part.active = false;
        }
        self.sequence = seq.sequence().to_vec();
        self.loop_sequence = seq.loop_enabled();
    }

    pub fn apply_to_looper(&self, looper: &mut Looper) {
        looper.set_bpm(self.bpm);
        looper.set_bars(self.bars);
        looper.set_beats_per_bar(self.beats_per_bar);
        looper.set_volume(self.loop_volume);
    }

    pub fn capture_looper(&mut self, looper: &Looper) {
        self.bpm = looper.bpm();
        self.bars = looper.bars();
        self.beats_per_bar = looper.beats_per_bar();
        self.loop_volume = looper.volume();
    }

    /// Clamp anything a hand edit could have pushed out of range.
    pub fn sanitize(&mut self) {
        self.bpm = clamp_bpm(self.bpm);
        self.bars = self.bars.max(1);
        self.beats_per_bar = self.beats_per_bar.max(1);
        self.master_volume = self.master_volume.clamp(0.0, 1.0);
        self.dry_wet = self.dry_wet.clamp(0.0, 1.0);
        self.loop_volume = self.loop_volume.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::offline;

    #[test]
    fn test_sequencer_from_hand_edited_state() {
        let mut state = SessionState::default();
        state.sequence = vec![PartId(1), PartId(99), PartId(3)];
        state.loop_sequence = false;
        let seq = state.sequencer();
        assert_eq!(seq.sequence(), &[PartId(1), PartId(3)]);
        assert!(!seq.loop_enabled());
    }

    #[test]
    fn test_looper_settings_round_trip() {
        let off = offline(1_000);
        let mut looper = Looper::new(off.link.clone());
        let mut state = SessionState { bpm: 90.0, bars: 2, ..SessionState::default() };
        state.apply_to_looper(&mut looper);
        assert_eq!(looper.loop_duration(), 2.0 * 4.0 * 60.0 / 90.0);

        looper.set_bars(8);
        state.capture_looper(&looper);
        assert_eq!(state.bars, 8);
    }

    #[test]
    fn test_sanitize() {
        let mut state = SessionState { bpm: 9_000.0, bars: 0, dry_wet: -2.0, ..SessionState::default() };
        state.sanitize();
        assert_eq!(state.bpm, crate::shared::MAX_BPM);
        assert_eq!(state.bars, 1);
        assert_eq!(state.dry_wet, 0.0);
    }
}
