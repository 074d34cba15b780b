//! MIDI messages and their mapping onto the synthesizer.
//!
//! Device I/O is not handled here; callers feed raw bytes from whatever
//! port they opened.

use std::collections::HashMap;

use crate::audio::VoiceId;
use crate::synth::{Synthesizer, PITCH_BEND_RANGE};
use crate::theory::midi_to_note;

pub const CC_VOLUME: u8 = 7;
pub const CC_PAN: u8 = 10;
pub const CC_SUSTAIN: u8 = 64;
pub const CC_ALL_NOTES_OFF: u8 = 123;

const PITCH_BEND_CENTER: u16 = 8192;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// 14-bit, 8192 is centre.
    PitchBend { channel: u8, value: u16 },
}

impl MidiMessage {
    /// Parses one channel message. Anything else (sysex, clock, running
    /// status, short input) gives `None`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        if status < 0x80 {
            return None;
        }
        let channel = status & 0x0F;
        let msg = match (status & 0xF0, data) {
            (0x80, [note, _, ..]) => MidiMessage::NoteOff { channel, note: note & 0x7F },
            // velocity zero is a note-off by convention
            (0x90, [note, 0, ..]) => MidiMessage::NoteOff { channel, note: note & 0x7F },
            (0x90, [note, velocity, ..]) => MidiMessage::NoteOn {
                channel,
                note: note & 0x7F,
                velocity: velocity & 0x7F,
            },
            (0xB0, [controller, value, ..]) => MidiMessage::ControlChange {
                channel,
                controller: controller & 0x7F,
                value: value & 0x7F,
            },
            (0xE0, [lsb, msb, ..]) => MidiMessage::PitchBend {
                channel,
                value: u16::from(lsb & 0x7F) | (u16::from(msb & 0x7F) << 7),
            },
            _ => return None,
        };
        Some(msg)
    }
}

/// Semitones for a 14-bit bend value.
pub fn bend_semitones(value: u16) -> f32 {
    (f32::from(value) - f32::from(PITCH_BEND_CENTER)) / f32::from(PITCH_BEND_CENTER) * PITCH_BEND_RANGE
}

/// Tracks held notes and turns messages into synthesizer calls.
pub struct MidiRouter {
    timbre: String,
    held: HashMap<(u8, u8), VoiceId>,
}

impl MidiRouter {
    pub fn new(timbre: &str) -> Self {
        Self {
            timbre: timbre.to_string(),
            held: HashMap::new(),
        }
    }

    pub fn set_timbre(&mut self, timbre: &str) {
        self.timbre = timbre.to_string();
    }

    pub fn held_notes(&self) -> usize {
        self.held.len()
    }

    pub fn route(&mut self, synth: &mut Synthesizer, msg: MidiMessage) {
        match msg {
            MidiMessage::NoteOn { channel, note, velocity } => {
                // retrigger: release the old voice first
                if let Some(old) = self.held.remove(&(channel, note)) {
                    synth.note_off(old);
                }
                let (pitch, octave) = midi_to_note(note);
                let volume = f64::from(velocity) / 127.0;
                let scheduled = synth.note_on(pitch.name(), octave, &self.timbre, volume);
                if let Some(&id) = scheduled.voice_ids.first() {
                    self.held.insert((channel, note), id);
                }
            }
            MidiMessage::NoteOff { channel, note } => {
                if let Some(id) = self.held.remove(&(channel, note)) {
                    synth.note_off(id);
                }
            }
            MidiMessage::ControlChange { controller, value, .. } => match controller {
                CC_VOLUME => synth.set_master_volume(f32::from(value) / 127.0),
                CC_PAN => synth.set_pan((f32::from(value) - 64.0) / 63.0),
                CC_SUSTAIN => synth.set_sustain(value >= 64),
                CC_ALL_NOTES_OFF => {
                    self.held.clear();
                    synth.stop_all();
                }
                other => log::trace!("midi: ignoring CC {other}"),
            },
            MidiMessage::PitchBend { value, .. } => synth.set_pitch_bend(bend_semitones(value)),
        }
    }

    /// Parses and routes raw bytes; unparseable input is ignored.
    pub fn route_bytes(&mut self, synth: &mut Synthesizer, bytes: &[u8]) {
        match MidiMessage::parse(bytes) {
            Some(msg) => self.route(synth, msg),
            None => log::trace!("midi: ignoring {bytes:02x?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::offline;

    #[test]
    fn test_parse_channel_messages() {
        assert_eq!(
            MidiMessage::parse(&[0x91, 60, 100]),
            Some(MidiMessage::NoteOn { channel: 1, note: 60, velocity: 100 })
        );
        assert_eq!(MidiMessage::parse(&[0x90, 60, 0]), Some(MidiMessage::NoteOff { channel: 0, note: 60 }));
        assert_eq!(MidiMessage::parse(&[0x80, 60, 40]), Some(MidiMessage::NoteOff { channel: 0, note: 60 }));
        assert_eq!(
            MidiMessage::parse(&[0xB0, 64, 127]),
            Some(MidiMessage::ControlChange { channel: 0, controller: 64, value: 127 })
        );
        assert_eq!(
            MidiMessage::parse(&[0xE0, 0x00, 0x40]),
            Some(MidiMessage::PitchBend { channel: 0, value: 8192 })
        );
        assert_eq!(MidiMessage::parse(&[0x90, 60]), None);
        assert_eq!(MidiMessage::parse(&[0xF8]), None);
        assert_eq!(MidiMessage::parse(&[0x3C, 0x40]), None);
        assert_eq!(MidiMessage::parse(&[]), None);
    }

    #[test]
    fn test_bend_range() {
        assert_eq!(bend_semitones(8192), 0.0);
        assert_eq!(bend_semitones(0), -2.0);
        assert!((bend_semitones(16383) - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_note_on_off_drives_voices() {
        let mut off = offline(48_000);
        let mut synth = Synthesizer::new(off.link.clone());
        let mut router = MidiRouter::new("organ");

        router.route_bytes(&mut synth, &[0x90, 69, 127]);
        assert_eq!(router.held_notes(), 1);
        off.render_seconds(0.05);
        assert_eq!(off.engine.active_voices(), 1);

        router.route_bytes(&mut synth, &[0x80, 69, 0]);
        assert_eq!(router.held_notes(), 0);
        off.render_seconds(0.5);
        assert_eq!(off.engine.active_voices(), 0);
    }

    #[test]
    fn test_controllers() {
        let off = offline(48_000);
        let mut synth = Synthesizer::new(off.link.clone());
        let mut router = MidiRouter::new("piano");

        router.route_bytes(&mut synth, &[0xB0, CC_VOLUME, 127]);
        assert_eq!(synth.master_volume(), 1.0);
        router.route_bytes(&mut synth, &[0xB0, CC_PAN, 0]);
        assert!((synth.pan() + 1.0).abs() < 0.02);
        router.route_bytes(&mut synth, &[0xB0, CC_SUSTAIN, 100]);
        assert!(synth.sustain());
        router.route_bytes(&mut synth, &[0xB0, CC_SUSTAIN, 0]);
        assert!(!synth.sustain());
        router.route_bytes(&mut synth, &[0xE0, 0x7F, 0x7F]);
        assert!((synth.pitch_bend() - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_sustain_holds_released_notes() {
        let mut off = offline(48_000);
        let mut synth = Synthesizer::new(off.link.clone());
        let mut router = MidiRouter::new("organ");

        router.route_bytes(&mut synth, &[0xB0, CC_SUSTAIN, 127]);
        router.route_bytes(&mut synth, &[0x90, 60, 90]);
        router.route_bytes(&mut synth, &[0x80, 60, 0]);
        off.render_seconds(0.5);
        assert_eq!(off.engine.active_voices(), 1);
        router.route_bytes(&mut synth, &[0xB0, CC_SUSTAIN, 0]);
        off.render_seconds(0.5);
        assert_eq!(off.engine.active_voices(), 0);
    }
}
