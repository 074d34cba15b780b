//! Pitch and chord arithmetic.
//!
//! Frequencies are anchored on octave 4 (C4 = 261.63 Hz, A4 = 440 Hz) and
//! scale by powers of two for other octaves.

use crate::shared::Resolved;

/// Returned when a note name is not recognised.
pub const FALLBACK_FREQUENCY: f64 = 440.0;
pub const REFERENCE_OCTAVE: i32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    pub fn semitone(self) -> u8 {
        self as u8
    }

    pub fn from_semitone(semitone: i32) -> Self {
        Self::ALL[semitone.rem_euclid(12) as usize]
    }

    /// Frequency in octave 4.
    pub fn base_frequency(self) -> f64 {
        match self {
            PitchClass::C => 261.63,
            PitchClass::CSharp => 277.18,
            PitchClass::D => 293.66,
            PitchClass::DSharp => 311.13,
            PitchClass::E => 329.63,
            PitchClass::F => 349.23,
            PitchClass::FSharp => 369.99,
            PitchClass::G => 392.00,
            PitchClass::GSharp => 415.30,
            PitchClass::A => 440.00,
            PitchClass::ASharp => 466.16,
            PitchClass::B => 493.88,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }

    /// Letter plus optional `#` or `b`, e.g. `"C"`, `"F#"`, `"Bb"`.
    /// Only the twelve spellings of the chromatic table plus their common
    /// flat equivalents are accepted.
    pub fn parse(name: &str) -> Option<Self> {
        let pc = match name.trim() {
            "C" => PitchClass::C,
            "C#" | "Db" => PitchClass::CSharp,
            "D" => PitchClass::D,
            "D#" | "Eb" => PitchClass::DSharp,
            "E" => PitchClass::E,
            "F" => PitchClass::F,
            "F#" | "Gb" => PitchClass::FSharp,
            "G" => PitchClass::G,
            "G#" | "Ab" => PitchClass::GSharp,
            "A" => PitchClass::A,
            "A#" | "Bb" => PitchClass::ASharp,
            "B" => PitchClass::B,
            _ => return None,
        };
        Some(pc)
    }

    pub fn frequency(self, octave: i32) -> f64 {
        self.base_frequency() * 2f64.powi(octave - REFERENCE_OCTAVE)
    }
}

/// Frequency of `note` in `octave`; unknown names give 440 Hz, tagged.
pub fn note_frequency(note: &str, octave: i32) -> Resolved<f64> {
    match PitchClass::parse(note) {
        Some(pc) => Resolved::Exact(pc.frequency(octave)),
        None => Resolved::Fallback(FALLBACK_FREQUENCY),
    }
}

/// Shift a frequency by a number of semitones.
pub fn transpose(frequency: f64, semitones: i32) -> f64 {
    frequency * 2f64.powf(f64::from(semitones) / 12.0)
}

/// MIDI note number → pitch class and octave (60 = C4).
pub fn midi_to_note(note: u8) -> (PitchClass, i32) {
    let n = i32::from(note);
    (PitchClass::from_semitone(n), n.div_euclid(12) - 1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChordType {
    Major,
    Minor,
    Diminished,
    Augmented,
    Sus2,
    Sus4,
    Dominant7,
    Major7,
    Minor7,
    Diminished7,
    HalfDiminished7,
    Major6,
    Minor6,
    Power,
}

impl ChordType {
    pub const ALL: [ChordType; 14] = [
        ChordType::Major,
        ChordType::Minor,
        ChordType::Diminished,
        ChordType::Augmented,
        ChordType::Sus2,
        ChordType::Sus4,
        ChordType::Dominant7,
        ChordType::Major7,
        ChordType::Minor7,
        ChordType::Diminished7,
        ChordType::HalfDiminished7,
        ChordType::Major6,
        ChordType::Minor6,
        ChordType::Power,
    ];

    /// Semitones above the root.
    pub fn intervals(self) -> &'static [i32] {
        match self {
            ChordType::Major => &[0, 4, 7],
            ChordType::Minor => &[0, 3, 7],
            ChordType::Diminished => &[0, 3, 6],
            ChordType::Augmented => &[0, 4, 8],
            ChordType::Sus2 => &[0, 2, 7],
            ChordType::Sus4 => &[0, 5, 7],
            ChordType::Dominant7 => &[0, 4, 7, 10],
            ChordType::Major7 => &[0, 4, 7, 11],
            ChordType::Minor7 => &[0, 3, 7, 10],
            ChordType::Diminished7 => &[0, 3, 6, 9],
            ChordType::HalfDiminished7 => &[0, 3, 6, 10],
            ChordType::Major6 => &[0, 4, 7, 9],
            ChordType::Minor6 => &[0, 3, 7, 9],
            ChordType::Power => &[0, 7],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChordType::Major => "major",
            ChordType::Minor => "minor",
            ChordType::Diminished => "dim",
            ChordType::Augmented => "aug",
            ChordType::Sus2 => "sus2",
            ChordType::Sus4 => "sus4",
            ChordType::Dominant7 => "7",
            ChordType::Major7 => "maj7",
            ChordType::Minor7 => "m7",
            ChordType::Diminished7 => "dim7",
            ChordType::HalfDiminished7 => "m7b5",
            ChordType::Major6 => "6",
            ChordType::Minor6 => "m6",
            ChordType::Power => "5",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        let chord = match suffix {
            "" | "maj" | "M" | "major" => ChordType::Major,
            "m" | "min" | "minor" | "-" => ChordType::Minor,
            "dim" | "°" | "diminished" => ChordType::Diminished,
            "aug" | "+" | "augmented" => ChordType::Augmented,
            "sus2" => ChordType::Sus2,
            "sus4" | "sus" => ChordType::Sus4,
            "7" | "dom7" | "dominant7" => ChordType::Dominant7,
            "maj7" | "M7" | "major7" => ChordType::Major7,
            "m7" | "min7" | "minor7" | "-7" => ChordType::Minor7,
            "dim7" | "°7" => ChordType::Diminished7,
            "m7b5" | "ø" | "half-diminished" => ChordType::HalfDiminished7,
            "6" | "maj6" => ChordType::Major6,
            "m6" | "min6" => ChordType::Minor6,
            "5" | "power" => ChordType::Power,
            _ => return None,
        };
        Some(chord)
    }

    /// Unknown chord types fall back to major.
    pub fn lookup(name: &str) -> Resolved<Self> {
        match Self::from_suffix(name.trim()) {
            Some(c) => Resolved::Exact(c),
            None => Resolved::Fallback(ChordType::Major),
        }
    }
}

/// A chord symbol such as `"Am"`, `"F#m7"` or `"Bbmaj7"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChordSymbol {
    pub root: PitchClass,
    pub chord: ChordType,
}

impl ChordSymbol {
    pub fn parse(symbol: &str) -> Option<Self> {
        let symbol = symbol.trim();
        let mut chars = symbol.char_indices();
        chars.next()?;
        // root is the letter plus an optional accidental
        let split = match chars.next() {
            Some((i, '#' | 'b')) => i + 1,
            Some((i, _)) => i,
            None => symbol.len(),
        };
        let (root, suffix) = symbol.split_at(split);
        let root = PitchClass::parse(root)?;
        let chord = ChordType::from_suffix(suffix)?;
        Some(Self { root, chord })
    }

    pub fn root_name(&self) -> &'static str {
        self.root.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_for_every_pitch_class_and_octave() {
        for pc in PitchClass::ALL {
            for octave in 0..=6 {
                let got = note_frequency(pc.name(), octave);
                assert!(!got.is_fallback());
                let expected = pc.base_frequency() * 2f64.powi(octave - 4);
                assert!((got.value() - expected).abs() < 1e-9, "{pc:?}{octave}");
            }
        }
    }

    #[test]
    fn test_reference_values() {
        assert_eq!(note_frequency("C", 4).value(), 261.63);
        assert_eq!(note_frequency("A", 4).value(), 440.0);
        assert_eq!(note_frequency("A", 5).value(), 880.0);
        assert_eq!(note_frequency("Bb", 4).value(), note_frequency("A#", 4).value());
    }

    #[test]
    fn test_unknown_note_falls_back_to_a440() {
        let r = note_frequency("H", 2);
        assert!(r.is_fallback());
        assert_eq!(r.value(), FALLBACK_FREQUENCY);
    }

    #[test]
    fn test_chord_lookup() {
        assert_eq!(ChordType::lookup("minor").value().intervals(), &[0, 3, 7]);
        assert_eq!(ChordType::lookup("major").value().intervals(), &[0, 4, 7]);
        let unknown = ChordType::lookup("mystery13");
        assert!(unknown.is_fallback());
        assert_eq!(unknown.value(), ChordType::Major);
        for chord in ChordType::ALL {
            assert!(chord.intervals().iter().all(|&i| (0..=11).contains(&i)));
            assert_eq!(ChordType::lookup(chord.name()), Resolved::Exact(chord));
        }
    }

    #[test]
    fn test_chord_symbols() {
        assert_eq!(
            ChordSymbol::parse("F#m7"),
            Some(ChordSymbol { root: PitchClass::FSharp, chord: ChordType::Minor7 })
        );
        assert_eq!(
            ChordSymbol::parse("Bbmaj7"),
            Some(ChordSymbol { root: PitchClass::ASharp, chord: ChordType::Major7 })
        );
        assert_eq!(ChordSymbol::parse("G"), Some(ChordSymbol { root: PitchClass::G, chord: ChordType::Major }));
        assert_eq!(ChordSymbol::parse("Am").map(|c| c.chord), Some(ChordType::Minor));
        assert_eq!(ChordSymbol::parse("Xm"), None);
        assert_eq!(ChordSymbol::parse(""), None);
    }

    #[test]
    fn test_midi_mapping() {
        assert_eq!(midi_to_note(60), (PitchClass::C, 4));
        assert_eq!(midi_to_note(69), (PitchClass::A, 4));
        assert_eq!(midi_to_note(0), (PitchClass::C, -1));
        assert_eq!(midi_to_note(71), (PitchClass::B, 4));
    }
}
