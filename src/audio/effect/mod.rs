//! The effects chain sitting between the voices and the master gain.
//!
//! Signal flow:
//!
//! ```text
//! input ─┬──────────────────────────────────────────────── dry ─┐
//!        └─ reverb → delay → chorus → compressor → eq ─── wet ──┴─ mix → out
//! ```
//!
//! Every stage also has its own internal dry/wet mix. Bypassing a stage
//! keeps it in the signal path but forces its parameters to neutral values.

use super::frame::StereoFrame;
use crate::shared::Resolved;

mod chorus;
mod compressor;
mod delay;
mod eq;
mod reverb;

pub use chorus::{Chorus, ChorusParam, ChorusSettings};
pub use compressor::{Compressor, CompressorParam, CompressorSettings};
pub use delay::{Delay, DelayParam, DelaySettings};
pub use eq::{EqParam, EqSettings, Equalizer};
pub use reverb::{Reverb, ReverbParam, ReverbSettings};

pub const DEFAULT_DRY_WET: f32 = 0.3;
pub const DEFAULT_PRESET: &str = "clean";

pub trait Effect: Send {
    fn kind(&self) -> EffectKind;
    fn process(&mut self, buf: &mut [StereoFrame]);
    /// Restore default parameters and clear internal state.
    fn reset(&mut self);
    fn set_bypass(&mut self, bypass: bool);
    fn is_bypassed(&self) -> bool;
}

#[inline]
pub(crate) fn blend(dry: f32, wet: f32, mix: f32) -> f32 {
    dry * (1.0 - mix) + wet * mix
}

/// The stages of the chain, in processing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Reverb,
    Delay,
    Chorus,
    Compressor,
    Eq,
}

impl EffectKind {
    pub const ALL: [EffectKind; 5] = [
        EffectKind::Reverb,
        EffectKind::Delay,
        EffectKind::Chorus,
        EffectKind::Compressor,
        EffectKind::Eq,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EffectKind::Reverb => "reverb",
            EffectKind::Delay => "delay",
            EffectKind::Chorus => "chorus",
            EffectKind::Compressor => "compressor",
            EffectKind::Eq => "eq",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

/// One parameter change, tagged by the stage it belongs to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EffectParam {
    Reverb(ReverbParam),
    Delay(DelayParam),
    Chorus(ChorusParam),
    Compressor(CompressorParam),
    Eq(EqParam),
}

impl EffectParam {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectParam::Reverb(_) => EffectKind::Reverb,
            EffectParam::Delay(_) => EffectKind::Delay,
            EffectParam::Chorus(_) => EffectKind::Chorus,
            EffectParam::Compressor(_) => EffectKind::Compressor,
            EffectParam::Eq(_) => EffectKind::Eq,
        }
    }

    /// Builds a parameter from text, e.g. `("compressor", "ratio", 6.0)`.
    /// Returns `None` for unknown effect or parameter names.
    pub fn parse(effect: &str, param: &str, value: f32) -> Option<Self> {
        let param = param.trim().to_ascii_lowercase();
        let parsed = match (EffectKind::from_name(effect)?, param.as_str()) {
            (EffectKind::Reverb, "roomsize" | "room_size") => EffectParam::Reverb(ReverbParam::RoomSize(value)),
            (EffectKind::Reverb, "damping") => EffectParam::Reverb(ReverbParam::Damping(value)),
            (EffectKind::Reverb, "mix") => EffectParam::Reverb(ReverbParam::Mix(value)),
            (EffectKind::Delay, "time") => EffectParam::Delay(DelayParam::Time(value)),
            (EffectKind::Delay, "feedback") => EffectParam::Delay(DelayParam::Feedback(value)),
            (EffectKind::Delay, "mix") => EffectParam::Delay(DelayParam::Mix(value)),
            (EffectKind::Chorus, "rate") => EffectParam::Chorus(ChorusParam::Rate(value)),
            (EffectKind::Chorus, "depth") => EffectParam::Chorus(ChorusParam::Depth(value)),
            (EffectKind::Chorus, "mix") => EffectParam::Chorus(ChorusParam::Mix(value)),
            (EffectKind::Compressor, "threshold") => EffectParam::Compressor(CompressorParam::Threshold(value)),
            (EffectKind::Compressor, "ratio") => EffectParam::Compressor(CompressorParam::Ratio(value)),
            (EffectKind::Compressor, "attack") => EffectParam::Compressor(CompressorParam::Attack(value)),
            (EffectKind::Compressor, "release") => EffectParam::Compressor(CompressorParam::Release(value)),
            (EffectKind::Compressor, "mix") => EffectParam::Compressor(CompressorParam::Mix(value)),
            (EffectKind::Eq, "low") => EffectParam::Eq(EqParam::Low(value)),
            (EffectKind::Eq, "mid") => EffectParam::Eq(EqParam::Mid(value)),
            (EffectKind::Eq, "high") => EffectParam::Eq(EqParam::High(value)),
            (EffectKind::Eq, "mix") => EffectParam::Eq(EqParam::Mix(value)),
            _ => return None,
        };
        Some(parsed)
    }

    pub fn label(&self) -> String {
        format!("{}.{:?}", self.kind().name(), self)
    }
}

/// A named set of parameter values applied to the chain in one step.
#[derive(Clone, Copy, Debug)]
pub struct EffectsPreset {
    pub name: &'static str,
    pub params: &'static [EffectParam],
}

pub const PRESETS: &[EffectsPreset] = &[
    EffectsPreset {
        name: "clean",
        params: &[
            EffectParam::Reverb(ReverbParam::Mix(0.0)),
            EffectParam::Delay(DelayParam::Mix(0.0)),
            EffectParam::Chorus(ChorusParam::Mix(0.0)),
            EffectParam::Compressor(CompressorParam::Ratio(1.0)),
        ],
    },
    EffectsPreset {
        name: "room",
        params: &[
            EffectParam::Reverb(ReverbParam::RoomSize(0.3)),
            EffectParam::Reverb(ReverbParam::Damping(0.6)),
            EffectParam::Reverb(ReverbParam::Mix(0.25)),
            EffectParam::Delay(DelayParam::Mix(0.0)),
            EffectParam::Chorus(ChorusParam::Mix(0.0)),
        ],
    },
    EffectsPreset {
        name: "hall",
        params: &[
            EffectParam::Reverb(ReverbParam::RoomSize(0.85)),
            EffectParam::Reverb(ReverbParam::Damping(0.3)),
            EffectParam::Reverb(ReverbParam::Mix(0.45)),
            EffectParam::Delay(DelayParam::Mix(0.0)),
            EffectParam::Chorus(ChorusParam::Mix(0.0)),
        ],
    },
    EffectsPreset {
        name: "ambient",
        params: &[
            EffectParam::Reverb(ReverbParam::RoomSize(0.95)),
            EffectParam::Reverb(ReverbParam::Mix(0.6)),
            EffectParam::Delay(DelayParam::Time(0.5)),
            EffectParam::Delay(DelayParam::Feedback(0.55)),
            EffectParam::Delay(DelayParam::Mix(0.35)),
            EffectParam::Chorus(ChorusParam::Rate(0.4)),
            EffectParam::Chorus(ChorusParam::Mix(0.4)),
            EffectParam::Eq(EqParam::High(-3.0)),
        ],
    },
    EffectsPreset {
        name: "slapback",
        params: &[
            EffectParam::Reverb(ReverbParam::Mix(0.1)),
            EffectParam::Delay(DelayParam::Time(0.12)),
            EffectParam::Delay(DelayParam::Feedback(0.1)),
            EffectParam::Delay(DelayParam::Mix(0.35)),
            EffectParam::Chorus(ChorusParam::Mix(0.0)),
        ],
    },
    EffectsPreset {
        name: "chorus",
        params: &[
            EffectParam::Reverb(ReverbParam::Mix(0.15)),
            EffectParam::Delay(DelayParam::Mix(0.0)),
            EffectParam::Chorus(ChorusParam::Rate(1.2)),
            EffectParam::Chorus(ChorusParam::Depth(0.7)),
            EffectParam::Chorus(ChorusParam::Mix(0.5)),
        ],
    },
    EffectsPreset {
        name: "compressed",
        params: &[
            EffectParam::Reverb(ReverbParam::Mix(0.1)),
            EffectParam::Delay(DelayParam::Mix(0.0)),
            EffectParam::Chorus(ChorusParam::Mix(0.0)),
            EffectParam::Compressor(CompressorParam::Threshold(-30.0)),
            EffectParam::Compressor(CompressorParam::Ratio(8.0)),
            EffectParam::Eq(EqParam::Mid(2.0)),
        ],
    },
];

impl EffectsPreset {
    /// Unknown names fall back to the clean preset.
    pub fn lookup(name: &str) -> Resolved<&'static EffectsPreset> {
        let wanted = name.trim().to_ascii_lowercase();
        match PRESETS.iter().find(|p| p.name == wanted) {
            Some(p) => Resolved::Exact(p),
            None => Resolved::Fallback(default_preset()),
        }
    }
}

fn default_preset() -> &'static EffectsPreset {
    &PRESETS[0]
}

pub struct EffectsChain {
    pub reverb: Reverb,
    pub delay: Delay,
    pub chorus: Chorus,
    pub compressor: Compressor,
    pub eq: Equalizer,
    dry_wet: f32,
    wet: Vec<StereoFrame>,
}

impl EffectsChain {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            reverb: Reverb::new(sample_rate),
            delay: Delay::new(sample_rate),
            chorus: Chorus::new(sample_rate),
            compressor: Compressor::new(sample_rate),
            eq: Equalizer::new(sample_rate),
            dry_wet: DEFAULT_DRY_WET,
            wet: Vec::with_capacity(4096),
        }
    }

    pub fn dry_wet(&self) -> f32 {
        self.dry_wet
    }

    pub fn set_dry_wet_mix(&mut self, mix: f32) {
        self.dry_wet = mix.clamp(0.0, 1.0);
    }

    pub fn set_parameter(&mut self, param: EffectParam) {
        match param {
            EffectParam::Reverb(p) => self.reverb.set(p),
            EffectParam::Delay(p) => self.delay.set(p),
            EffectParam::Chorus(p) => self.chorus.set(p),
            EffectParam::Compressor(p) => self.compressor.set(p),
            EffectParam::Eq(p) => self.eq.set(p),
        }
    }

    /// Resets every stage, then pushes every parameter of the preset.
    pub fn apply_preset(&mut self, preset: &EffectsPreset) {
        for stage in self.stages_mut() {
            stage.reset();
        }
        for param in preset.params {
            self.set_parameter(*param);
        }
    }

    pub fn stage_mut(&mut self, kind: EffectKind) -> &mut dyn Effect {
        match kind {
            EffectKind::Reverb => &mut self.reverb,
            EffectKind::Delay => &mut self.delay,
            EffectKind::Chorus => &mut self.chorus,
            EffectKind::Compressor => &mut self.compressor,
            EffectKind::Eq => &mut self.eq,
        }
    }

    pub fn set_bypass(&mut self, kind: EffectKind, bypass: bool) {
        self.stage_mut(kind).set_bypass(bypass);
    }

    pub fn reset(&mut self, kind: EffectKind) {
        self.stage_mut(kind).reset();
    }

    fn stages_mut(&mut self) -> [&mut dyn Effect; 5] {
        [
            &mut self.reverb,
            &mut self.delay,
            &mut self.chorus,
            &mut self.compressor,
            &mut self.eq,
        ]
    }

    pub fn process(&mut self, buf: &mut [StereoFrame]) {
        let mix = self.dry_wet;
        let mut wet = std::mem::take(&mut self.wet);
        wet.clear();
        wet.extend_from_slice(buf);
        for stage in self.stages_mut() {
            stage.process(&mut wet);
        }
        for (out, w) in buf.iter_mut().zip(&wet) {
            out.left = blend(out.left, w.left, mix);
            out.right = blend(out.right, w.right, mix);
        }
        self.wet = wet;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_wet_is_clamped() {
        let mut chain = EffectsChain::new(44_100);
        chain.set_dry_wet_mix(1.7);
        assert_eq!(chain.dry_wet(), 1.0);
        chain.set_dry_wet_mix(-0.2);
        assert_eq!(chain.dry_wet(), 0.0);
    }

    #[test]
    fn test_fully_dry_chain_is_transparent() {
        let mut chain = EffectsChain::new(44_100);
        chain.set_dry_wet_mix(0.0);
        let mut buf: Vec<StereoFrame> = (0..512).map(|i| StereoFrame::mono((i as f32 * 0.05).sin() * 0.5)).collect();
        let expected = buf.clone();
        chain.process(&mut buf);
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_apply_preset_pushes_every_value() {
        let mut chain = EffectsChain::new(44_100);
        let preset = EffectsPreset::lookup("ambient");
        assert!(!preset.is_fallback());
        chain.apply_preset(preset.value());
        assert_eq!(chain.reverb.settings.room_size, 0.95);
        assert_eq!(chain.delay.settings.time, 0.5);
        assert_eq!(chain.delay.settings.feedback, 0.55);
        assert_eq!(chain.chorus.settings.rate, 0.4);
        assert_eq!(chain.eq.settings.high, -3.0);
    }

    #[test]
    fn test_preset_starts_from_defaults() {
        let mut chain = EffectsChain::new(44_100);
        chain.set_parameter(EffectParam::Compressor(CompressorParam::Ratio(12.0)));
        chain.apply_preset(EffectsPreset::lookup("room").value());
        assert_eq!(chain.compressor.settings.ratio, CompressorSettings::default().ratio);
    }

    #[test]
    fn test_unknown_preset_falls_back_to_clean() {
        let preset = EffectsPreset::lookup("spaceship");
        assert!(preset.is_fallback());
        assert_eq!(preset.value().name, DEFAULT_PRESET);
    }

    #[test]
    fn test_parse_dispatches_by_name() {
        assert_eq!(
            EffectParam::parse("Compressor", "ratio", 6.0),
            Some(EffectParam::Compressor(CompressorParam::Ratio(6.0)))
        );
        assert_eq!(EffectParam::parse("eq", "gain", 1.0), None);
        assert_eq!(EffectParam::parse("flanger", "mix", 1.0), None);
    }

    #[test]
    fn test_bypass_and_reset_per_stage() {
        let mut chain = EffectsChain::new(44_100);
        chain.set_parameter(EffectParam::Eq(EqParam::Mid(20.0)));
        assert_eq!(chain.eq.settings.mid, 12.0);
        chain.set_bypass(EffectKind::Eq, true);
        assert!(chain.eq.is_bypassed());
        chain.reset(EffectKind::Eq);
        assert_eq!(chain.eq.settings, EqSettings::default());
    }
}
