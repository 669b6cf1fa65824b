//! User-configurable playback transforms.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::event::{MAX_CHANNEL, MAX_VELOCITY};

pub const MIN_TEMPO_MULTIPLIER: f64 = 0.25;
pub const MAX_TEMPO_MULTIPLIER: f64 = 4.0;
pub const MIN_TRANSPOSE: i8 = -24;
pub const MAX_TRANSPOSE: i8 = 24;
pub const MIN_NOTE_SHIFT: i8 = -4;
pub const MAX_NOTE_SHIFT: i8 = 4;

/// Grid that event times snap to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantization {
    #[default]
    None,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl Quantization {
    /// Denominator of the grid note value (1/4 -> 4), or None when off.
    pub fn division(&self) -> Option<u32> {
        match self {
            Quantization::None => None,
            Quantization::Quarter => Some(4),
            Quantization::Eighth => Some(8),
            Quantization::Sixteenth => Some(16),
            Quantization::ThirtySecond => Some(32),
        }
    }

    /// Grid length in ms for a given quarter-note length.
    pub fn grid_ms(&self, quarter_ms: f64) -> Option<f64> {
        self.division().map(|d| quarter_ms * 4.0 / d as f64)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "none" | "off" | "" => Some(Quantization::None),
            "1/4" | "quarter" => Some(Quantization::Quarter),
            "1/8" | "eighth" => Some(Quantization::Eighth),
            "1/16" | "sixteenth" => Some(Quantization::Sixteenth),
            "1/32" | "thirty_second" => Some(Quantization::ThirtySecond),
            _ => None,
        }
    }
}

/// How long a triggered key is held.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum KeyPressDuration {
    /// Hold until the source note-off.
    #[default]
    Held,
    /// Release after exactly `ms`, ignoring the source note-off.
    Fixed { ms: f64 },
    /// Interpolate between `min_ms` (velocity 0) and `max_ms` (velocity 127).
    VelocityBased { min_ms: f64, max_ms: f64 },
}

impl KeyPressDuration {
    /// Hold time for a press at `velocity`, or None when held until note-off.
    pub fn hold_ms(&self, velocity: u8) -> Option<f64> {
        match *self {
            KeyPressDuration::Held => None,
            KeyPressDuration::Fixed { ms } => Some(ms),
            KeyPressDuration::VelocityBased { min_ms, max_ms } => {
                let t = velocity.min(MAX_VELOCITY) as f64 / MAX_VELOCITY as f64;
                Some(min_ms + (max_ms - min_ms) * t)
            }
        }
    }

    fn validate(&self) -> Result<(), String> {
        match *self {
            KeyPressDuration::Held => Ok(()),
            KeyPressDuration::Fixed { ms } if ms.is_finite() && ms > 0.0 => Ok(()),
            KeyPressDuration::Fixed { ms } => Err(format!("fixed press duration {} ms must be positive", ms)),
            KeyPressDuration::VelocityBased { min_ms, max_ms }
                if min_ms.is_finite() && max_ms.is_finite() && min_ms > 0.0 && min_ms <= max_ms =>
            {
                Ok(())
            }
            KeyPressDuration::VelocityBased { min_ms, max_ms } => Err(format!(
                "velocity press duration range {}..{} ms is invalid",
                min_ms, max_ms
            )),
        }
    }
}

/// Per-file semitone shift, layered on top of the profile transpose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub struct NoteShift(i8);

impl NoteShift {
    pub fn new(semitones: i8) -> Result<Self, String> {
        if (MIN_NOTE_SHIFT..=MAX_NOTE_SHIFT).contains(&semitones) {
            Ok(Self(semitones))
        } else {
            Err(format!(
                "note shift {} outside {}..={}",
                semitones, MIN_NOTE_SHIFT, MAX_NOTE_SHIFT
            ))
        }
    }

    /// Clamped construction, for configuration input.
    pub fn saturating(semitones: i8) -> Self {
        Self(semitones.clamp(MIN_NOTE_SHIFT, MAX_NOTE_SHIFT))
    }

    pub fn get(self) -> i8 {
        self.0
    }
}

impl TryFrom<i8> for NoteShift {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NoteShift> for i8 {
    fn from(shift: NoteShift) -> Self {
        shift.0
    }
}

/// Transforms applied to a timeline before playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackOptions {
    pub tempo_multiplier: f64,
    pub quantization: Quantization,
    pub velocity_threshold: u8,
    pub ignored_channels: BTreeSet<u8>,
    pub transpose: i8,
    pub key_press_duration: KeyPressDuration,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            tempo_multiplier: 1.0,
            quantization: Quantization::None,
            velocity_threshold: 0,
            ignored_channels: BTreeSet::new(),
            transpose: 0,
            key_press_duration: KeyPressDuration::Held,
        }
    }
}

impl PlaybackOptions {
    /// Rejects any out-of-range value. Playback never clamps silently.
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_TEMPO_MULTIPLIER..=MAX_TEMPO_MULTIPLIER).contains(&self.tempo_multiplier) {
            return Err(format!(
                "tempo multiplier {} outside {}..={}",
                self.tempo_multiplier, MIN_TEMPO_MULTIPLIER, MAX_TEMPO_MULTIPLIER
            ));
        }
        if !(MIN_TRANSPOSE..=MAX_TRANSPOSE).contains(&self.transpose) {
            return Err(format!(
                "transpose {} outside {}..={}",
                self.transpose, MIN_TRANSPOSE, MAX_TRANSPOSE
            ));
        }
        if self.velocity_threshold > MAX_VELOCITY {
            return Err(format!("velocity threshold {} out of range", self.velocity_threshold));
        }
        if let Some(ch) = self.ignored_channels.iter().find(|&&ch| ch > MAX_CHANNEL) {
            return Err(format!("ignored channel {} out of range", ch));
        }
        self.key_press_duration.validate()
    }

    /// Configuration-time normalisation: pulls every field into range.
    pub fn clamped(mut self) -> Self {
        if !self.tempo_multiplier.is_finite() {
            self.tempo_multiplier = 1.0;
        }
        self.tempo_multiplier = self
            .tempo_multiplier
            .clamp(MIN_TEMPO_MULTIPLIER, MAX_TEMPO_MULTIPLIER);
        self.transpose = self.transpose.clamp(MIN_TRANSPOSE, MAX_TRANSPOSE);
        self.velocity_threshold = self.velocity_threshold.min(MAX_VELOCITY);
        self.ignored_channels.retain(|&ch| ch <= MAX_CHANNEL);
        if self.key_press_duration.validate().is_err() {
            self.key_press_duration = KeyPressDuration::Held;
        }
        self
    }

    pub fn is_channel_ignored(&self, channel: u8) -> bool {
        self.ignored_channels.contains(&channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        assert!(PlaybackOptions::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_tempo_is_rejected_not_clamped() {
        let opts = PlaybackOptions {
            tempo_multiplier: 5.0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
        assert_eq!(opts.tempo_multiplier, 5.0);
        assert_eq!(opts.clamped().tempo_multiplier, 4.0);
    }

    #[test]
    fn out_of_range_transpose_is_rejected() {
        let opts = PlaybackOptions {
            transpose: -30,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
        assert_eq!(opts.clamped().transpose, -24);
    }

    #[test]
    fn grid_lengths() {
        assert_eq!(Quantization::Quarter.grid_ms(500.0), Some(500.0));
        assert_eq!(Quantization::Sixteenth.grid_ms(500.0), Some(125.0));
        assert_eq!(Quantization::ThirtySecond.grid_ms(500.0), Some(62.5));
        assert_eq!(Quantization::None.grid_ms(500.0), None);
        assert_eq!(Quantization::parse("1/8"), Some(Quantization::Eighth));
        assert_eq!(Quantization::parse("1/3"), None);
    }

    #[test]
    fn velocity_based_duration_interpolates() {
        let d = KeyPressDuration::VelocityBased {
            min_ms: 50.0,
            max_ms: 177.0,
        };
        assert_eq!(d.hold_ms(0), Some(50.0));
        assert_eq!(d.hold_ms(127), Some(177.0));
        assert!((d.hold_ms(64).unwrap() - 114.0).abs() < 1e-9);
        assert_eq!(KeyPressDuration::Held.hold_ms(100), None);
        assert_eq!(KeyPressDuration::Fixed { ms: 80.0 }.hold_ms(1), Some(80.0));
    }

    #[test]
    fn invalid_press_duration_is_rejected() {
        let opts = PlaybackOptions {
            key_press_duration: KeyPressDuration::VelocityBased {
                min_ms: 200.0,
                max_ms: 100.0,
            },
            ..Default::default()
        };
        assert!(opts.validate().is_err());
        assert_eq!(opts.clamped().key_press_duration, KeyPressDuration::Held);
    }

    #[test]
    fn note_shift_bounds() {
        assert!(NoteShift::new(4).is_ok());
        assert!(NoteShift::new(-5).is_err());
        assert_eq!(NoteShift::saturating(9).get(), 4);
        assert!(serde_json::from_str::<NoteShift>("7").is_err());
        assert_eq!(serde_json::from_str::<NoteShift>("-2").unwrap().get(), -2);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let json = r#"{"tempo_multiplier":2.0,"ignored_channels":[9],"key_press_duration":{"mode":"fixed","ms":60.0}}"#;
        let opts: PlaybackOptions = serde_json::from_str(json).unwrap();
        assert_eq!(opts.tempo_multiplier, 2.0);
        assert!(opts.is_channel_ignored(9));
        assert_eq!(opts.key_press_duration, KeyPressDuration::Fixed { ms: 60.0 });
        assert_eq!(opts.quantization, Quantization::None);
    }
}
