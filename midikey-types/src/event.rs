//! Timed note events as produced by a decoder.

use serde::{Deserialize, Serialize};

/// Highest valid MIDI note number.
pub const MAX_NOTE: u8 = 127;
/// Highest valid MIDI velocity.
pub const MAX_VELOCITY: u8 = 127;
/// Highest valid MIDI channel (0-based).
pub const MAX_CHANNEL: u8 = 15;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Kind of a note event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    NoteOn,
    NoteOff,
}

/// A single timed note-on or note-off.
///
/// `timestamp_ms` is absolute musical time from the start of the file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub timestamp_ms: f64,
    pub kind: NoteKind,
    pub note: u8,
    #[serde(default)]
    pub velocity: u8,
    #[serde(default)]
    pub channel: u8,
}

impl NoteEvent {
    pub fn note_on(timestamp_ms: f64, note: u8, velocity: u8, channel: u8) -> Self {
        Self {
            timestamp_ms,
            kind: NoteKind::NoteOn,
            note,
            velocity,
            channel,
        }
    }

    pub fn note_off(timestamp_ms: f64, note: u8, channel: u8) -> Self {
        Self {
            timestamp_ms,
            kind: NoteKind::NoteOff,
            note,
            velocity: 0,
            channel,
        }
    }

    pub fn is_note_on(&self) -> bool {
        self.kind == NoteKind::NoteOn
    }

    /// Checks the numeric ranges a decoder is expected to honour.
    pub fn validate(&self) -> Result<(), String> {
        if !self.timestamp_ms.is_finite() || self.timestamp_ms < 0.0 {
            return Err(format!("invalid timestamp {}", self.timestamp_ms));
        }
        if self.note > MAX_NOTE {
            return Err(format!("note {} out of range", self.note));
        }
        if self.velocity > MAX_VELOCITY {
            return Err(format!("velocity {} out of range", self.velocity));
        }
        if self.channel > MAX_CHANNEL {
            return Err(format!("channel {} out of range", self.channel));
        }
        Ok(())
    }
}

/// A tempo change in the source file, in unscaled musical time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    pub at_ms: f64,
    /// Quarter-note beats per minute.
    pub bpm: f64,
}

impl TempoChange {
    pub fn quarter_ms(&self) -> f64 {
        60_000.0 / self.bpm
    }
}

/// Decoded content of one file: its events plus the tempo metadata the
/// decoder could recover. An empty tempo map means "unknown".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub events: Vec<NoteEvent>,
    #[serde(default)]
    pub tempo_map: Vec<TempoChange>,
}

impl Timeline {
    pub fn new(events: Vec<NoteEvent>) -> Self {
        Self {
            events,
            tempo_map: Vec::new(),
        }
    }

    pub fn with_tempo_map(mut self, tempo_map: Vec<TempoChange>) -> Self {
        self.tempo_map = tempo_map;
        self
    }

    pub fn has_tempo_info(&self) -> bool {
        self.tempo_map.iter().any(|t| t.bpm > 0.0)
    }

    pub fn duration_ms(&self) -> f64 {
        self.events
            .iter()
            .map(|e| e.timestamp_ms)
            .fold(0.0, f64::max)
    }
}

/// Scientific pitch name for a MIDI note (60 = "C4").
pub fn note_name(note: u8) -> String {
    let octave = (note / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(note % 12) as usize], octave)
}
