//! Note-to-key mapping rules and the profile that owns them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::{NoteEvent, MAX_VELOCITY};
use crate::keys::KeyCombination;
use crate::options::{NoteShift, PlaybackOptions};

/// Which channels a mapping listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelFilter {
    #[default]
    Any,
    Channel(u8),
}

impl ChannelFilter {
    pub fn matches(&self, channel: u8) -> bool {
        match self {
            ChannelFilter::Any => true,
            ChannelFilter::Channel(ch) => *ch == channel,
        }
    }
}

/// Inclusive velocity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityRange {
    pub min: u8,
    pub max: u8,
}

impl VelocityRange {
    pub const FULL: VelocityRange = VelocityRange {
        min: 0,
        max: MAX_VELOCITY,
    };

    pub fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, velocity: u8) -> bool {
        (self.min..=self.max).contains(&velocity)
    }
}

impl Default for VelocityRange {
    fn default() -> Self {
        Self::FULL
    }
}

/// One rule of a profile: "this note (on this channel, in this velocity
/// window) presses this key combination".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteMapping {
    pub note: u8,
    #[serde(rename = "keys")]
    pub key_combination: KeyCombination,
    #[serde(default)]
    pub channel_filter: ChannelFilter,
    #[serde(default)]
    pub velocity_range: VelocityRange,
}

impl NoteMapping {
    pub fn new(note: u8, key_combination: KeyCombination) -> Self {
        Self {
            note,
            key_combination,
            channel_filter: ChannelFilter::Any,
            velocity_range: VelocityRange::FULL,
        }
    }

    pub fn on_channel(mut self, channel: u8) -> Self {
        self.channel_filter = ChannelFilter::Channel(channel);
        self
    }

    pub fn with_velocity(mut self, min: u8, max: u8) -> Self {
        self.velocity_range = VelocityRange::new(min, max);
        self
    }

    pub fn matches(&self, event: &NoteEvent) -> bool {
        self.note == event.note
            && self.channel_filter.matches(event.channel)
            && self.velocity_range.contains(event.velocity)
    }
}

/// Read-only view of the active profile as supplied by the profile store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    /// Ordered by priority: the first matching rule wins.
    #[serde(default)]
    pub mappings: Vec<NoteMapping>,
    #[serde(default)]
    pub options: PlaybackOptions,
    /// Per-file note shifts, keyed by file name.
    #[serde(default)]
    pub note_shifts: BTreeMap<String, NoteShift>,
}

impl Profile {
    pub fn note_shift_for(&self, file_name: &str) -> NoteShift {
        self.note_shifts.get(file_name).copied().unwrap_or_default()
    }
}
