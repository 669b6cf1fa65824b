//! Note-to-key resolution.
//!
//! A profile's mappings are an ordered rule list evaluated top to bottom;
//! the first rule whose note, channel filter and velocity window all match
//! wins. Overlapping rules are intentional overrides, so order matters.

use midikey_types::{note_name, KeyCombination, NoteEvent, NoteMapping};

/// Resolve the key combination for `event`, if any rule matches.
///
/// No match is not an error: the note simply produces no keyboard action.
pub fn resolve<'a>(event: &NoteEvent, mappings: &'a [NoteMapping]) -> Option<&'a KeyCombination> {
    mappings
        .iter()
        .find(|mapping| mapping.matches(event))
        .map(|mapping| &mapping.key_combination)
}

/// Immutable snapshot of a profile's mapping rules, shared with the playback
/// thread. Holds no per-call state, so it can be queried from anywhere.
#[derive(Debug, Clone, Default)]
pub struct MappingResolver {
    mappings: Vec<NoteMapping>,
}

impl MappingResolver {
    pub fn new(mappings: Vec<NoteMapping>) -> Self {
        Self { mappings }
    }

    pub fn resolve(&self, event: &NoteEvent) -> Option<&KeyCombination> {
        resolve(event, &self.mappings)
    }

    /// Notes that appear in the timeline but have no rule for any channel or
    /// velocity. Useful to warn about a profile that does not fit a file.
    pub fn unmapped_notes(&self, events: &[NoteEvent]) -> Vec<u8> {
        let mut notes: Vec<u8> = events
            .iter()
            .filter(|e| e.is_note_on())
            .map(|e| e.note)
            .filter(|&note| !self.mappings.iter().any(|m| m.note == note))
            .collect();
        notes.sort_unstable();
        notes.dedup();
        notes
    }
}

/// Label used for note-triggered feedback, e.g. `C4 -> Shift+A`.
pub fn trigger_label(event: &NoteEvent, combo: &KeyCombination) -> String {
    format!("{} -> {}", note_name(event.note), combo)
}
