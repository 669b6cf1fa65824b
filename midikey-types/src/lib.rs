//! # midikey-types
//!
//! Shared type definitions for midikey: the decoded event timeline, playback
//! options, key combinations, mapping rules and the playback state machine.
//! Used by midikey-core and the command-line front end.

pub mod event;
pub mod keys;
pub mod mapping;
pub mod options;
pub mod playback;

pub use event::{note_name, NoteEvent, NoteKind, TempoChange, Timeline};
pub use keys::{Key, KeyCombination, Modifier};
pub use mapping::{ChannelFilter, NoteMapping, Profile, VelocityRange};
pub use options::{KeyPressDuration, NoteShift, PlaybackOptions, Quantization};
pub use playback::{PlaybackFeedback, PlaybackState};
