//! Read-only profile loading.
//!
//! Profiles are JSON documents:
//!
//! ```json
//! {
//!   "name": "piano",
//!   "mappings": [
//!     {"note": 60, "keys": "A"},
//!     {"note": 62, "keys": "Shift+S", "channel_filter": {"channel": 1},
//!      "velocity_range": {"min": 64, "max": 127}}
//!   ],
//!   "options": {"tempo_multiplier": 1.0, "key_press_duration": {"mode": "held"}},
//!   "note_shifts": {"song.json": -2}
//! }
//! ```
//!
//! A profile without an `options` block takes the configured defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use midikey_types::{NoteMapping, NoteShift, PlaybackOptions, Profile};

use crate::error::ProfileError;

pub trait ProfileStore {
    fn load(&self, name: &str) -> Result<Profile, ProfileError>;
}

#[derive(Deserialize)]
struct ProfileFile {
    name: String,
    #[serde(default)]
    mappings: Vec<NoteMapping>,
    options: Option<PlaybackOptions>,
    #[serde(default)]
    note_shifts: BTreeMap<String, NoteShift>,
}

/// Parse a profile document. Options are validated, never clamped: a profile
/// asking for an impossible tempo is rejected instead of silently altered.
pub fn parse_profile(path: &Path, contents: &str, default_options: &PlaybackOptions) -> Result<Profile, ProfileError> {
    let file: ProfileFile = serde_json::from_str(contents).map_err(|source| ProfileError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let options = file.options.unwrap_or_else(|| default_options.clone());
    options.validate().map_err(|message| ProfileError::InvalidOptions {
        name: file.name.clone(),
        message,
    })?;
    Ok(Profile {
        name: file.name,
        mappings: file.mappings,
        options,
        note_shifts: file.note_shifts,
    })
}

pub fn load_profile(path: &Path, default_options: &PlaybackOptions) -> Result<Profile, ProfileError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let profile = parse_profile(path, &contents, default_options)?;
    log::debug!(
        target: "config",
        "profile '{}': {} mappings, {} note shifts",
        profile.name,
        profile.mappings.len(),
        profile.note_shifts.len()
    );
    Ok(profile)
}

/// Profiles stored as `<dir>/<name>.json`.
pub struct JsonProfileStore {
    dir: PathBuf,
    default_options: PlaybackOptions,
}

impl JsonProfileStore {
    pub fn new(dir: impl Into<PathBuf>, default_options: PlaybackOptions) -> Self {
        Self {
            dir: dir.into(),
            default_options,
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }
}

impl ProfileStore for JsonProfileStore {
    fn load(&self, name: &str) -> Result<Profile, ProfileError> {
        load_profile(&self.path_for(name), &self.default_options)
    }
}
