//! Error types for midikey-core.
//!
//! Per-action injection failures are not errors at this level: they are
//! logged by the engine and playback continues (see `InjectError`).

use std::path::PathBuf;

use thiserror::Error;

use midikey_types::PlaybackState;

/// Errors surfaced by playback control operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// Operation not legal in the current state. The call is rejected and
    /// nothing changes.
    #[error("cannot {op} while {state}")]
    InvalidState {
        op: &'static str,
        state: PlaybackState,
    },

    /// The keystroke injector could not be acquired at `play` time.
    #[error("keystroke injection unavailable: {0}")]
    InjectionUnavailable(String),

    /// Options failed validation before any session was created.
    #[error("invalid playback options: {0}")]
    InvalidOptions(String),

    /// The event source could not be decoded, so nothing can be played.
    #[error("cannot play: {0}")]
    Decode(#[from] DecodeError),

    /// The playback thread is gone.
    #[error("playback thread disconnected")]
    Disconnected,
}

/// Failures from an `EventDecoder`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("unsupported format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("parse error in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("cannot read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

/// Failures loading a profile from the profile store.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("cannot read profile {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed profile {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("profile '{name}' has invalid options: {message}")]
    InvalidOptions { name: String, message: String },
}
