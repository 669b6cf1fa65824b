//! # midikey-core
//!
//! Playback engine that turns a timeline of note events into simulated
//! keystrokes: transform, mapping resolution, a tick-driven scheduler with
//! a panic-safe key release path, and the file boundaries around them.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use midikey_core::config::Config;
//! use midikey_core::decode::decode_file;
//! use midikey_core::playback::{LogInjector, PlaybackHandle, PlaybackRequest};
//! use midikey_core::profile::load_profile;
//!
//! let config = Config::load();
//! let timeline = decode_file("song.json".as_ref())?;
//! let profile = load_profile("piano.json".as_ref(), &config.default_options())?;
//!
//! let engine = PlaybackHandle::with_settings(Arc::new(LogInjector), config.engine_settings());
//! let request = PlaybackRequest::from_profile(&timeline, &profile, "song.json")?
//!     .with_countdown(config.countdown());
//! engine.play(request)?;
//!
//! // hand this to a global hotkey listener
//! let panic = engine.panic_trigger();
//!
//! // drain PlaybackFeedback until StateChanged(Stopped)
//! for feedback in engine.drain_feedback() { /* ... */ }
//! ```
//!
//! ## Module Overview
//!
//! - [`transform`] — pure timeline rewriting: filters, transpose, quantize, tempo
//! - [`resolver`] — ordered first-match note-to-key rules
//! - [`playback`] — `PlaybackHandle`, the playback thread, `PlaybackCore` state
//!   machine, `KeyInjector` boundary and test doubles
//! - [`decode`] — `EventDecoder` boundary and the JSON timeline decoder
//! - [`profile`] — read-only JSON profile loading
//! - [`config`] — TOML configuration (embedded defaults + user override)
//! - [`error`] — error enums

pub mod config;
pub mod decode;
pub mod error;
pub mod playback;
pub mod profile;
pub mod resolver;
pub mod transform;

pub use error::{DecodeError, PlaybackError, ProfileError};
pub use midikey_types as types;
