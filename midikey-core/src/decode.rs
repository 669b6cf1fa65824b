//! Event source boundary.
//!
//! A decoder turns a file into a time-ordered `Timeline` with millisecond
//! timestamps. Binary MIDI decoding lives outside this crate; the JSON
//! timeline format below is what the CLI and tests feed the engine with:
//!
//! ```json
//! {
//!   "events": [
//!     {"timestamp_ms": 0, "kind": "note_on", "note": 60, "velocity": 100},
//!     {"timestamp_ms": 500, "kind": "note_off", "note": 60}
//!   ],
//!   "tempo_map": [{"at_ms": 0, "bpm": 120}]
//! }
//! ```

use std::path::Path;

use midikey_types::Timeline;

use crate::error::DecodeError;
use crate::transform::sort_stable;

pub trait EventDecoder: Send + Sync {
    /// Whether this decoder handles `path` (usually by extension).
    fn supports(&self, path: &Path) -> bool;

    fn decode(&self, path: &Path) -> Result<Timeline, DecodeError>;
}

/// Reads `.json` timelines.
#[derive(Debug, Default)]
pub struct JsonTimelineDecoder;

impl JsonTimelineDecoder {
    /// Parse and validate timeline JSON. `path` is only used for messages.
    pub fn parse(&self, path: &Path, contents: &str) -> Result<Timeline, DecodeError> {
        let parse_err = |message: String| DecodeError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let mut timeline: Timeline = serde_json::from_str(contents).map_err(|e| parse_err(e.to_string()))?;
        for (i, event) in timeline.events.iter().enumerate() {
            event.validate().map_err(|e| parse_err(format!("event {}: {}", i, e)))?;
        }
        if let Some(bad) = timeline
            .tempo_map
            .iter()
            .find(|t| !(t.bpm.is_finite() && t.bpm > 0.0 && t.at_ms.is_finite() && t.at_ms >= 0.0))
        {
            return Err(parse_err(format!("invalid tempo change {} bpm at {} ms", bad.bpm, bad.at_ms)));
        }

        sort_stable(&mut timeline.events);
        timeline.tempo_map.sort_by(|a, b| a.at_ms.total_cmp(&b.at_ms));
        Ok(timeline)
    }
}

impl EventDecoder for JsonTimelineDecoder {
    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    }

    fn decode(&self, path: &Path) -> Result<Timeline, DecodeError> {
        if !self.supports(path) {
            return Err(DecodeError::UnsupportedFormat(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path).map_err(|e| DecodeError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let timeline = self.parse(path, &contents)?;
        log::debug!(
            target: "transform",
            "decoded {}: {} events, {} tempo changes",
            path.display(),
            timeline.events.len(),
            timeline.tempo_map.len()
        );
        Ok(timeline)
    }
}

/// Decode `path` with the first decoder that supports it.
pub fn decode_with(decoders: &[&dyn EventDecoder], path: &Path) -> Result<Timeline, DecodeError> {
    decoders
        .iter()
        .find(|d| d.supports(path))
        .ok_or_else(|| DecodeError::UnsupportedFormat(path.to_path_buf()))?
        .decode(path)
}

/// Decode with the decoders shipped in this crate.
pub fn decode_file(path: &Path) -> Result<Timeline, DecodeError> {
    decode_with(&[&JsonTimelineDecoder], path)
}
