use std::sync::Arc;
use std::time::Duration;

use midikey_types::{KeyPressDuration, NoteEvent, NoteMapping, NoteShift, PlaybackOptions, Profile, Timeline};

use crate::error::PlaybackError;
use crate::resolver::MappingResolver;
use crate::transform::transform;

/// Everything `play` needs: a transformed, time-ordered event list plus the
/// rules and press policy to drive keys with.
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    pub events: Vec<NoteEvent>,
    pub resolver: Arc<MappingResolver>,
    pub key_press_duration: KeyPressDuration,
    /// Lead-in before the first event. Zero skips the countdown state.
    pub countdown: Duration,
}

impl PlaybackRequest {
    /// Events are played as given; they must already be sorted by timestamp.
    pub fn new(events: Vec<NoteEvent>, mappings: Vec<NoteMapping>) -> Self {
        Self {
            events,
            resolver: Arc::new(MappingResolver::new(mappings)),
            key_press_duration: KeyPressDuration::Held,
            countdown: Duration::ZERO,
        }
    }

    pub fn with_key_press_duration(mut self, duration: KeyPressDuration) -> Self {
        self.key_press_duration = duration;
        self
    }

    pub fn with_countdown(mut self, countdown: Duration) -> Self {
        self.countdown = countdown;
        self
    }

    /// Validate `options`, run the transform pipeline and package the result.
    pub fn prepare(
        timeline: &Timeline,
        mappings: Vec<NoteMapping>,
        options: &PlaybackOptions,
        note_shift: NoteShift,
    ) -> Result<Self, PlaybackError> {
        options.validate().map_err(PlaybackError::InvalidOptions)?;
        let events = transform(timeline, options, note_shift);
        log::debug!(
            target: "transform",
            "{} source events -> {} playable (tempo x{}, transpose {}, shift {})",
            timeline.events.len(),
            events.len(),
            options.tempo_multiplier,
            options.transpose,
            note_shift.get()
        );
        Ok(Self::new(events, mappings).with_key_press_duration(options.key_press_duration))
    }

    /// Prepare `timeline` with the profile's options and the note shift the
    /// profile stores for `file_name`.
    pub fn from_profile(timeline: &Timeline, profile: &Profile, file_name: &str) -> Result<Self, PlaybackError> {
        Self::prepare(
            timeline,
            profile.mappings.clone(),
            &profile.options,
            profile.note_shift_for(file_name),
        )
    }

    /// Timestamp of the last event, or 0 for an empty request.
    pub fn total_duration_ms(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.timestamp_ms)
    }
}
