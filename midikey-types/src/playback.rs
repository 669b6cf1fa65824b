//! Playback state and the feedback messages the engine emits.

use serde::{Deserialize, Serialize};

/// Playback state machine.
///
/// ```text
/// Idle -> Countdown -> Playing <-> Paused -> Stopped
///   any state -> PanicStopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Idle,
    Countdown,
    Playing,
    Paused,
    Stopped,
    PanicStopped,
}

impl PlaybackState {
    /// A session exists in these states.
    pub fn has_session(&self) -> bool {
        matches!(
            self,
            PlaybackState::Countdown | PlaybackState::Playing | PlaybackState::Paused
        )
    }

    pub fn can_play(&self) -> bool {
        !self.has_session()
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Countdown => "countdown",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
            PlaybackState::PanicStopped => "panic-stopped",
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Feedback from the playback thread to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackFeedback {
    StateChanged(PlaybackState),
    /// Current musical position in (tempo-scaled) ms.
    Progress {
        position_ms: f64,
        total_ms: f64,
    },
    /// Human-readable description of a triggered note, e.g. "C4 -> Shift+A".
    NoteTriggered(String),
    CountdownTick {
        remaining_ms: f64,
    },
    /// Periodic tick-cost summary from the playback thread.
    TelemetrySummary {
        avg_tick_us: u32,
        max_tick_us: u32,
        p95_tick_us: u32,
        overruns: u64,
    },
}
