//! Control commands sent from handles to the playback thread.

use std::sync::mpsc::Sender;

use super::request::PlaybackRequest;
use crate::error::PlaybackError;

pub type Reply = Sender<Result<(), PlaybackError>>;

/// Commands either carry a reply channel (synchronous control operations)
/// or are fire-and-forget notifications.
#[derive(Debug)]
pub enum PlaybackCmd {
    Play {
        request: Box<PlaybackRequest>,
        reply: Reply,
    },
    Pause {
        reply: Reply,
    },
    Resume {
        reply: Reply,
    },
    Seek {
        position_ms: f64,
        reply: Reply,
    },
    Stop {
        reply: Reply,
    },
    /// Posted after a synchronous panic stop. `epoch` is the session epoch
    /// the panic ended; the thread re-anchors its clock unless a newer play
    /// has already started.
    Panic {
        epoch: u64,
    },
    Shutdown,
}

impl PlaybackCmd {
    /// Commands that must overtake anything queued on the normal channel.
    pub fn is_priority(&self) -> bool {
        matches!(
            self,
            PlaybackCmd::Panic { .. } | PlaybackCmd::Stop { .. } | PlaybackCmd::Pause { .. } | PlaybackCmd::Shutdown
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlaybackCmd::Play { .. } => "play",
            PlaybackCmd::Pause { .. } => "pause",
            PlaybackCmd::Resume { .. } => "resume",
            PlaybackCmd::Seek { .. } => "seek",
            PlaybackCmd::Stop { .. } => "stop",
            PlaybackCmd::Panic { .. } => "panic",
            PlaybackCmd::Shutdown => "shutdown",
        }
    }
}
