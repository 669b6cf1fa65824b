//! Runs one playback session in the terminal: feedback goes to stdout,
//! control keys come from stdin.

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError};

use midikey_core::playback::{EngineSettings, KeyInjector, PanicTrigger, PlaybackHandle, PlaybackRequest};
use midikey_types::{PlaybackFeedback, PlaybackState};
use midikey_core::PlaybackError;

const FEEDBACK_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    TogglePause,
    Stop,
}

/// Map one line of terminal input to a control. Panic is handled on the
/// input thread itself and never reaches the player loop.
pub fn parse_control(line: &str) -> Option<Control> {
    match line.trim() {
        "p" | "pause" => Some(Control::TogglePause),
        "s" | "stop" | "q" => Some(Control::Stop),
        _ => None,
    }
}

fn spawn_input_thread(panic: PanicTrigger) -> Receiver<Control> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let spawned = std::thread::Builder::new()
        .name("midikey-input".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim() == "!" {
                    let released = panic.trigger();
                    println!("panic: released {} keys", released);
                    continue;
                }
                if let Some(control) = parse_control(&line) {
                    if tx.send(control).is_err() {
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        log::warn!("no terminal controls: {}", e);
    }
    rx
}

/// Play `request` to completion (or until stopped) and return the final state.
pub fn run(
    injector: Arc<dyn KeyInjector>,
    settings: EngineSettings,
    request: PlaybackRequest,
) -> Result<PlaybackState, PlaybackError> {
    let handle = PlaybackHandle::with_settings(injector, settings);
    let controls = spawn_input_thread(handle.panic_trigger());

    handle.play(request)?;
    loop {
        if let Some(feedback) = handle.recv_feedback_timeout(FEEDBACK_POLL) {
            if let Some(state) = report(&feedback) {
                if matches!(state, PlaybackState::Stopped | PlaybackState::PanicStopped) {
                    return Ok(state);
                }
            }
        }

        match controls.try_recv() {
            Ok(Control::TogglePause) => {
                let result = if handle.is_paused() { handle.resume() } else { handle.pause() };
                if let Err(e) = result {
                    println!("{}", e);
                }
            }
            Ok(Control::Stop) => {
                if let Err(e) = handle.stop() {
                    println!("{}", e);
                }
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
        }
    }
}

/// Print one feedback message. Returns the new state for state changes.
fn report(feedback: &PlaybackFeedback) -> Option<PlaybackState> {
    match feedback {
        PlaybackFeedback::StateChanged(state) => {
            println!("[{}]", state);
            Some(*state)
        }
        PlaybackFeedback::Progress { position_ms, total_ms } => {
            log::debug!("position {:.0}/{:.0} ms", position_ms, total_ms);
            None
        }
        PlaybackFeedback::NoteTriggered(label) => {
            println!("  {}", label);
            None
        }
        PlaybackFeedback::CountdownTick { remaining_ms } => {
            println!("starting in {:.0}s", (remaining_ms / 1000.0).ceil());
            None
        }
        PlaybackFeedback::TelemetrySummary { .. } => None,
    }
}
