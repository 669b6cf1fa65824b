//! PlaybackHandle: caller-side interface to the playback engine.
//!
//! Owns the command/feedback channels and the playback thread. Stepping
//! happens on the thread; panic and observers go straight to the shared core.

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender as CrossbeamSender;

use midikey_types::{PlaybackFeedback, PlaybackState};

use super::commands::{PlaybackCmd, Reply};
use super::injector::KeyInjector;
use super::lock_core;
use super::playback_thread::PlaybackThread;
use super::request::PlaybackRequest;
use super::session::PlaybackCore;
use crate::error::PlaybackError;

pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);
pub const MAX_TICK_INTERVAL: Duration = Duration::from_millis(20);

/// Playback thread timing.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Stepping period, 1..=20 ms.
    pub tick_interval: Duration,
    /// Minimum musical time between progress reports.
    pub progress_interval: Duration,
    pub telemetry_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(5),
            progress_interval: Duration::from_millis(100),
            telemetry_interval: Duration::from_secs(1),
        }
    }
}

impl EngineSettings {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.clamp(MIN_TICK_INTERVAL, MAX_TICK_INTERVAL);
        self
    }
}

/// Caller-side handle to the playback engine.
///
/// Control operations are synchronous: they go through the playback thread
/// and return its verdict. Dropping the handle releases every held key and
/// joins the thread.
pub struct PlaybackHandle {
    core: Arc<Mutex<PlaybackCore>>,
    priority_tx: CrossbeamSender<PlaybackCmd>,
    normal_tx: CrossbeamSender<PlaybackCmd>,
    feedback_rx: Receiver<PlaybackFeedback>,
    join_handle: Option<JoinHandle<()>>,
}

impl PlaybackHandle {
    pub fn new(injector: Arc<dyn KeyInjector>) -> Self {
        Self::with_settings(injector, EngineSettings::default())
    }

    pub fn with_settings(injector: Arc<dyn KeyInjector>, settings: EngineSettings) -> Self {
        let (priority_tx, priority_rx) = crossbeam_channel::unbounded();
        let (normal_tx, normal_rx) = crossbeam_channel::unbounded();
        let (feedback_tx, feedback_rx) = mpsc::channel();

        let mut core = PlaybackCore::new(injector, feedback_tx.clone());
        core.set_progress_interval(settings.progress_interval);
        let core = Arc::new(Mutex::new(core));

        let thread_core = Arc::clone(&core);
        let join_handle = thread::Builder::new()
            .name("midikey-playback".into())
            .spawn(move || {
                PlaybackThread::new(thread_core, priority_rx, normal_rx, feedback_tx, &settings).run();
            })
            .map_err(|e| log::error!(target: "playback", "cannot spawn playback thread: {}", e))
            .ok();

        Self {
            core,
            priority_tx,
            normal_tx,
            feedback_rx,
            join_handle,
        }
    }

    /// Send a command to the playback thread, routing to priority or normal
    /// channel.
    pub fn send_cmd(&self, cmd: PlaybackCmd) -> Result<(), PlaybackError> {
        let tx = if cmd.is_priority() { &self.priority_tx } else { &self.normal_tx };
        tx.send(cmd).map_err(|_| PlaybackError::Disconnected)
    }

    fn request(&self, build: impl FnOnce(Reply) -> PlaybackCmd) -> Result<(), PlaybackError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send_cmd(build(reply_tx))?;
        reply_rx.recv().map_err(|_| PlaybackError::Disconnected)?
    }

    pub fn play(&self, request: PlaybackRequest) -> Result<(), PlaybackError> {
        self.request(|reply| PlaybackCmd::Play {
            request: Box::new(request),
            reply,
        })
    }

    pub fn pause(&self) -> Result<(), PlaybackError> {
        self.request(|reply| PlaybackCmd::Pause { reply })
    }

    pub fn resume(&self) -> Result<(), PlaybackError> {
        self.request(|reply| PlaybackCmd::Resume { reply })
    }

    pub fn seek(&self, position_ms: f64) -> Result<(), PlaybackError> {
        self.request(|reply| PlaybackCmd::Seek { position_ms, reply })
    }

    pub fn stop(&self) -> Result<(), PlaybackError> {
        self.request(|reply| PlaybackCmd::Stop { reply })
    }

    /// Emergency stop. Keys are released under the core lock before this
    /// returns, whether or not the playback thread is responsive.
    pub fn panic_stop(&self) -> usize {
        self.panic_trigger().trigger()
    }

    /// Cloneable panic entry point for hotkey listeners and other threads.
    pub fn panic_trigger(&self) -> PanicTrigger {
        PanicTrigger {
            core: Arc::clone(&self.core),
            priority_tx: self.priority_tx.clone(),
        }
    }

    /// Cloneable read-only view for observers on other threads.
    pub fn monitor(&self) -> PlaybackMonitor {
        PlaybackMonitor {
            core: Arc::clone(&self.core),
        }
    }

    pub fn state(&self) -> PlaybackState {
        lock_core(&self.core).state()
    }

    pub fn position_ms(&self) -> f64 {
        lock_core(&self.core).position_ms()
    }

    pub fn total_duration_ms(&self) -> f64 {
        lock_core(&self.core).total_duration_ms()
    }

    pub fn is_playing(&self) -> bool {
        lock_core(&self.core).is_playing()
    }

    pub fn is_paused(&self) -> bool {
        lock_core(&self.core).is_paused()
    }

    pub fn active_key_count(&self) -> usize {
        lock_core(&self.core).active_key_count()
    }

    /// Non-blocking: everything queued since the last drain.
    pub fn drain_feedback(&self) -> Vec<PlaybackFeedback> {
        self.feedback_rx.try_iter().collect()
    }

    /// Block up to `timeout` for the next feedback message.
    pub fn recv_feedback_timeout(&self, timeout: Duration) -> Option<PlaybackFeedback> {
        self.feedback_rx.recv_timeout(timeout).ok()
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        lock_core(&self.core).shutdown();
        let _ = self.send_cmd(PlaybackCmd::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Out-of-band panic stop, safe to call from any thread at any time.
#[derive(Clone)]
pub struct PanicTrigger {
    core: Arc<Mutex<PlaybackCore>>,
    priority_tx: CrossbeamSender<PlaybackCmd>,
}

impl PanicTrigger {
    /// Release everything now, then tell the playback thread. Returns the
    /// number of tracked keys released.
    pub fn trigger(&self) -> usize {
        let (released, epoch) = {
            let mut core = lock_core(&self.core);
            (core.panic_stop(), core.epoch())
        };
        if self.priority_tx.send(PlaybackCmd::Panic { epoch }).is_err() {
            log::debug!(target: "playback", "panic: playback thread already gone");
        }
        released
    }
}

/// Read-only access to playback state from other threads.
#[derive(Clone)]
pub struct PlaybackMonitor {
    core: Arc<Mutex<PlaybackCore>>,
}

impl PlaybackMonitor {
    pub fn state(&self) -> PlaybackState {
        lock_core(&self.core).state()
    }

    pub fn position_ms(&self) -> f64 {
        lock_core(&self.core).position_ms()
    }

    pub fn total_duration_ms(&self) -> f64 {
        lock_core(&self.core).total_duration_ms()
    }

    pub fn is_playing(&self) -> bool {
        lock_core(&self.core).is_playing()
    }

    pub fn is_paused(&self) -> bool {
        lock_core(&self.core).is_paused()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_interval_is_clamped() {
        let s = EngineSettings::default().with_tick_interval(Duration::from_millis(50));
        assert_eq!(s.tick_interval, MAX_TICK_INTERVAL);
        let s = EngineSettings::default().with_tick_interval(Duration::ZERO);
        assert_eq!(s.tick_interval, MIN_TICK_INTERVAL);
        assert_eq!(EngineSettings::default().tick_interval, Duration::from_millis(5));
    }
}
