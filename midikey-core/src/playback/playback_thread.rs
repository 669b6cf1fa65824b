use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};

use midikey_types::PlaybackFeedback;

use super::commands::PlaybackCmd;
use super::handle::{EngineSettings, MAX_TICK_INTERVAL, MIN_TICK_INTERVAL};
use super::lock_core;
use super::session::PlaybackCore;
use super::telemetry::TickTelemetry;

pub(crate) struct PlaybackThread {
    core: Arc<Mutex<PlaybackCore>>,
    /// Priority commands: panic, stop, pause, shutdown
    priority_rx: Receiver<PlaybackCmd>,
    /// Normal commands: play, resume, seek
    normal_rx: Receiver<PlaybackCmd>,
    feedback_tx: Sender<PlaybackFeedback>,
    tick_interval: Duration,
    telemetry_interval: Duration,
    telemetry: TickTelemetry,
    last_tick: Instant,
    last_telemetry_emit: Instant,
}

impl PlaybackThread {
    pub(crate) fn new(
        core: Arc<Mutex<PlaybackCore>>,
        priority_rx: Receiver<PlaybackCmd>,
        normal_rx: Receiver<PlaybackCmd>,
        feedback_tx: Sender<PlaybackFeedback>,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            core,
            priority_rx,
            normal_rx,
            feedback_tx,
            tick_interval: settings.tick_interval.clamp(MIN_TICK_INTERVAL, MAX_TICK_INTERVAL),
            telemetry_interval: settings.telemetry_interval,
            telemetry: TickTelemetry::new(),
            last_tick: Instant::now(),
            last_telemetry_emit: Instant::now(),
        }
    }

    pub(crate) fn run(mut self) {
        log::debug!(target: "playback", "playback thread started, tick {:?}", self.tick_interval);

        loop {
            // Waiting on both channels with the remaining tick time as timeout
            // means stop/panic wake the thread immediately.
            let remaining = self.tick_interval.saturating_sub(self.last_tick.elapsed());

            crossbeam_channel::select! {
                recv(self.priority_rx) -> result => {
                    match result {
                        Ok(cmd) => {
                            if self.handle_cmd(cmd) {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                recv(self.normal_rx) -> result => {
                    match result {
                        Ok(cmd) => {
                            if self.handle_cmd(cmd) {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                default(remaining) => {}
            }

            if self.drain_priority_commands() {
                break;
            }
            if self.drain_normal_commands() {
                break;
            }

            let now = Instant::now();
            let elapsed = now.duration_since(self.last_tick);
            if elapsed >= self.tick_interval {
                self.last_tick = now;
                self.tick(elapsed);
            }
        }

        lock_core(&self.core).shutdown();
        log::debug!(target: "playback", "playback thread exited");
    }

    fn drain_priority_commands(&mut self) -> bool {
        const MAX_DRAIN_PER_TICK: usize = 64;
        for _ in 0..MAX_DRAIN_PER_TICK {
            match self.priority_rx.try_recv() {
                Ok(cmd) => {
                    if self.handle_cmd(cmd) {
                        return true;
                    }
                }
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
        false
    }

    fn drain_normal_commands(&mut self) -> bool {
        const MAX_DRAIN_PER_TICK: usize = 16;
        for _ in 0..MAX_DRAIN_PER_TICK {
            match self.normal_rx.try_recv() {
                Ok(cmd) => {
                    if self.handle_cmd(cmd) {
                        return true;
                    }
                }
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
        false
    }

    /// Returns true when the thread should exit.
    fn handle_cmd(&mut self, cmd: PlaybackCmd) -> bool {
        log::trace!(target: "playback", "command: {}", cmd.name());
        match cmd {
            PlaybackCmd::Play { request, reply } => {
                let result = lock_core(&self.core).play(*request);
                if result.is_ok() {
                    // Events at t=0 fire before the caller gets its reply.
                    self.last_tick = Instant::now();
                    self.tick(Duration::ZERO);
                }
                let _ = reply.send(result);
            }
            PlaybackCmd::Pause { reply } => {
                let _ = reply.send(lock_core(&self.core).pause());
            }
            PlaybackCmd::Resume { reply } => {
                let result = lock_core(&self.core).resume();
                if result.is_ok() {
                    self.last_tick = Instant::now();
                }
                let _ = reply.send(result);
            }
            PlaybackCmd::Seek { position_ms, reply } => {
                let result = lock_core(&self.core).seek(position_ms);
                if result.is_ok() {
                    self.last_tick = Instant::now();
                    self.tick(Duration::ZERO);
                }
                let _ = reply.send(result);
            }
            PlaybackCmd::Stop { reply } => {
                let _ = reply.send(lock_core(&self.core).stop());
            }
            PlaybackCmd::Panic { epoch } => {
                // Keys were released under the lock by the caller. A play
                // handled since then owns the clock now.
                if lock_core(&self.core).epoch() == epoch {
                    self.last_tick = Instant::now();
                } else {
                    log::debug!(target: "playback", "panic notice for epoch {} overtaken by play", epoch);
                }
            }
            PlaybackCmd::Shutdown => return true,
        }
        false
    }

    fn tick(&mut self, elapsed: Duration) {
        let started = Instant::now();
        let active = {
            let mut core = lock_core(&self.core);
            core.tick(elapsed);
            core.state().has_session()
        };
        if !active {
            return;
        }
        self.telemetry.record(started.elapsed(), self.tick_interval);

        if self.last_telemetry_emit.elapsed() >= self.telemetry_interval {
            self.last_telemetry_emit = Instant::now();
            let summary = self.telemetry.take_summary();
            log::debug!(
                target: "playback",
                "tick cost avg {}us max {}us p95 {}us, {} overruns",
                summary.avg_us,
                summary.max_us,
                summary.p95_us,
                summary.overruns
            );
            let _ = self.feedback_tx.send(summary.into());
        }
    }
}
