//! Playback state machine and tick stepping.
//!
//! `PlaybackCore` owns the playback state, the active key set and the current
//! session. It sits behind one mutex shared by the playback thread (which
//! calls `tick`) and out-of-band callers (panic, observers), so a panic stop
//! can never interleave with half a step.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use midikey_types::{KeyCombination, KeyPressDuration, NoteEvent, NoteKind, PlaybackFeedback, PlaybackState};

use super::active_keys::ActiveKeys;
use super::injector::KeyInjector;
use super::request::PlaybackRequest;
use crate::error::PlaybackError;
use crate::resolver::{trigger_label, MappingResolver};

/// Wall time to milliseconds without going through seconds, so whole
/// millisecond durations stay exact.
pub(crate) fn duration_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

struct TimedRelease {
    due_ms: f64,
    combo: KeyCombination,
}

struct Session {
    events: Vec<NoteEvent>,
    resolver: Arc<MappingResolver>,
    key_press_duration: KeyPressDuration,
    /// Index of the next event to fire.
    cursor: usize,
    countdown_ms: f64,
    /// Whole seconds left when the last countdown tick was reported.
    countdown_reported: u64,
    /// Held mode: what each sounding note pressed, oldest first per
    /// (channel, note). `None` marks a note-on that resolved to nothing.
    held: HashMap<(u8, u8), VecDeque<Option<KeyCombination>>>,
    /// Timed modes: pending releases ordered by due time.
    timed: Vec<TimedRelease>,
    last_progress_ms: Option<f64>,
}

impl Session {
    fn new(request: PlaybackRequest) -> Self {
        let countdown_ms = duration_ms(request.countdown);
        Self {
            events: request.events,
            resolver: request.resolver,
            key_press_duration: request.key_press_duration,
            cursor: 0,
            countdown_ms,
            countdown_reported: whole_seconds(countdown_ms),
            held: HashMap::new(),
            timed: Vec::new(),
            last_progress_ms: None,
        }
    }

    fn is_finished(&self) -> bool {
        self.cursor >= self.events.len() && self.timed.is_empty()
    }

    fn schedule_release(&mut self, due_ms: f64, combo: KeyCombination) {
        let idx = self.timed.partition_point(|r| r.due_ms <= due_ms);
        self.timed.insert(idx, TimedRelease { due_ms, combo });
    }

    fn clear_pending(&mut self) {
        self.held.clear();
        self.timed.clear();
    }

    /// Fire everything due at or before `position_ms`. Releases and events
    /// are merged in time order; a release due at the same time as an event
    /// goes first so a re-press of the same key is a real press.
    fn step(
        &mut self,
        position_ms: f64,
        keys: &mut ActiveKeys,
        injector: &dyn KeyInjector,
        feedback_tx: &Sender<PlaybackFeedback>,
    ) {
        loop {
            let next_release = self.timed.first().map(|r| r.due_ms);
            let next_event = self.events.get(self.cursor).map(|e| e.timestamp_ms);

            match (next_release, next_event) {
                (Some(due), event) if due <= position_ms && event.map_or(true, |t| due <= t) => {
                    let release = self.timed.remove(0);
                    keys.release(&release.combo, injector);
                }
                (_, Some(t)) if t <= position_ms => {
                    let event = self.events[self.cursor];
                    self.cursor += 1;
                    self.fire(&event, keys, injector, feedback_tx);
                }
                _ => break,
            }
        }
    }

    fn fire(
        &mut self,
        event: &NoteEvent,
        keys: &mut ActiveKeys,
        injector: &dyn KeyInjector,
        feedback_tx: &Sender<PlaybackFeedback>,
    ) {
        let slot = (event.channel, event.note);
        match event.kind {
            NoteKind::NoteOn => {
                let combo = self.resolver.resolve(event).cloned();
                if let Some(combo) = &combo {
                    keys.press(combo, injector);
                    let _ = feedback_tx.send(PlaybackFeedback::NoteTriggered(trigger_label(event, combo)));
                }
                match self.key_press_duration.hold_ms(event.velocity) {
                    None => self.held.entry(slot).or_default().push_back(combo),
                    Some(hold_ms) => {
                        if let Some(combo) = combo {
                            self.schedule_release(event.timestamp_ms + hold_ms, combo);
                        }
                    }
                }
            }
            NoteKind::NoteOff => {
                if !matches!(self.key_press_duration, KeyPressDuration::Held) {
                    return;
                }
                let paired = self.held.get_mut(&slot).and_then(|queue| queue.pop_front());
                if let Some(Some(combo)) = paired {
                    keys.release(&combo, injector);
                }
            }
        }
    }
}

fn whole_seconds(ms: f64) -> u64 {
    (ms.max(0.0) / 1000.0).ceil() as u64
}

/// Shared playback state: the state machine, the active key set and the
/// session being played.
pub struct PlaybackCore {
    state: PlaybackState,
    injector: Arc<dyn KeyInjector>,
    feedback_tx: Sender<PlaybackFeedback>,
    keys: ActiveKeys,
    session: Option<Session>,
    position_ms: f64,
    total_ms: f64,
    progress_interval_ms: f64,
    /// Bumped by every successful `play`.
    epoch: u64,
}

impl PlaybackCore {
    pub fn new(injector: Arc<dyn KeyInjector>, feedback_tx: Sender<PlaybackFeedback>) -> Self {
        Self {
            state: PlaybackState::Idle,
            injector,
            feedback_tx,
            keys: ActiveKeys::new(),
            session: None,
            position_ms: 0.0,
            total_ms: 0.0,
            progress_interval_ms: 100.0,
            epoch: 0,
        }
    }

    /// Minimum musical time between two `Progress` feedback messages.
    pub fn set_progress_interval(&mut self, interval: Duration) {
        self.progress_interval_ms = duration_ms(interval);
    }

    // ── Control ─────────────────────────────────────────────────────

    pub fn play(&mut self, request: PlaybackRequest) -> Result<(), PlaybackError> {
        if !self.state.can_play() {
            return Err(self.invalid("play"));
        }
        self.injector
            .acquire()
            .map_err(|e| PlaybackError::InjectionUnavailable(e.to_string()))?;

        if !self.keys.is_empty() {
            log::warn!(target: "playback", "{} keys still down before play, releasing", self.keys.len());
            self.keys.release_all(self.injector.as_ref());
        }

        let session = Session::new(request);
        self.epoch += 1;
        self.position_ms = 0.0;
        self.total_ms = session.events.last().map_or(0.0, |e| e.timestamp_ms);
        log::info!(
            target: "playback",
            "play: {} events, {:.0} ms",
            session.events.len(),
            self.total_ms
        );

        let countdown_ms = session.countdown_ms;
        self.session = Some(session);
        if countdown_ms > 0.0 {
            self.set_state(PlaybackState::Countdown);
            let _ = self.feedback_tx.send(PlaybackFeedback::CountdownTick { remaining_ms: countdown_ms });
        } else {
            self.set_state(PlaybackState::Playing);
        }
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        if self.state != PlaybackState::Playing {
            return Err(self.invalid("pause"));
        }
        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        if self.state != PlaybackState::Paused {
            return Err(self.invalid("resume"));
        }
        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    /// Jump to `position_ms` (clamped to the timeline). All held keys are
    /// released first; notes sounding across the target are not re-pressed.
    pub fn seek(&mut self, position_ms: f64) -> Result<(), PlaybackError> {
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            return Err(self.invalid("seek"));
        }
        if !position_ms.is_finite() {
            return Err(PlaybackError::InvalidOptions(format!("seek position {} is not finite", position_ms)));
        }
        let target = position_ms.clamp(0.0, self.total_ms);
        self.keys.release_all(self.injector.as_ref());
        if let Some(session) = self.session.as_mut() {
            session.clear_pending();
            session.cursor = session.events.partition_point(|e| e.timestamp_ms < target);
            session.last_progress_ms = None;
        }
        self.position_ms = target;
        log::debug!(target: "playback", "seek to {:.1} ms", target);
        self.report_progress();
        Ok(())
    }

    /// Release every held key and end the session.
    pub fn stop(&mut self) -> Result<(), PlaybackError> {
        if !self.state.has_session() {
            return Err(self.invalid("stop"));
        }
        let released = self.keys.release_all(self.injector.as_ref());
        self.session = None;
        log::info!(target: "playback", "stop: released {} keys", released);
        self.set_state(PlaybackState::Stopped);
        Ok(())
    }

    /// Emergency stop, legal from any state. Releases tracked keys in reverse
    /// press order, then asks the injector to release anything it may still
    /// hold. Returns the number of tracked keys released.
    pub fn panic_stop(&mut self) -> usize {
        let released = self.keys.release_all(self.injector.as_ref());
        if let Err(e) = self.injector.release_all() {
            log::warn!(target: "inject", "release all failed: {}", e);
        }
        self.session = None;
        log::warn!(target: "playback", "panic stop: released {} keys", released);
        self.set_state(PlaybackState::PanicStopped);
        released
    }

    /// Final cleanup when the playback thread exits.
    pub fn shutdown(&mut self) {
        let released = self.keys.release_all(self.injector.as_ref());
        if released > 0 {
            log::info!(target: "playback", "shutdown: released {} keys", released);
        }
        self.session = None;
        if self.state.has_session() {
            self.set_state(PlaybackState::Stopped);
        }
    }

    // ── Stepping ────────────────────────────────────────────────────

    /// Advance by `elapsed` wall time. Only Countdown and Playing move.
    pub fn tick(&mut self, elapsed: Duration) {
        match self.state {
            PlaybackState::Countdown => self.tick_countdown(duration_ms(elapsed)),
            PlaybackState::Playing => {
                self.position_ms += duration_ms(elapsed);
                self.step();
            }
            _ => {}
        }
    }

    fn tick_countdown(&mut self, elapsed_ms: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.countdown_ms -= elapsed_ms;
        if session.countdown_ms > 0.0 {
            let seconds = whole_seconds(session.countdown_ms);
            if seconds < session.countdown_reported {
                session.countdown_reported = seconds;
                let remaining_ms = session.countdown_ms;
                let _ = self.feedback_tx.send(PlaybackFeedback::CountdownTick { remaining_ms });
            }
            return;
        }
        let overshoot_ms = -session.countdown_ms;
        session.countdown_ms = 0.0;
        self.position_ms = overshoot_ms;
        self.set_state(PlaybackState::Playing);
        self.step();
    }

    fn step(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.step(self.position_ms, &mut self.keys, self.injector.as_ref(), &self.feedback_tx);
        let finished = session.is_finished();

        self.report_progress();
        if finished {
            self.finish();
        }
    }

    fn report_progress(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let due = session
            .last_progress_ms
            .map_or(true, |last| self.position_ms - last >= self.progress_interval_ms);
        if due {
            session.last_progress_ms = Some(self.position_ms);
            let _ = self.feedback_tx.send(PlaybackFeedback::Progress {
                position_ms: self.position_ms.min(self.total_ms),
                total_ms: self.total_ms,
            });
        }
    }

    fn finish(&mut self) {
        let lingering = self.keys.release_all(self.injector.as_ref());
        if lingering > 0 {
            log::warn!(target: "playback", "playback ended with {} keys still down, released", lingering);
        }
        self.session = None;
        let _ = self.feedback_tx.send(PlaybackFeedback::Progress {
            position_ms: self.total_ms,
            total_ms: self.total_ms,
        });
        log::info!(target: "playback", "playback complete");
        self.set_state(PlaybackState::Stopped);
    }

    fn set_state(&mut self, state: PlaybackState) {
        log::debug!(target: "playback", "{} -> {}", self.state, state);
        self.state = state;
        let _ = self.feedback_tx.send(PlaybackFeedback::StateChanged(state));
    }

    fn invalid(&self, op: &'static str) -> PlaybackError {
        PlaybackError::InvalidState { op, state: self.state }
    }

    // ── Observers ───────────────────────────────────────────────────

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Number of sessions started so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn position_ms(&self) -> f64 {
        self.position_ms
    }

    pub fn total_duration_ms(&self) -> f64 {
        self.total_ms
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }

    pub fn active_key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn is_key_active(&self, combo: &KeyCombination) -> bool {
        self.keys.contains(combo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::injector::{InjectOp, TestInjector};
    use midikey_types::{NoteMapping, NoteShift, PlaybackOptions, Timeline};
    use std::sync::mpsc::{self, Receiver};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn key(c: char) -> KeyCombination {
        KeyCombination::char(c)
    }

    fn core() -> (PlaybackCore, Arc<TestInjector>, Receiver<PlaybackFeedback>) {
        let injector = Arc::new(TestInjector::new());
        let (tx, rx) = mpsc::channel();
        (PlaybackCore::new(injector.clone(), tx), injector, rx)
    }

    fn single_note() -> Vec<NoteEvent> {
        vec![NoteEvent::note_on(0.0, 60, 100, 0), NoteEvent::note_off(500.0, 60, 0)]
    }

    fn a_on_60() -> Vec<NoteMapping> {
        vec![NoteMapping::new(60, key('a'))]
    }

    fn states(rx: &Receiver<PlaybackFeedback>) -> Vec<PlaybackState> {
        rx.try_iter()
            .filter_map(|fb| match fb {
                PlaybackFeedback::StateChanged(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn press_at_start_and_release_on_note_off() {
        let (mut core, injector, rx) = core();
        core.play(PlaybackRequest::new(single_note(), a_on_60())).unwrap();
        core.tick(Duration::ZERO);
        assert_eq!(injector.presses(), vec![key('a')]);
        assert!(core.is_key_active(&key('a')));

        core.tick(ms(499));
        assert!(injector.releases().is_empty());

        core.tick(ms(1));
        assert_eq!(injector.releases(), vec![key('a')]);
        assert_eq!(core.state(), PlaybackState::Stopped);
        assert_eq!(core.active_key_count(), 0);
        assert_eq!(
            states(&rx),
            vec![PlaybackState::Playing, PlaybackState::Stopped]
        );
    }

    #[test]
    fn double_tempo_releases_at_half_time() {
        let (mut core, injector, _rx) = core();
        let options = PlaybackOptions {
            tempo_multiplier: 2.0,
            ..PlaybackOptions::default()
        };
        let request =
            PlaybackRequest::prepare(&Timeline::new(single_note()), a_on_60(), &options, NoteShift::default()).unwrap();
        core.play(request).unwrap();
        core.tick(Duration::ZERO);
        core.tick(ms(249));
        assert!(injector.releases().is_empty());
        core.tick(ms(1));
        assert_eq!(injector.releases(), vec![key('a')]);
    }

    #[test]
    fn panic_mid_note_releases_before_returning() {
        let (mut core, injector, _rx) = core();
        core.play(PlaybackRequest::new(single_note(), a_on_60())).unwrap();
        core.tick(Duration::ZERO);
        core.tick(ms(10));

        assert_eq!(core.panic_stop(), 1);
        assert_eq!(core.state(), PlaybackState::PanicStopped);
        assert_eq!(core.active_key_count(), 0);
        assert_eq!(
            injector.operations(),
            vec![
                InjectOp::Press(key('a')),
                InjectOp::Release(key('a')),
                InjectOp::ReleaseAll
            ]
        );

        // nothing fires afterwards
        core.tick(ms(1000));
        assert_eq!(injector.presses().len(), 1);
    }

    #[test]
    fn panic_is_legal_from_idle() {
        let (mut core, injector, _rx) = core();
        assert_eq!(core.panic_stop(), 0);
        assert_eq!(core.state(), PlaybackState::PanicStopped);
        assert_eq!(injector.operations(), vec![InjectOp::ReleaseAll]);
        // a new session may start afterwards
        core.play(PlaybackRequest::new(single_note(), a_on_60())).unwrap();
        assert!(core.is_playing());
    }

    #[test]
    fn overlapping_notes_on_one_key_press_once() {
        let (mut core, injector, _rx) = core();
        let mappings = vec![NoteMapping::new(60, key('a')), NoteMapping::new(62, key('a'))];
        let events = vec![
            NoteEvent::note_on(0.0, 60, 100, 0),
            NoteEvent::note_on(10.0, 62, 100, 0),
            NoteEvent::note_off(20.0, 60, 0),
            NoteEvent::note_off(30.0, 62, 0),
        ];
        core.play(PlaybackRequest::new(events, mappings)).unwrap();
        core.tick(Duration::ZERO);
        core.tick(ms(20));
        assert_eq!(injector.presses(), vec![key('a')]);
        assert!(injector.releases().is_empty());
        assert!(core.is_key_active(&key('a')));

        core.tick(ms(10));
        assert_eq!(injector.releases(), vec![key('a')]);
    }

    #[test]
    fn overlapping_timed_presses_share_one_key() {
        let (mut core, injector, _rx) = core();
        let mappings = vec![NoteMapping::new(60, key('a')), NoteMapping::new(62, key('a'))];
        let events = vec![NoteEvent::note_on(0.0, 60, 100, 0), NoteEvent::note_on(50.0, 62, 100, 0)];
        let request = PlaybackRequest::new(events, mappings)
            .with_key_press_duration(KeyPressDuration::Fixed { ms: 100.0 });
        core.play(request).unwrap();
        core.tick(Duration::ZERO);
        core.tick(ms(50));
        assert_eq!(injector.presses(), vec![key('a')]);

        // first timer expires, second note still holds the key
        core.tick(ms(50));
        assert!(injector.releases().is_empty());
        assert!(core.is_key_active(&key('a')));

        core.tick(ms(50));
        assert_eq!(injector.releases(), vec![key('a')]);
        assert_eq!(core.state(), PlaybackState::Stopped);
    }

    #[test]
    fn note_below_velocity_threshold_never_presses() {
        let (mut core, injector, _rx) = core();
        let options = PlaybackOptions {
            velocity_threshold: 80,
            ..PlaybackOptions::default()
        };
        let timeline = Timeline::new(vec![
            NoteEvent::note_on(0.0, 60, 50, 0),
            NoteEvent::note_off(500.0, 60, 0),
        ]);
        let request = PlaybackRequest::prepare(&timeline, a_on_60(), &options, NoteShift::default()).unwrap();
        core.play(request).unwrap();
        core.tick(Duration::ZERO);
        core.tick(ms(600));
        assert!(injector.operations().is_empty());
        assert_eq!(core.state(), PlaybackState::Stopped);
    }

    #[test]
    fn stop_releases_everything_in_reverse_order() {
        let (mut core, injector, _rx) = core();
        let mappings = vec![NoteMapping::new(60, key('a')), NoteMapping::new(62, key('b'))];
        let events = vec![
            NoteEvent::note_on(0.0, 60, 100, 0),
            NoteEvent::note_on(0.0, 62, 100, 0),
            NoteEvent::note_off(1000.0, 60, 0),
            NoteEvent::note_off(1000.0, 62, 0),
        ];
        core.play(PlaybackRequest::new(events, mappings)).unwrap();
        core.tick(Duration::ZERO);
        core.stop().unwrap();
        assert_eq!(core.active_key_count(), 0);
        assert_eq!(injector.releases(), vec![key('b'), key('a')]);
        assert_eq!(core.state(), PlaybackState::Stopped);
    }

    #[test]
    fn control_ops_in_wrong_state_are_rejected() {
        let (mut core, _injector, _rx) = core();
        assert_eq!(
            core.stop(),
            Err(PlaybackError::InvalidState { op: "stop", state: PlaybackState::Idle })
        );
        assert!(core.pause().is_err());
        assert!(core.resume().is_err());
        assert!(core.seek(10.0).is_err());

        core.play(PlaybackRequest::new(single_note(), a_on_60())).unwrap();
        let err = core.play(PlaybackRequest::new(single_note(), a_on_60())).unwrap_err();
        assert_eq!(err, PlaybackError::InvalidState { op: "play", state: PlaybackState::Playing });
        assert!(core.resume().is_err());
        assert_eq!(core.state(), PlaybackState::Playing);
    }

    #[test]
    fn unavailable_injector_fails_play() {
        let (mut core, injector, _rx) = core();
        injector.set_unavailable(true);
        let err = core.play(PlaybackRequest::new(single_note(), a_on_60())).unwrap_err();
        assert!(matches!(err, PlaybackError::InjectionUnavailable(_)));
        assert_eq!(core.state(), PlaybackState::Idle);
    }

    #[test]
    fn fixed_duration_ignores_note_off() {
        let (mut core, injector, _rx) = core();
        let request = PlaybackRequest::new(single_note(), a_on_60())
            .with_key_press_duration(KeyPressDuration::Fixed { ms: 100.0 });
        core.play(request).unwrap();
        core.tick(Duration::ZERO);
        core.tick(ms(99));
        assert!(injector.releases().is_empty());
        core.tick(ms(1));
        assert_eq!(injector.releases(), vec![key('a')]);

        // the note-off at 500 releases nothing more
        core.tick(ms(400));
        assert_eq!(injector.releases().len(), 1);
        assert_eq!(core.state(), PlaybackState::Stopped);
    }

    #[test]
    fn velocity_based_duration_scales_with_velocity() {
        let (mut core, injector, _rx) = core();
        let events = vec![NoteEvent::note_on(0.0, 60, 127, 0)];
        let request = PlaybackRequest::new(events, a_on_60())
            .with_key_press_duration(KeyPressDuration::VelocityBased { min_ms: 100.0, max_ms: 300.0 });
        core.play(request).unwrap();
        core.tick(Duration::ZERO);
        core.tick(ms(299));
        assert_eq!(core.state(), PlaybackState::Playing);
        assert!(injector.releases().is_empty());
        core.tick(ms(1));
        assert_eq!(injector.releases(), vec![key('a')]);
        assert_eq!(core.state(), PlaybackState::Stopped);
    }

    #[test]
    fn due_release_goes_before_press_at_same_time() {
        let (mut core, injector, _rx) = core();
        let events = vec![
            NoteEvent::note_on(0.0, 60, 100, 0),
            NoteEvent::note_on(100.0, 60, 100, 0),
        ];
        let request = PlaybackRequest::new(events, a_on_60())
            .with_key_press_duration(KeyPressDuration::Fixed { ms: 100.0 });
        core.play(request).unwrap();
        core.tick(Duration::ZERO);
        core.tick(ms(100));
        assert_eq!(
            injector.operations(),
            vec![
                InjectOp::Press(key('a')),
                InjectOp::Release(key('a')),
                InjectOp::Press(key('a')),
            ]
        );
    }

    #[test]
    fn failed_press_does_not_stop_playback() {
        let (mut core, injector, _rx) = core();
        injector.fail_on(key('a'));
        let mappings = vec![NoteMapping::new(60, key('a')), NoteMapping::new(62, key('b'))];
        let events = vec![
            NoteEvent::note_on(0.0, 60, 100, 0),
            NoteEvent::note_on(10.0, 62, 100, 0),
            NoteEvent::note_off(20.0, 62, 0),
            NoteEvent::note_off(30.0, 60, 0),
        ];
        core.play(PlaybackRequest::new(events, mappings)).unwrap();
        core.tick(Duration::ZERO);
        core.tick(ms(30));
        assert_eq!(injector.presses(), vec![key('a'), key('b')]);
        // the failed key is still released when its note ends
        assert_eq!(injector.releases(), vec![key('b'), key('a')]);
        assert_eq!(core.state(), PlaybackState::Stopped);
    }

    #[test]
    fn unmapped_notes_do_nothing() {
        let (mut core, injector, rx) = core();
        let events = vec![NoteEvent::note_on(0.0, 61, 100, 0), NoteEvent::note_off(5.0, 61, 0)];
        core.play(PlaybackRequest::new(events, a_on_60())).unwrap();
        core.tick(Duration::ZERO);
        core.tick(ms(5));
        assert!(injector.operations().is_empty());
        assert!(!rx.try_iter().any(|fb| matches!(fb, PlaybackFeedback::NoteTriggered(_))));
    }

    #[test]
    fn pause_freezes_position_and_keeps_keys_down() {
        let (mut core, injector, _rx) = core();
        core.play(PlaybackRequest::new(single_note(), a_on_60())).unwrap();
        core.tick(Duration::ZERO);
        core.tick(ms(100));
        core.pause().unwrap();
        assert!(core.is_paused());

        core.tick(ms(1000));
        assert_eq!(core.position_ms(), 100.0);
        assert!(core.is_key_active(&key('a')));
        assert!(injector.releases().is_empty());

        core.resume().unwrap();
        core.tick(ms(400));
        assert_eq!(injector.releases(), vec![key('a')]);
    }

    #[test]
    fn seek_releases_held_keys_and_moves_cursor() {
        let (mut core, injector, _rx) = core();
        let mappings = vec![NoteMapping::new(60, key('a')), NoteMapping::new(62, key('b'))];
        let events = vec![
            NoteEvent::note_on(0.0, 60, 100, 0),
            NoteEvent::note_off(400.0, 60, 0),
            NoteEvent::note_on(500.0, 62, 100, 0),
            NoteEvent::note_off(600.0, 62, 0),
        ];
        core.play(PlaybackRequest::new(events, mappings)).unwrap();
        core.tick(Duration::ZERO);
        core.seek(500.0).unwrap();
        assert_eq!(core.active_key_count(), 0);
        assert_eq!(injector.releases(), vec![key('a')]);
        assert_eq!(core.position_ms(), 500.0);

        core.tick(Duration::ZERO);
        assert_eq!(injector.presses(), vec![key('a'), key('b')]);
        // the note-off at 400 was skipped and released nothing twice
        assert_eq!(injector.releases(), vec![key('a')]);
    }

    #[test]
    fn countdown_then_play() {
        let (mut core, injector, rx) = core();
        let request = PlaybackRequest::new(single_note(), a_on_60()).with_countdown(Duration::from_secs(2));
        core.play(request).unwrap();
        assert_eq!(core.state(), PlaybackState::Countdown);

        core.tick(ms(1500));
        assert!(injector.presses().is_empty());
        core.tick(ms(500));
        assert!(core.is_playing());
        assert_eq!(injector.presses(), vec![key('a')]);

        let ticks: Vec<f64> = rx
            .try_iter()
            .filter_map(|fb| match fb {
                PlaybackFeedback::CountdownTick { remaining_ms } => Some(remaining_ms),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![2000.0, 500.0]);
    }

    #[test]
    fn countdown_overshoot_carries_into_playback() {
        let (mut core, injector, _rx) = core();
        let request = PlaybackRequest::new(single_note(), a_on_60()).with_countdown(Duration::from_secs(1));
        core.play(request).unwrap();
        core.tick(ms(990));
        core.tick(ms(20));
        assert!(core.is_playing());
        assert_eq!(core.position_ms(), 10.0);
        assert_eq!(injector.presses(), vec![key('a')]);

        core.tick(ms(490));
        assert_eq!(injector.releases(), vec![key('a')]);
    }

    #[test]
    fn each_play_starts_a_new_epoch() {
        let (mut core, _injector, _rx) = core();
        assert_eq!(core.epoch(), 0);
        core.play(PlaybackRequest::new(single_note(), a_on_60())).unwrap();
        assert_eq!(core.epoch(), 1);
        core.panic_stop();
        assert_eq!(core.epoch(), 1);
        assert!(core.play(PlaybackRequest::new(single_note(), a_on_60())).is_ok());
        assert!(core.play(PlaybackRequest::new(single_note(), a_on_60())).is_err());
        assert_eq!(core.epoch(), 2);
    }

    #[test]
    fn panic_during_countdown_presses_nothing() {
        let (mut core, injector, _rx) = core();
        let request = PlaybackRequest::new(single_note(), a_on_60()).with_countdown(Duration::from_secs(3));
        core.play(request).unwrap();
        core.tick(ms(100));
        core.panic_stop();
        core.tick(ms(5000));
        assert!(injector.presses().is_empty());
        assert_eq!(core.state(), PlaybackState::PanicStopped);
    }

    #[test]
    fn stop_cancels_countdown() {
        let (mut core, injector, _rx) = core();
        let request = PlaybackRequest::new(single_note(), a_on_60()).with_countdown(Duration::from_secs(1));
        core.play(request).unwrap();
        core.stop().unwrap();
        core.tick(ms(2000));
        assert!(injector.operations().is_empty());
        assert_eq!(core.state(), PlaybackState::Stopped);
    }

    #[test]
    fn note_triggered_feedback_uses_labels() {
        let (mut core, _injector, rx) = core();
        core.play(PlaybackRequest::new(single_note(), a_on_60())).unwrap();
        core.tick(Duration::ZERO);
        let labels: Vec<String> = rx
            .try_iter()
            .filter_map(|fb| match fb {
                PlaybackFeedback::NoteTriggered(label) => Some(label),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec!["C4 -> A".to_string()]);
    }

    #[test]
    fn progress_is_throttled() {
        let (mut core, _injector, rx) = core();
        core.set_progress_interval(ms(100));
        let events = vec![NoteEvent::note_on(0.0, 61, 100, 0), NoteEvent::note_off(1000.0, 61, 0)];
        core.play(PlaybackRequest::new(events, vec![])).unwrap();
        core.tick(Duration::ZERO);
        for _ in 0..10 {
            core.tick(ms(10));
        }
        let positions: Vec<f64> = rx
            .try_iter()
            .filter_map(|fb| match fb {
                PlaybackFeedback::Progress { position_ms, .. } => Some(position_ms),
                _ => None,
            })
            .collect();
        assert_eq!(positions, vec![0.0, 100.0]);
    }

    #[test]
    fn empty_timeline_completes_immediately() {
        let (mut core, injector, _rx) = core();
        core.play(PlaybackRequest::new(vec![], a_on_60())).unwrap();
        core.tick(Duration::ZERO);
        assert_eq!(core.state(), PlaybackState::Stopped);
        assert!(injector.operations().is_empty());
    }

    #[test]
    fn orphan_note_off_is_ignored() {
        let (mut core, injector, _rx) = core();
        let events = vec![NoteEvent::note_off(0.0, 60, 0), NoteEvent::note_on(5.0, 60, 100, 0)];
        core.play(PlaybackRequest::new(events, a_on_60())).unwrap();
        core.tick(Duration::ZERO);
        core.tick(ms(5));
        // the orphan released nothing; completion releases the lingering key
        assert_eq!(
            injector.operations(),
            vec![InjectOp::Press(key('a')), InjectOp::Release(key('a'))]
        );
        assert_eq!(core.state(), PlaybackState::Stopped);
        assert_eq!(core.active_key_count(), 0);
    }

    #[test]
    fn shutdown_releases_and_stops() {
        let (mut core, injector, _rx) = core();
        core.play(PlaybackRequest::new(single_note(), a_on_60())).unwrap();
        core.tick(Duration::ZERO);
        core.shutdown();
        assert_eq!(injector.releases(), vec![key('a')]);
        assert_eq!(core.state(), PlaybackState::Stopped);
    }
}
