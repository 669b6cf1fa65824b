#![allow(dead_code)]
//! Shared helpers for midikey-core engine tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use midikey_core::playback::{EngineSettings, PlaybackHandle, TestInjector};
use midikey_core::types::{KeyCombination, NoteEvent, NoteMapping, PlaybackState};

pub fn key(c: char) -> KeyCombination {
    KeyCombination::char(c)
}

/// Engine with a recording injector and a 1 ms tick.
pub fn engine() -> (PlaybackHandle, Arc<TestInjector>) {
    let injector = Arc::new(TestInjector::new());
    let settings = EngineSettings::default().with_tick_interval(Duration::from_millis(1));
    let handle = PlaybackHandle::with_settings(injector.clone(), settings);
    (handle, injector)
}

/// Note 60 held from 0 to `off_ms`.
pub fn held_note(off_ms: f64) -> Vec<NoteEvent> {
    vec![NoteEvent::note_on(0.0, 60, 100, 0), NoteEvent::note_off(off_ms, 60, 0)]
}

pub fn a_on_60() -> Vec<NoteMapping> {
    vec![NoteMapping::new(60, key('a'))]
}

/// Poll the handle until it reaches `state`, or panic after `timeout`.
pub fn wait_for_state(handle: &PlaybackHandle, state: PlaybackState, timeout: Duration) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if handle.state() == state {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!(
        "Timed out waiting for {} (still {})",
        state,
        handle.state()
    );
}
