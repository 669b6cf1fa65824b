//! Playback engine: a dedicated thread steps a transformed timeline and
//! drives a `KeyInjector`, while handles send control commands and read
//! feedback.

mod active_keys;
mod commands;
mod handle;
mod injector;
mod playback_thread;
mod request;
mod session;
mod telemetry;

use std::sync::{Mutex, MutexGuard};

pub use active_keys::ActiveKeys;
pub use commands::PlaybackCmd;
pub use handle::{EngineSettings, PanicTrigger, PlaybackHandle, PlaybackMonitor, MAX_TICK_INTERVAL, MIN_TICK_INTERVAL};
pub use injector::{InjectError, InjectOp, InjectResult, KeyInjector, LogInjector, TestInjector};
pub use request::PlaybackRequest;
pub use session::PlaybackCore;
pub use telemetry::{TickSummary, TickTelemetry};

/// Lock the shared core. A panic on another thread while holding the lock
/// must not prevent releasing keys, so poisoning is ignored.
pub(crate) fn lock_core(core: &Mutex<PlaybackCore>) -> MutexGuard<'_, PlaybackCore> {
    core.lock().unwrap_or_else(|e| e.into_inner())
}
