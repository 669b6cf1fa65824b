//! Keystroke injector trait: the boundary to the platform's key press/release
//! primitive.
//!
//! The engine only says *which* key combination goes down or up; how that
//! reaches the OS is up to the implementation. `TestInjector` records every
//! action so engine behaviour can be asserted without touching a keyboard.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use midikey_types::KeyCombination;

/// Result type for injector operations.
pub type InjectResult<T = ()> = Result<T, InjectError>;

/// A single injection action that did not go through.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectError(pub String);

impl fmt::Display for InjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for InjectError {}

/// Platform keystroke primitive.
///
/// Methods report failure instead of panicking. Implementations are shared
/// between the playback thread and out-of-band panic callers, hence
/// `Send + Sync`.
pub trait KeyInjector: Send + Sync {
    /// Called once per `play`. Failure makes that `play` fail with
    /// `InjectionUnavailable`.
    fn acquire(&self) -> InjectResult {
        Ok(())
    }

    /// Press the modifiers, then the main key, and keep them down.
    fn press(&self, combo: &KeyCombination) -> InjectResult;

    /// Release the main key, then the modifiers.
    fn release(&self, combo: &KeyCombination) -> InjectResult;

    /// Release everything the injector may have pressed, independent of the
    /// engine's own bookkeeping. Last-resort safety net.
    fn release_all(&self) -> InjectResult;
}

// ─── LogInjector ────────────────────────────────────────────────────

/// Dry-run injector: logs every action and never touches the keyboard.
#[derive(Debug, Default)]
pub struct LogInjector;

impl KeyInjector for LogInjector {
    fn press(&self, combo: &KeyCombination) -> InjectResult {
        log::info!(target: "inject", "press {}", combo);
        Ok(())
    }

    fn release(&self, combo: &KeyCombination) -> InjectResult {
        log::info!(target: "inject", "release {}", combo);
        Ok(())
    }

    fn release_all(&self) -> InjectResult {
        log::info!(target: "inject", "release all");
        Ok(())
    }
}

// ─── TestInjector ───────────────────────────────────────────────────

/// A recorded injector action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectOp {
    Press(KeyCombination),
    Release(KeyCombination),
    ReleaseAll,
}

/// Records every operation for assertions. All operations succeed unless a
/// combination was marked failing or the injector was made unavailable.
/// Failed operations are still recorded.
pub struct TestInjector {
    ops: Mutex<Vec<InjectOp>>,
    failing: Mutex<HashSet<KeyCombination>>,
    unavailable: AtomicBool,
}

impl TestInjector {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Return all recorded operations.
    pub fn operations(&self) -> Vec<InjectOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Clear recorded operations.
    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }

    pub fn presses(&self) -> Vec<KeyCombination> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                InjectOp::Press(combo) => Some(combo.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn releases(&self) -> Vec<KeyCombination> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                InjectOp::Release(combo) => Some(combo.clone()),
                _ => None,
            })
            .collect()
    }

    /// Count operations matching a predicate.
    pub fn count<F: Fn(&InjectOp) -> bool>(&self, f: F) -> usize {
        self.ops.lock().unwrap().iter().filter(|op| f(op)).count()
    }

    /// Make press/release of `combo` report failure from now on.
    pub fn fail_on(&self, combo: KeyCombination) {
        self.failing.lock().unwrap().insert(combo);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn record(&self, op: InjectOp, combo: &KeyCombination) -> InjectResult {
        self.ops.lock().unwrap().push(op);
        if self.failing.lock().unwrap().contains(combo) {
            Err(InjectError(format!("simulated failure for {}", combo)))
        } else {
            Ok(())
        }
    }
}

impl KeyInjector for TestInjector {
    fn acquire(&self) -> InjectResult {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(InjectError("test injector unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn press(&self, combo: &KeyCombination) -> InjectResult {
        self.record(InjectOp::Press(combo.clone()), combo)
    }

    fn release(&self, combo: &KeyCombination) -> InjectResult {
        self.record(InjectOp::Release(combo.clone()), combo)
    }

    fn release_all(&self) -> InjectResult {
        self.ops.lock().unwrap().push(InjectOp::ReleaseAll);
        Ok(())
    }
}

impl Default for TestInjector {
    fn default() -> Self {
        Self::new()
    }
}
