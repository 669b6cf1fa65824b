use midikey_types::KeyCombination;

use super::injector::KeyInjector;

#[derive(Debug, Clone)]
struct ActiveKey {
    combo: KeyCombination,
    /// Number of overlapping presses currently holding this combination.
    holders: u32,
}

/// Key combinations currently held down, in press order.
///
/// Overlapping presses of the same combination are reference counted: the
/// injector sees one press when the first holder arrives and one release
/// when the last holder leaves. Every physically pressed combination stays
/// here until it is physically released.
#[derive(Debug, Default)]
pub struct ActiveKeys {
    keys: Vec<ActiveKey>,
}

impl ActiveKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a holder for `combo`. Returns true if this reached the injector.
    ///
    /// A failed press is logged and still tracked, so the combination will be
    /// released later: an extra release is harmless, a stuck key is not.
    pub fn press(&mut self, combo: &KeyCombination, injector: &dyn KeyInjector) -> bool {
        if let Some(active) = self.keys.iter_mut().find(|k| &k.combo == combo) {
            active.holders += 1;
            return false;
        }
        if let Err(e) = injector.press(combo) {
            log::warn!(target: "inject", "press {} failed: {}", combo, e);
        }
        self.keys.push(ActiveKey {
            combo: combo.clone(),
            holders: 1,
        });
        true
    }

    /// Drop one holder of `combo`. Returns true if the key was released.
    /// Releasing a combination that is not down does nothing.
    pub fn release(&mut self, combo: &KeyCombination, injector: &dyn KeyInjector) -> bool {
        let Some(pos) = self.keys.iter().position(|k| &k.combo == combo) else {
            return false;
        };
        if self.keys[pos].holders > 1 {
            self.keys[pos].holders -= 1;
            return false;
        }
        let active = self.keys.remove(pos);
        if let Err(e) = injector.release(&active.combo) {
            log::warn!(target: "inject", "release {} failed: {}", active.combo, e);
        }
        true
    }

    /// Release every held combination, most recent press first, regardless
    /// of holder counts. Failures are logged; the set is always empty after.
    pub fn release_all(&mut self, injector: &dyn KeyInjector) -> usize {
        let released = self.keys.len();
        while let Some(active) = self.keys.pop() {
            if let Err(e) = injector.release(&active.combo) {
                log::warn!(target: "inject", "release {} failed: {}", active.combo, e);
            }
        }
        released
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn contains(&self, combo: &KeyCombination) -> bool {
        self.keys.iter().any(|k| &k.combo == combo)
    }

    /// Holder count for `combo` (0 when not down).
    pub fn holders(&self, combo: &KeyCombination) -> u32 {
        self.keys
            .iter()
            .find(|k| &k.combo == combo)
            .map_or(0, |k| k.holders)
    }
}
