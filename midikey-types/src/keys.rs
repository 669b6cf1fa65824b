//! Keyboard keys and key combinations targeted by note mappings.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Modifier held together with a main key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Meta,
}

impl Modifier {
    pub fn name(&self) -> &'static str {
        match self {
            Modifier::Ctrl => "Ctrl",
            Modifier::Alt => "Alt",
            Modifier::Shift => "Shift",
            Modifier::Meta => "Meta",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "alt" | "option" => Some(Modifier::Alt),
            "shift" => Some(Modifier::Shift),
            "meta" | "super" | "win" | "cmd" => Some(Modifier::Meta),
            _ => None,
        }
    }
}

/// A non-modifier key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Printable character key. Letters are stored upper-case.
    Char(char),
    /// F1..=F24
    Function(u8),
    Space,
    Enter,
    Tab,
    Escape,
    Backspace,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
}

const NAMED_KEYS: [(&str, Key); 15] = [
    ("Space", Key::Space),
    ("Enter", Key::Enter),
    ("Tab", Key::Tab),
    ("Escape", Key::Escape),
    ("Backspace", Key::Backspace),
    ("Up", Key::Up),
    ("Down", Key::Down),
    ("Left", Key::Left),
    ("Right", Key::Right),
    ("Home", Key::Home),
    ("End", Key::End),
    ("PageUp", Key::PageUp),
    ("PageDown", Key::PageDown),
    ("Insert", Key::Insert),
    ("Delete", Key::Delete),
];

impl FromStr for Key {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_ascii_graphic() {
                return Ok(Key::Char(c.to_ascii_uppercase()));
            }
            return Err(format!("unsupported key character {:?}", c));
        }

        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "return" => return Ok(Key::Enter),
            "esc" => return Ok(Key::Escape),
            "del" => return Ok(Key::Delete),
            _ => {}
        }
        if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
            if (1..=24).contains(&n) {
                return Ok(Key::Function(n));
            }
            return Err(format!("function key F{} out of range", n));
        }
        NAMED_KEYS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, key)| *key)
            .ok_or_else(|| format!("unknown key '{}'", s))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{}", c),
            Key::Function(n) => write!(f, "F{}", n),
            named => {
                let name = NAMED_KEYS
                    .iter()
                    .find(|(_, key)| key == named)
                    .map(|(name, _)| *name)
                    .unwrap_or("?");
                f.write_str(name)
            }
        }
    }
}

/// A main key plus the modifiers held with it, e.g. `Ctrl+Shift+A`.
///
/// Identity (`Eq`/`Hash`) covers both parts, so `A` and `Shift+A` are
/// tracked as different keys while pressed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyCombination {
    pub key: Key,
    pub modifiers: BTreeSet<Modifier>,
}

impl KeyCombination {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            modifiers: BTreeSet::new(),
        }
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.insert(modifier);
        self
    }

    /// Shorthand for a bare character key.
    pub fn char(c: char) -> Self {
        Self::new(Key::Char(c.to_ascii_uppercase()))
    }
}

impl FromStr for KeyCombination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty key combination".to_string());
        }
        // A trailing "+" means the plus key itself ("Shift++").
        let (head, main) = match s.strip_suffix("++") {
            Some(rest) => (rest, "+"),
            None if s == "+" => ("", "+"),
            None => match s.rsplit_once('+') {
                Some((head, main)) => (head, main),
                None => ("", s),
            },
        };

        let mut modifiers = BTreeSet::new();
        for part in head.split('+').filter(|p| !p.trim().is_empty()) {
            let modifier = Modifier::parse(part.trim())
                .ok_or_else(|| format!("unknown modifier '{}' in '{}'", part.trim(), s))?;
            modifiers.insert(modifier);
        }

        Ok(Self {
            key: main.parse()?,
            modifiers,
        })
    }
}

impl TryFrom<String> for KeyCombination {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KeyCombination> for String {
    fn from(combo: KeyCombination) -> Self {
        combo.to_string()
    }
}

impl fmt::Display for KeyCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{}+", modifier.name())?;
        }
        write!(f, "{}", self.key)
    }
}
