//! Key combinations and key events.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl Modifiers {
    /// Shift alone still produces text, so it does not count here.
    pub fn is_command(&self) -> bool {
        self.ctrl || self.alt || self.meta
    }
}

/// A normalized key combination such as `ctrl+shift+z`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCombo {
    pub modifiers: Modifiers,
    pub key: String,
}

impl KeyCombo {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || Error::InvalidKeyCombo(raw.to_string());
        let lowered = raw.trim().to_lowercase();
        let (prefix, plus_key) = match lowered.strip_suffix("++") {
            Some(prefix) => (prefix, true),
            None if lowered == "+" => ("", true),
            None => (lowered.as_str(), false),
        };

        let mut modifiers = Modifiers::default();
        let mut key = plus_key.then(|| "+".to_string());
        for token in prefix.split('+').filter(|token| !token.is_empty()) {
            match token.trim() {
                "ctrl" | "control" => modifiers.ctrl = true,
                "alt" | "option" | "opt" => modifiers.alt = true,
                "shift" => modifiers.shift = true,
                "meta" | "cmd" | "command" | "super" | "win" => modifiers.meta = true,
                other => {
                    if key.is_some() {
                        return Err(invalid());
                    }
                    key = Some(normalize_key(other).ok_or_else(invalid)?);
                }
            }
        }
        let key = key.ok_or_else(invalid)?;
        Ok(Self { modifiers, key })
    }

    pub fn is_single_key(&self) -> bool {
        !self.modifiers.is_command()
    }
}

fn normalize_key(key: &str) -> Option<String> {
    let key = key.trim().to_lowercase();
    let key = match key.as_str() {
        "" => return None,
        "esc" => "escape",
        "return" => "enter",
        "del" => "delete",
        "up" => "arrowup",
        "down" => "arrowdown",
        "left" => "arrowleft",
        "right" => "arrowright",
        "spacebar" => "space",
        other => other,
    };
    Some(key.to_string())
}

impl FromStr for KeyCombo {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        Self::parse(raw)
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Modifiers {
            ctrl,
            alt,
            shift,
            meta,
        } = self.modifiers;
        for (on, name) in [(ctrl, "ctrl"), (alt, "alt"), (shift, "shift"), (meta, "meta")] {
            if on {
                write!(f, "{name}+")?;
            }
        }
        f.write_str(&self.key)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EventTarget {
    #[default]
    Body,
    Input,
    Textarea,
    ContentEditable,
    Other,
}

impl EventTarget {
    pub fn is_editable(&self) -> bool {
        matches!(
            self,
            EventTarget::Input | EventTarget::Textarea | EventTarget::ContentEditable
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub combo: KeyCombo,
    pub target: EventTarget,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl KeyEvent {
    pub fn new(combo: KeyCombo, target: EventTarget) -> Self {
        Self {
            combo,
            target,
            default_prevented: false,
            propagation_stopped: false,
        }
    }

    pub fn parse(raw: &str, target: EventTarget) -> Result<Self> {
        Ok(Self::new(KeyCombo::parse(raw)?, target))
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

/// Per-binding overrides of how a handled event is treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventOptions {
    pub prevent_default: Option<bool>,
    pub stop_propagation: Option<bool>,
}

impl EventOptions {
    pub const GLOBAL_DEFAULT: EventOptions = EventOptions {
        prevent_default: Some(true),
        stop_propagation: Some(false),
    };

    /// Fills unset options from `fallback`.
    pub fn or(self, fallback: EventOptions) -> EventOptions {
        EventOptions {
            prevent_default: self.prevent_default.or(fallback.prevent_default),
            stop_propagation: self.stop_propagation.or(fallback.stop_propagation),
        }
    }
}
