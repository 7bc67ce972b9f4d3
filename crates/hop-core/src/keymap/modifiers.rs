//! Held-modifier tracking.
//!
//! Alt, command, control, and shift are never forwarded as key events of their
//! own.  The sending side keeps a standing set of the ones currently held and
//! attaches it to every ordinary key-down as the `m` field; the receiving side
//! turns that list back into [`ModifierFlags`].

use serde::{Deserialize, Serialize};

pub const SHIFT: u8 = 16;
pub const CONTROL: u8 = 17;
pub const ALT: u8 = 18;
pub const COMMAND: u8 = 91;

/// Returns `true` if `code` is one of the tracked modifier key codes.
pub fn is_modifier(code: u8) -> bool {
    matches!(code, SHIFT | CONTROL | ALT | COMMAND)
}

/// The modifier keys held down at the time of a key event, as a bit set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModifierFlags(pub u8);

impl ModifierFlags {
    pub const CONTROL: u8 = 1 << 0;
    pub const SHIFT: u8 = 1 << 1;
    pub const ALT: u8 = 1 << 2;
    pub const META: u8 = 1 << 3;

    /// Builds flags from a list of capture codes.  Non-modifier codes are
    /// ignored.
    pub fn from_codes(codes: &[u8]) -> Self {
        let bits = codes.iter().fold(0u8, |acc, &code| {
            acc | match code {
                CONTROL => Self::CONTROL,
                SHIFT => Self::SHIFT,
                ALT => Self::ALT,
                COMMAND => Self::META,
                _ => 0,
            }
        });
        Self(bits)
    }

    pub fn ctrl(&self) -> bool {
        self.0 & Self::CONTROL != 0
    }

    pub fn shift(&self) -> bool {
        self.0 & Self::SHIFT != 0
    }

    pub fn alt(&self) -> bool {
        self.0 & Self::ALT != 0
    }

    pub fn meta(&self) -> bool {
        self.0 & Self::META != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// The set of modifier codes currently held, in press order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeldModifiers {
    held: Vec<u8>,
}

impl HeldModifiers {
    /// Records a key-down.  Returns `true` if `code` is a modifier (and so was
    /// absorbed rather than needing to be forwarded).
    pub fn press(&mut self, code: u8) -> bool {
        if !is_modifier(code) {
            return false;
        }
        if !self.held.contains(&code) {
            self.held.push(code);
        }
        true
    }

    /// Records a key-up.  Returns `true` if `code` is a modifier.
    pub fn release(&mut self, code: u8) -> bool {
        if !is_modifier(code) {
            return false;
        }
        self.held.retain(|&held| held != code);
        true
    }

    pub fn codes(&self) -> Vec<u8> {
        self.held.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }
}
