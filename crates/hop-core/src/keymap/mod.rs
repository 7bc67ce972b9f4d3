//! Key code translation and modifier bookkeeping.
//!
//! Capture codes travel on the wire unchanged; translation to HID usage ids
//! happens on the receiving side, just before emulation.

pub mod capture_codes;
pub mod hid;
pub mod modifiers;

pub use capture_codes::capture_code_to_hid;
pub use hid::HidKeyCode;
pub use modifiers::{HeldModifiers, ModifierFlags};
