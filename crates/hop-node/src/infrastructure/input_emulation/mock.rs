//! Mock platform input emulator.
//!
//! # Why a mock emulator?
//!
//! A real emulator moves the cursor and presses keys on whatever machine runs
//! it, which is neither observable nor welcome inside a test.  The
//! `MockInputEmulator` pushes each call into a `Mutex<Vec<...>>` instead, so
//! assertions can inspect exactly what was emitted and in what order.
//!
//! # `should_fail` flag
//!
//! Build with [`MockInputEmulator::failing`] to make every method return
//! [`EmulationError::Platform`], which exercises the callers' error paths.

use std::sync::{Mutex, PoisonError};

use hop_core::keymap::{HidKeyCode, ModifierFlags};
use tracing::trace;

use crate::application::emulate_input::{EmulationError, MouseButton, PlatformInputEmulator};

#[derive(Debug, Default)]
pub struct MockInputEmulator {
    pub key_downs: Mutex<Vec<(HidKeyCode, ModifierFlags)>>,
    pub key_ups: Mutex<Vec<(HidKeyCode, ModifierFlags)>>,
    pub mouse_moves: Mutex<Vec<(i32, i32)>>,
    pub mouse_buttons: Mutex<Vec<(MouseButton, bool)>>,
    pub scrolls: Mutex<Vec<(i32, i32)>>,
    /// When `true`, every method returns an error without recording.
    pub should_fail: bool,
}

impl MockInputEmulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Number of calls recorded across all methods.
    pub fn total_calls(&self) -> usize {
        len(&self.key_downs)
            + len(&self.key_ups)
            + len(&self.mouse_moves)
            + len(&self.mouse_buttons)
            + len(&self.scrolls)
    }

    fn record<T>(&self, log: &Mutex<Vec<T>>, entry: T) -> Result<(), EmulationError> {
        if self.should_fail {
            return Err(EmulationError::Platform("mock failure".into()));
        }
        log.lock().unwrap_or_else(PoisonError::into_inner).push(entry);
        Ok(())
    }
}

fn len<T>(log: &Mutex<Vec<T>>) -> usize {
    log.lock().unwrap_or_else(PoisonError::into_inner).len()
}

impl PlatformInputEmulator for MockInputEmulator {
    fn emit_key_down(&self, key: HidKeyCode, modifiers: ModifierFlags) -> Result<(), EmulationError> {
        trace!("key down {key:?} {modifiers:?}");
        self.record(&self.key_downs, (key, modifiers))
    }

    fn emit_key_up(&self, key: HidKeyCode, modifiers: ModifierFlags) -> Result<(), EmulationError> {
        trace!("key up {key:?}");
        self.record(&self.key_ups, (key, modifiers))
    }

    fn emit_mouse_move(&self, x: i32, y: i32) -> Result<(), EmulationError> {
        trace!("cursor to ({x}, {y})");
        self.record(&self.mouse_moves, (x, y))
    }

    fn emit_mouse_button(&self, button: MouseButton, pressed: bool) -> Result<(), EmulationError> {
        trace!("{button:?} button pressed={pressed}");
        self.record(&self.mouse_buttons, (button, pressed))
    }

    fn emit_mouse_scroll(&self, delta_x: i32, delta_y: i32) -> Result<(), EmulationError> {
        trace!("scroll ({delta_x}, {delta_y})");
        self.record(&self.scrolls, (delta_x, delta_y))
    }
}
