//! EmulateInputUseCase: replays forwarded input on the screen being entered.
//!
//! When a neighbour's cursor crosses onto this screen, the neighbour sends
//! `coord`, `md`/`mu`, `kd`/`ku`, and `wh` messages.  This use case turns each
//! one into a call on a [`PlatformInputEmulator`] trait object; the concrete
//! emulator lives in the infrastructure layer.

use std::sync::{Arc, Mutex, PoisonError};

use hop_core::event_bus::{EventBus, OwnerTag};
use hop_core::keymap::{capture_code_to_hid, HidKeyCode, ModifierFlags};
use hop_core::peering::{PeerEvent, CONNECTED};
use hop_core::protocol::messages::{
    Message, COORD, KEY_DOWN, KEY_UP, MOUSE_DOWN, MOUSE_UP, WHEEL,
};
use thiserror::Error;
use tracing::{debug, error};

/// The message types this use case consumes.
pub const EMULATED_MESSAGES: [&str; 6] = [COORD, MOUSE_DOWN, MOUSE_UP, KEY_DOWN, KEY_UP, WHEEL];

/// Error type for input emulation operations.
#[derive(Debug, Error)]
pub enum EmulationError {
    #[error("platform error: {0}")]
    Platform(String),
}

/// Mouse buttons an emulator can press.  `md`/`mu` carry no button, so only
/// the primary one is ever forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
}

/// Platform-agnostic input emulation trait.
pub trait PlatformInputEmulator: Send + Sync {
    fn emit_key_down(&self, key: HidKeyCode, modifiers: ModifierFlags) -> Result<(), EmulationError>;

    fn emit_key_up(&self, key: HidKeyCode, modifiers: ModifierFlags) -> Result<(), EmulationError>;

    /// Moves the cursor to an absolute position in local screen coordinates.
    fn emit_mouse_move(&self, x: i32, y: i32) -> Result<(), EmulationError>;

    fn emit_mouse_button(&self, button: MouseButton, pressed: bool) -> Result<(), EmulationError>;

    fn emit_mouse_scroll(&self, delta_x: i32, delta_y: i32) -> Result<(), EmulationError>;
}

/// Filters duplicate consecutive cursor positions.
#[derive(Default)]
struct DedupFilter {
    last_mouse_pos: Option<(i32, i32)>,
}

impl DedupFilter {
    fn should_send_mouse_move(&mut self, x: i32, y: i32) -> bool {
        if self.last_mouse_pos == Some((x, y)) {
            return false;
        }
        self.last_mouse_pos = Some((x, y));
        true
    }

    fn reset(&mut self) {
        self.last_mouse_pos = None;
    }
}

/// The Emulate Input use case.
pub struct EmulateInputUseCase {
    emulator: Arc<dyn PlatformInputEmulator>,
    dedup: DedupFilter,
}

impl EmulateInputUseCase {
    pub fn new(emulator: Arc<dyn PlatformInputEmulator>) -> Self {
        Self {
            emulator,
            dedup: DedupFilter::default(),
        }
    }

    /// Replays one forwarded message.
    ///
    /// Messages other than the six input types are ignored, as are key codes
    /// with no HID mapping.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError`] if the platform emulator fails.
    pub fn handle_message(&mut self, message: &Message) -> Result<(), EmulationError> {
        match message {
            Message::Coord { x, y } => {
                let (x, y) = (to_pixel(*x), to_pixel(*y));
                if self.dedup.should_send_mouse_move(x, y) {
                    self.emulator.emit_mouse_move(x, y)?;
                }
                Ok(())
            }
            Message::MouseDown => self.emulator.emit_mouse_button(MouseButton::Left, true),
            Message::MouseUp => self.emulator.emit_mouse_button(MouseButton::Left, false),
            Message::KeyDown { c, m } => match translate(*c) {
                Some(key) => self.emulator.emit_key_down(key, ModifierFlags::from_codes(m)),
                None => Ok(()),
            },
            Message::KeyUp { c } => match translate(*c) {
                Some(key) => self.emulator.emit_key_up(key, ModifierFlags::default()),
                None => Ok(()),
            },
            Message::Scroll { y } => self.emulator.emit_mouse_scroll(0, to_pixel(*y)),
            _ => Ok(()),
        }
    }

    /// Forgets the last emitted cursor position.  Called whenever a handshake
    /// completes, so the first `coord` of a new session always moves.
    pub fn reset(&mut self) {
        self.dedup.reset();
    }
}

/// Subscribes `use_case` to the six input message types on `bus`, and resets
/// it on every `CONNECTED`.
///
/// Emulator failures are logged and never propagate into the bus.  Returns
/// the owner tag under which the handlers were registered.
pub fn attach(use_case: Arc<Mutex<EmulateInputUseCase>>, bus: &EventBus<PeerEvent>) -> OwnerTag {
    let owner = OwnerTag::new();

    let on_connect = Arc::clone(&use_case);
    bus.subscribe_as(owner, CONNECTED, move |_| {
        on_connect
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    });

    for name in EMULATED_MESSAGES {
        let use_case = Arc::clone(&use_case);
        bus.subscribe_as(owner, name, move |event| {
            let PeerEvent::Inbound { envelope, .. } = event else {
                return;
            };
            let mut uc = use_case.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = uc.handle_message(&envelope.message) {
                error!("{} emulation error: {e}", envelope.message.kind());
            }
        });
    }
    owner
}

fn translate(code: u8) -> Option<HidKeyCode> {
    let hid = capture_code_to_hid(code);
    if hid == HidKeyCode::Unknown {
        debug!("skipping unmapped key code {code}");
        return None;
    }
    Some(hid)
}

/// Rounds to the nearest pixel, saturating at the `i32` range.
fn to_pixel(v: f64) -> i32 {
    v.round() as i32
}

// ── Tests ─────────────────────────────────────────────────────────────────────
