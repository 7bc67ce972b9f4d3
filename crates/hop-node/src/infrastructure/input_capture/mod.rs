//! Input capture infrastructure.
//!
//! A capture source watches the local keyboard and mouse and reports button,
//! key, and wheel activity as [`CaptureEvent`]s.  Cursor *position* is not
//! part of the stream: the transition controller samples it on its own timer.
//!
//! While forwarding is enabled the source must also stop the OS from acting on
//! the captured input, so keystrokes meant for the neighbouring screen do not
//! also land on the local one.
//!
//! # Testability
//!
//! The [`InputSource`] trait lets tests and the headless binary inject
//! synthetic events through [`mock::MockInputSource`] instead of OS hooks.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::application::screen_transition::CaptureControl;

pub mod mock;

/// Bounded so a stalled event loop cannot grow memory without limit.
pub const CAPTURE_CHANNEL_CAPACITY: usize = 1024;

/// One captured input event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureEvent {
    MouseDown,
    MouseUp,
    /// A key went down; `code` is the capture key code (DOM `keyCode`).
    KeyDown { code: u8 },
    KeyUp { code: u8 },
    /// Wheel movement.  Only `dy` is forwarded.
    Scroll { dx: f64, dy: f64 },
}

/// Error type for input capture operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("capture source has not been started")]
    NotStarted,

    #[error("capture source has already been stopped")]
    AlreadyStopped,

    #[error("capture event channel is full")]
    ChannelFull,
}

/// A producer of [`CaptureEvent`]s that can also be told to swallow input.
pub trait InputSource: CaptureControl {
    /// Starts capturing and returns the receiving end of the event channel.
    fn start(&self) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError>;

    /// Stops capturing and closes the channel.
    fn stop(&self);
}
