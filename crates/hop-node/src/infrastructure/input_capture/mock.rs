//! Mock input source for unit testing and the headless binary.
//!
//! Lets callers inject synthetic [`CaptureEvent`]s without OS hooks and
//! records every forwarding toggle the transition controller requests.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};

use super::{CaptureError, CaptureEvent, InputSource, CAPTURE_CHANNEL_CAPACITY};
use crate::application::screen_transition::CaptureControl;

/// A mock implementation of [`InputSource`] that allows tests to inject events.
#[derive(Debug, Default)]
pub struct MockInputSource {
    sender: Mutex<Option<mpsc::Sender<CaptureEvent>>>,
    /// Every value passed to `set_forwarding`, in order.
    pub forwarding_calls: Mutex<Vec<bool>>,
}

impl MockInputSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects a synthetic event, as if captured from hardware.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NotStarted`] before `start()` or after `stop()`, and
    /// [`CaptureError::ChannelFull`] if the consumer has fallen behind.
    pub fn inject_event(&self, event: CaptureEvent) -> Result<(), CaptureError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(CaptureError::NotStarted)?;
        sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => CaptureError::ChannelFull,
            TrySendError::Closed(_) => CaptureError::AlreadyStopped,
        })
    }

    /// The most recent forwarding state, `false` if never set.
    pub fn is_forwarding(&self) -> bool {
        self.forwarding_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
            .unwrap_or(false)
    }
}

impl CaptureControl for MockInputSource {
    fn set_forwarding(&self, forwarding: bool) {
        self.forwarding_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(forwarding);
    }
}

impl InputSource for MockInputSource {
    fn start(&self) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError> {
        let (tx, rx) = mpsc::channel(CAPTURE_CHANNEL_CAPACITY);
        *self.sender.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        // Dropping the sender closes the channel.
        *self.sender.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_before_start_returns_not_started() {
        let source = MockInputSource::new();

        let result = source.inject_event(CaptureEvent::MouseDown);

        assert_eq!(result, Err(CaptureError::NotStarted));
    }

    #[test]
    fn test_started_source_delivers_events_in_order() {
        // Arrange
        let source = MockInputSource::new();
        let mut rx = source.start().unwrap();

        // Act
        source.inject_event(CaptureEvent::KeyDown { code: 65 }).unwrap();
        source
            .inject_event(CaptureEvent::Scroll { dx: 0.0, dy: -3.0 })
            .unwrap();

        // Assert
        assert_eq!(rx.try_recv().unwrap(), CaptureEvent::KeyDown { code: 65 });
        assert_eq!(
            rx.try_recv().unwrap(),
            CaptureEvent::Scroll { dx: 0.0, dy: -3.0 }
        );
    }

    #[test]
    fn test_stop_closes_channel() {
        let source = MockInputSource::new();
        let mut rx = source.start().unwrap();

        source.stop();

        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(
            source.inject_event(CaptureEvent::MouseUp),
            Err(CaptureError::NotStarted)
        );
    }

    #[test]
    fn test_set_forwarding_is_recorded() {
        let source = MockInputSource::new();
        assert!(!source.is_forwarding());

        source.set_forwarding(true);
        source.set_forwarding(false);
        source.set_forwarding(true);

        assert!(source.is_forwarding());
        assert_eq!(*source.forwarding_calls.lock().unwrap(), vec![true, false, true]);
    }
}
