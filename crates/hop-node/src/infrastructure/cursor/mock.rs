//! In-memory cursor.
//!
//! `move_to` plays the user's hand; `teleport_cursor` is what the transition
//! controller calls.  Both update the same position, so a teleport is visible
//! to the next `get_cursor_pos`, just like a real OS cursor warp.

use std::sync::{Mutex, PoisonError};

use crate::application::screen_transition::CursorController;

#[derive(Debug, Default)]
pub struct MockCursorController {
    position: Mutex<(i32, i32)>,
    /// Every `(x, y)` passed to `teleport_cursor`, in order.
    pub teleports: Mutex<Vec<(i32, i32)>>,
}

impl MockCursorController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(x: i32, y: i32) -> Self {
        Self {
            position: Mutex::new((x, y)),
            ..Self::default()
        }
    }

    /// Moves the cursor as if the user had moved the mouse.
    pub fn move_to(&self, x: i32, y: i32) {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner) = (x, y);
    }

    pub fn last_teleport(&self) -> Option<(i32, i32)> {
        self.teleports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
    }
}

impl CursorController for MockCursorController {
    fn teleport_cursor(&self, x: i32, y: i32) {
        self.teleports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((x, y));
        self.move_to(x, y);
    }

    fn get_cursor_pos(&self) -> (i32, i32) {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teleport_is_visible_to_next_read() {
        let cursor = MockCursorController::at(10, 10);

        cursor.teleport_cursor(500, 500);

        assert_eq!(cursor.get_cursor_pos(), (500, 500));
        assert_eq!(cursor.last_teleport(), Some((500, 500)));
    }

    #[test]
    fn test_move_to_is_not_recorded_as_teleport() {
        let cursor = MockCursorController::new();

        cursor.move_to(3, 4);

        assert_eq!(cursor.get_cursor_pos(), (3, 4));
        assert!(cursor.teleports.lock().unwrap().is_empty());
    }
}
