//! ScreenTransitionController: decides when the cursor leaves this screen.
//!
//! This use case is the heart of a serving node.  It samples the local cursor
//! on a timer, consults the [`ScreenLayout`] for edge crossings, and forwards
//! input to the neighbouring screen through a [`MessageSender`].
//!
//! # States (for beginners)
//!
//! ```text
//!            cursor reaches a configured edge
//!   OnScreen ─────────────────────────────────▶ OffScreen
//!      ▲                                            │
//!      └────────────────────────────────────────────┘
//!         virtual position moves back past the
//!         neighbour's entry edge
//! ```
//!
//! While **OffScreen** the physical cursor never actually leaves this screen.
//! Every sample measures how far the user moved it away from a fixed recentre
//! point, adds that displacement to a *virtual* position on the neighbour,
//! sends the virtual position as `coord`, and warps the cursor back to the
//! recentre point.  This is the "recentering" technique.
//!
//! # Architecture
//!
//! The controller depends only on traits (`CursorController`, `CaptureControl`,
//! `MessageSender`) and domain types.  All infrastructure implementations are
//! injected at construction time, making the use case fully unit-testable.

use std::sync::{Arc, PoisonError};

use hop_core::domain::layout::{
    entry_point, has_returned, reentry_point, Edge, EdgeRule, LayoutError, ScreenLayout,
};
use hop_core::keymap::HeldModifiers;
use hop_core::peering::{MessageSender, SharedNicknames};
use hop_core::protocol::messages::{Message, PeerId};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::infrastructure::input_capture::CaptureEvent;

/// Trait for controlling the physical cursor position.
///
/// A platform implementation warps the OS cursor; the test implementation
/// records calls.
pub trait CursorController: Send + Sync {
    /// Teleports the physical cursor to (x, y) in local screen coordinates.
    fn teleport_cursor(&self, x: i32, y: i32);

    /// Returns the current physical cursor position in local screen coordinates.
    fn get_cursor_pos(&self) -> (i32, i32);
}

/// Switches the capture source between "apply locally" and "forward".
pub trait CaptureControl: Send + Sync {
    /// `true` makes the capture source swallow input so it only reaches the
    /// neighbour; `false` lets input act on this screen again.
    fn set_forwarding(&self, forwarding: bool);
}

/// Why a crossing could not be performed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CrossingError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// The neighbour has not announced its nickname yet.
    #[error("screen '{neighbor}' is not connected")]
    NotConnected { neighbor: String },
}

/// Which screen currently owns the keyboard and mouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    OnScreen,
    OffScreen,
}

/// Everything fixed at the moment the cursor left, plus the running virtual
/// position on the neighbour.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveCrossing {
    pub peer: PeerId,
    pub neighbor: String,
    /// The local edge the cursor left through.
    pub exit_edge: Edge,
    pub exit_rule: EdgeRule,
    /// The neighbour's edge facing `exit_edge`.
    pub entry_rule: EdgeRule,
    pub virtual_x: f64,
    pub virtual_y: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum TransitionState {
    #[default]
    OnScreen,
    OffScreen(ActiveCrossing),
}

impl TransitionState {
    pub fn mode(&self) -> Mode {
        match self {
            TransitionState::OnScreen => Mode::OnScreen,
            TransitionState::OffScreen(_) => Mode::OffScreen,
        }
    }

    pub fn active(&self) -> Option<&ActiveCrossing> {
        match self {
            TransitionState::OnScreen => None,
            TransitionState::OffScreen(crossing) => Some(crossing),
        }
    }
}

/// A state change produced by [`ScreenTransitionController::tick`].
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Left { peer: PeerId, neighbor: String, edge: Edge },
    Returned { peer: PeerId, at: (i32, i32) },
}

/// The Screen Transition use case.
pub struct ScreenTransitionController {
    nickname: String,
    layout: ScreenLayout,
    nicknames: SharedNicknames,
    sender: Arc<dyn MessageSender>,
    cursor: Arc<dyn CursorController>,
    capture: Arc<dyn CaptureControl>,
    recenter: (i32, i32),
    state: TransitionState,
    last_sample: Option<(i32, i32)>,
    modifiers: HeldModifiers,
}

impl ScreenTransitionController {
    /// Creates a controller for the screen called `nickname`.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownScreen`] if `layout` has no entry for
    /// `nickname`.
    pub fn new(
        nickname: impl Into<String>,
        layout: ScreenLayout,
        nicknames: SharedNicknames,
        sender: Arc<dyn MessageSender>,
        cursor: Arc<dyn CursorController>,
        capture: Arc<dyn CaptureControl>,
        recenter: (i32, i32),
    ) -> Result<Self, LayoutError> {
        let nickname = nickname.into();
        if !layout.contains(&nickname) {
            return Err(LayoutError::UnknownScreen(nickname));
        }
        Ok(Self {
            nickname,
            layout,
            nicknames,
            sender,
            cursor,
            capture,
            recenter,
            state: TransitionState::OnScreen,
            last_sample: None,
            modifiers: HeldModifiers::default(),
        })
    }

    pub fn state(&self) -> &TransitionState {
        &self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode()
    }

    /// The peer currently receiving forwarded input.
    pub fn active_peer(&self) -> Option<PeerId> {
        self.state.active().map(|crossing| crossing.peer)
    }

    pub fn held_modifiers(&self) -> &HeldModifiers {
        &self.modifiers
    }

    // ── Sampling ──────────────────────────────────────────────────────────────

    /// Samples the cursor once and advances the state machine.
    ///
    /// A sample equal to the previous one does nothing at all.
    pub fn tick(&mut self) -> Option<Transition> {
        let pos = self.cursor.get_cursor_pos();
        if self.last_sample == Some(pos) {
            return None;
        }
        self.last_sample = Some(pos);

        match self.state {
            TransitionState::OnScreen => self.on_screen_sample(pos),
            TransitionState::OffScreen(_) => self.off_screen_sample(pos),
        }
    }

    fn on_screen_sample(&mut self, (x, y): (i32, i32)) -> Option<Transition> {
        let crossing = match self.plan_crossing(x, y) {
            Ok(Some(crossing)) => crossing,
            Ok(None) => return None,
            Err(e) => {
                warn!("crossing skipped: {e}");
                return None;
            }
        };

        info!(
            "cursor left through {} edge at ({x}, {y}); now on '{}' (peer {})",
            crossing.exit_edge, crossing.neighbor, crossing.peer
        );
        let transition = Transition::Left {
            peer: crossing.peer,
            neighbor: crossing.neighbor.clone(),
            edge: crossing.exit_edge,
        };
        self.state = TransitionState::OffScreen(crossing);
        self.recentre();
        self.capture.set_forwarding(true);
        Some(transition)
    }

    /// Works out the crossing for a local sample, if it reached an edge.
    fn plan_crossing(&self, x: i32, y: i32) -> Result<Option<ActiveCrossing>, CrossingError> {
        let local = self
            .layout
            .screen(&self.nickname)
            .ok_or_else(|| LayoutError::UnknownScreen(self.nickname.clone()))?;
        let (x, y) = (f64::from(x), f64::from(y));
        let Some((exit_edge, exit_rule)) = local.exit_at(x, y) else {
            return Ok(None);
        };

        let neighbor = exit_rule.neighbor.clone();
        let entry_rule = self.layout.rule(&neighbor, exit_edge.opposite())?.clone();
        let peer = self
            .nicknames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&neighbor)
            .ok_or_else(|| CrossingError::NotConnected {
                neighbor: neighbor.clone(),
            })?;

        let (virtual_x, virtual_y) = entry_point(exit_edge, exit_rule, &entry_rule, x, y);
        Ok(Some(ActiveCrossing {
            peer,
            neighbor,
            exit_edge,
            exit_rule: exit_rule.clone(),
            entry_rule,
            virtual_x,
            virtual_y,
        }))
    }

    fn off_screen_sample(&mut self, (x, y): (i32, i32)) -> Option<Transition> {
        let (cx, cy) = self.recenter;
        let TransitionState::OffScreen(crossing) = &mut self.state else {
            return None;
        };
        crossing.virtual_x += f64::from(x - cx);
        crossing.virtual_y += f64::from(y - cy);
        self.sender.send(
            crossing.peer,
            Message::Coord {
                x: crossing.virtual_x,
                y: crossing.virtual_y,
            },
        );
        let returned = has_returned(
            crossing.exit_edge,
            &crossing.entry_rule,
            crossing.virtual_x,
            crossing.virtual_y,
        );
        self.recentre();

        if !returned {
            return None;
        }
        match std::mem::take(&mut self.state) {
            TransitionState::OffScreen(crossing) => Some(self.return_home(crossing)),
            TransitionState::OnScreen => None,
        }
    }

    fn return_home(&mut self, crossing: ActiveCrossing) -> Transition {
        let (x, y) = reentry_point(
            crossing.exit_edge,
            &crossing.exit_rule,
            &crossing.entry_rule,
            crossing.virtual_x,
            crossing.virtual_y,
        );
        let at = (x.round() as i32, y.round() as i32);
        self.cursor.teleport_cursor(at.0, at.1);
        self.last_sample = Some(at);
        self.capture.set_forwarding(false);
        info!(
            "cursor returned from '{}' (peer {}) at ({}, {})",
            crossing.neighbor, crossing.peer, at.0, at.1
        );
        Transition::Returned {
            peer: crossing.peer,
            at,
        }
    }

    fn recentre(&mut self) {
        let (cx, cy) = self.recenter;
        self.cursor.teleport_cursor(cx, cy);
        self.last_sample = Some(self.recenter);
    }

    // ── Capture events ────────────────────────────────────────────────────────

    /// Handles one captured input event.
    ///
    /// Modifier keys update the held set in either mode and are never sent on
    /// their own.  Everything else is forwarded to the active peer while
    /// OffScreen and dropped while OnScreen.
    pub fn on_capture(&mut self, event: CaptureEvent) {
        let message = match event {
            CaptureEvent::MouseDown => Message::MouseDown,
            CaptureEvent::MouseUp => Message::MouseUp,
            CaptureEvent::KeyDown { code } => {
                if self.modifiers.press(code) {
                    return;
                }
                Message::KeyDown {
                    c: code,
                    m: self.modifiers.codes(),
                }
            }
            CaptureEvent::KeyUp { code } => {
                if self.modifiers.release(code) {
                    return;
                }
                Message::KeyUp { c: code }
            }
            CaptureEvent::Scroll { dy, .. } => Message::Scroll { y: dy },
        };

        match self.active_peer() {
            Some(peer) => self.sender.send(peer, message),
            None => trace!("on screen; not forwarding {}", message.kind()),
        }
    }

    /// Returns to OnScreen and stops forwarding.  Used on shutdown.
    pub fn reset(&mut self) {
        if let TransitionState::OffScreen(crossing) = std::mem::take(&mut self.state) {
            debug!("abandoning crossing to '{}'", crossing.neighbor);
            self.capture.set_forwarding(false);
        }
        self.last_sample = None;
        self.modifiers.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
