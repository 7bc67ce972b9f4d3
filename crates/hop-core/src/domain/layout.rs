//! Static screen layout and edge-crossing arithmetic.
//!
//! Every screen is identified by its nickname and may declare up to four edge
//! rules.  A rule says: "past this `boundary`, while the perpendicular
//! coordinate lies in `[low, high]`, the cursor belongs to `neighbor`".
//!
//! # The percent remap (for beginners)
//!
//! Two neighbouring screens rarely have the same size.  When the cursor leaves
//! through the right edge of a 1080-pixel-tall screen at `y = 540`, it is 50%
//! of the way down that edge.  It should appear 50% of the way down the
//! neighbour's left edge, whatever that edge's length:
//!
//! ```text
//! percent  = (y - exit.low) / (exit.high - exit.low)
//! entry_y  = entry.low + percent * (entry.high - entry.low)
//! ```
//!
//! The return trip applies the same formula with the two rules swapped.
//!
//! # Exit vs. return tests
//!
//! Leaving the local screen is tested inclusively on the real cursor (`x >= b`
//! for a right edge) because the OS clamps the cursor to the last pixel.
//! Returning is tested strictly on the accumulated virtual position (`x < b`
//! for the neighbour's left edge) because the entry point sits exactly on the
//! boundary.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The four edges of a screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

impl Edge {
    /// Order in which a screen's edges are tested for an exit.
    pub const EXIT_ORDER: [Edge; 4] = [Edge::Right, Edge::Left, Edge::Bottom, Edge::Top];

    /// The edge of the neighbour that faces this one.
    pub fn opposite(self) -> Edge {
        match self {
            Edge::Left => Edge::Right,
            Edge::Right => Edge::Left,
            Edge::Top => Edge::Bottom,
            Edge::Bottom => Edge::Top,
        }
    }

    /// `true` for left/right, whose boundary is an x coordinate.
    pub fn is_vertical(self) -> bool {
        matches!(self, Edge::Left | Edge::Right)
    }

    /// Splits `(x, y)` into (crossing-axis, perpendicular-axis) for this edge.
    fn split(self, x: f64, y: f64) -> (f64, f64) {
        if self.is_vertical() {
            (x, y)
        } else {
            (y, x)
        }
    }

    /// Inverse of [`Edge::split`].
    fn join(self, crossing: f64, perpendicular: f64) -> (f64, f64) {
        if self.is_vertical() {
            (crossing, perpendicular)
        } else {
            (perpendicular, crossing)
        }
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Edge::Left => "left",
            Edge::Right => "right",
            Edge::Top => "top",
            Edge::Bottom => "bottom",
        };
        f.write_str(name)
    }
}

/// Errors raised when the layout lacks an entry a crossing needs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LayoutError {
    /// No screen with this nickname is configured.
    #[error("no layout entry for screen '{0}'")]
    UnknownScreen(String),

    /// The screen exists but has no rule for this edge.
    #[error("screen '{screen}' has no {edge} edge rule")]
    MissingEdge { screen: String, edge: Edge },
}

/// One edge of one screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRule {
    /// Crossing-axis coordinate of the edge.
    pub boundary: f64,
    /// Start of the perpendicular span.
    #[serde(alias = "perpendicularLow")]
    pub low: f64,
    /// End of the perpendicular span.
    #[serde(alias = "perpendicularHigh")]
    pub high: f64,
    /// Nickname of the screen reached through this edge.
    #[serde(alias = "neighborName")]
    pub neighbor: String,
}

impl EdgeRule {
    pub fn new(boundary: f64, low: f64, high: f64, neighbor: impl Into<String>) -> Self {
        Self {
            boundary,
            low,
            high,
            neighbor: neighbor.into(),
        }
    }

    /// Returns `true` if `c` lies within `[low, high]`.
    pub fn spans(&self, c: f64) -> bool {
        c >= self.low && c <= self.high
    }

    /// Position of `c` along the span as a fraction.  A zero-length span
    /// maps everything to `0.0`.
    pub fn percent_of(&self, c: f64) -> f64 {
        let span = self.high - self.low;
        if span == 0.0 {
            return 0.0;
        }
        (c - self.low) / span
    }

    /// Inverse of [`EdgeRule::percent_of`].
    pub fn at_percent(&self, percent: f64) -> f64 {
        self.low + percent * (self.high - self.low)
    }
}

/// The up-to-four edge rules of a single screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenEdges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<EdgeRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<EdgeRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<EdgeRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<EdgeRule>,
}

impl ScreenEdges {
    pub fn get(&self, edge: Edge) -> Option<&EdgeRule> {
        match edge {
            Edge::Left => self.left.as_ref(),
            Edge::Right => self.right.as_ref(),
            Edge::Top => self.top.as_ref(),
            Edge::Bottom => self.bottom.as_ref(),
        }
    }

    pub fn set(&mut self, edge: Edge, rule: EdgeRule) {
        let slot = match edge {
            Edge::Left => &mut self.left,
            Edge::Right => &mut self.right,
            Edge::Top => &mut self.top,
            Edge::Bottom => &mut self.bottom,
        };
        *slot = Some(rule);
    }

    /// Returns the first edge, in [`Edge::EXIT_ORDER`], that the local cursor
    /// at `(x, y)` has reached.
    pub fn exit_at(&self, x: f64, y: f64) -> Option<(Edge, &EdgeRule)> {
        Edge::EXIT_ORDER.into_iter().find_map(|edge| {
            let rule = self.get(edge)?;
            let (crossing, perpendicular) = edge.split(x, y);
            let past = match edge {
                Edge::Right | Edge::Bottom => crossing >= rule.boundary,
                Edge::Left | Edge::Top => crossing <= rule.boundary,
            };
            (past && rule.spans(perpendicular)).then_some((edge, rule))
        })
    }
}

/// Nickname → edge rules for every screen in the arrangement.
///
/// Loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScreenLayout {
    screens: HashMap<String, ScreenEdges>,
}

impl ScreenLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper that adds one edge rule.
    pub fn with_edge(mut self, screen: &str, edge: Edge, rule: EdgeRule) -> Self {
        self.insert_edge(screen, edge, rule);
        self
    }

    pub fn insert_edge(&mut self, screen: &str, edge: Edge, rule: EdgeRule) {
        self.screens
            .entry(screen.to_string())
            .or_default()
            .set(edge, rule);
    }

    pub fn screen(&self, nickname: &str) -> Option<&ScreenEdges> {
        self.screens.get(nickname)
    }

    pub fn contains(&self, nickname: &str) -> bool {
        self.screens.contains_key(nickname)
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }

    pub fn nicknames(&self) -> impl Iterator<Item = &str> {
        self.screens.keys().map(String::as_str)
    }

    /// Looks up one edge rule.
    ///
    /// # Errors
    ///
    /// [`LayoutError::UnknownScreen`] if `screen` is not configured and
    /// [`LayoutError::MissingEdge`] if it has no rule for `edge`.
    pub fn rule(&self, screen: &str, edge: Edge) -> Result<&EdgeRule, LayoutError> {
        self.screens
            .get(screen)
            .ok_or_else(|| LayoutError::UnknownScreen(screen.to_string()))?
            .get(edge)
            .ok_or_else(|| LayoutError::MissingEdge {
                screen: screen.to_string(),
                edge,
            })
    }
}

// ── Crossing arithmetic ───────────────────────────────────────────────────────

/// Computes where the cursor enters the neighbour when it leaves through
/// `exit` at local `(x, y)`.
///
/// The perpendicular axis is percent-remapped from `exit_rule` onto
/// `entry_rule`; the crossing axis is aligned to the entry boundary.
pub fn entry_point(exit: Edge, exit_rule: &EdgeRule, entry_rule: &EdgeRule, x: f64, y: f64) -> (f64, f64) {
    let (_, perpendicular) = exit.split(x, y);
    let mapped = entry_rule.at_percent(exit_rule.percent_of(perpendicular));
    exit.join(entry_rule.boundary, mapped)
}

/// Returns `true` once the virtual position `(x, y)` on the neighbour has
/// moved back past the entry edge (the neighbour's edge facing `exit`).
pub fn has_returned(exit: Edge, entry_rule: &EdgeRule, x: f64, y: f64) -> bool {
    let (crossing, perpendicular) = exit.split(x, y);
    let back = match exit.opposite() {
        Edge::Left | Edge::Top => crossing < entry_rule.boundary,
        Edge::Right | Edge::Bottom => crossing > entry_rule.boundary,
    };
    back && entry_rule.spans(perpendicular)
}

/// Computes where the local cursor reappears after returning from the
/// neighbour at virtual `(x, y)`.
///
/// The perpendicular axis is percent-remapped from `entry_rule` back onto
/// `exit_rule`; the crossing axis sits one unit inside the exit boundary so
/// the very next sample does not leave again.
pub fn reentry_point(exit: Edge, exit_rule: &EdgeRule, entry_rule: &EdgeRule, x: f64, y: f64) -> (f64, f64) {
    let (_, perpendicular) = exit.split(x, y);
    let mapped = exit_rule.at_percent(entry_rule.percent_of(perpendicular));
    let inside = match exit {
        Edge::Right | Edge::Bottom => exit_rule.boundary - 1.0,
        Edge::Left | Edge::Top => exit_rule.boundary + 1.0,
    };
    exit.join(inside, mapped)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
