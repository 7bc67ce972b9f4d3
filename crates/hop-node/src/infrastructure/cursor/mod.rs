//! Local cursor access.
//!
//! Reading and warping the real OS cursor is a platform concern; the node
//! ships only the in-memory [`mock::MockCursorController`], which the
//! headless binary and the tests drive directly.

pub mod mock;
