//! Input emulation infrastructure.
//!
//! Injecting real OS input is a platform concern the node does not ship.  The
//! [`mock::MockInputEmulator`] records every call and backs both the tests
//! and the headless binary.

pub mod mock;
