//! Domain entities with no I/O.
//!
//! - [`layout`] – The static screen layout: per-screen edge rules and the
//!   coordinate arithmetic used when the cursor crosses an edge.

pub mod layout;
