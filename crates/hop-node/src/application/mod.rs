//! Application layer use cases for a node.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `hop_core`) and the infrastructure (sockets, OS hooks,
//! files).  Use cases here depend on traits rather than concrete adapters and
//! contain no network I/O or file system access.
//!
//! # Sub-modules
//!
//! - **`screen_transition`** – Samples the cursor, detects edge crossings,
//!   and forwards input to the neighbouring screen.  Runs on every sample.
//!
//! - **`emulate_input`** – Replays forwarded input on the screen being
//!   entered.
//!
//! - **`manage_peers`** – Announces and records screen nicknames once a
//!   handshake completes.
//!
//! - **`node`** – Wires the bus, the handshake engine, and one role's use
//!   cases together for the event loop.

pub mod emulate_input;
pub mod manage_peers;
pub mod node;
pub mod screen_transition;
