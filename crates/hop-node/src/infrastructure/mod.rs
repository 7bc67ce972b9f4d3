//! Infrastructure layer for the node.
//!
//! Contains OS-facing adapters: the UDP socket, interface enumeration, the
//! configuration file, and the capture/emulation/cursor ports.
//!
//! **Dependency rule**: this layer may depend on `application` and `hop_core`,
//! but MUST NOT be imported by `hop_core`.
//!
//! # Sub-modules
//!
//! - **`network`** – UDP transport and local IPv4 enumeration.
//! - **`storage`** – TOML configuration with defaults.
//! - **`input_capture`** – The capture event stream and its mock source.
//! - **`input_emulation`** – The mock `PlatformInputEmulator`.
//! - **`cursor`** – The mock `CursorController`.

pub mod cursor;
pub mod input_capture;
pub mod input_emulation;
pub mod network;
pub mod storage;
