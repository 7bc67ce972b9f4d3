//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the node settings and the screen layout
//! from one TOML file and supplies defaults when the file does not exist.

pub mod config;
