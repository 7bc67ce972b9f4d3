//! Human-readable screen names → peer ids.
//!
//! The layout file names screens ("imac", "macbook"); the handshake names
//! peers by number.  A peer announces its nickname with `REQUEST_NICKNAME`
//! right after the handshake and the accepting side records it here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::protocol::messages::PeerId;

/// A nickname map shared between the nickname recorder and the transition
/// controller.
pub type SharedNicknames = Arc<Mutex<NicknameMap>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NicknameMap {
    by_name: HashMap<String, PeerId>,
}

impl NicknameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedNicknames {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Maps `nickname` to `peer`, returning the previous mapping if any.
    pub fn insert(&mut self, nickname: impl Into<String>, peer: PeerId) -> Option<PeerId> {
        self.by_name.insert(nickname.into(), peer)
    }

    pub fn get(&self, nickname: &str) -> Option<PeerId> {
        self.by_name.get(nickname).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
