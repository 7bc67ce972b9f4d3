//! Peer records and the peer directory.
//!
//! The directory has one authoritative store, keyed by the outgoing id this
//! node assigned, and one derived index from interface address to id.  The
//! index is only ever written by the directory itself, so it cannot drift from
//! the store; [`PeerDirectory::check_consistency`] verifies this in tests.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Instant;

use thiserror::Error;

use crate::protocol::messages::PeerId;

/// One remote node known to this process.
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    /// The id this node assigned to the peer.  Stable for the record's lifetime.
    pub outgoing_id: PeerId,
    /// The id the peer assigned to this node.  `None` until the handshake
    /// completes; nothing can be sent to the peer before then.
    pub incoming_id: Option<PeerId>,
    /// The peer's address on the path that was found to work.
    pub interface_address: Ipv4Addr,
    /// The peer's listening port.
    pub port: u16,
    /// `true` once a `connectionProbe` for this record has been answered.
    pub resolved: bool,
    /// How many `introduce` messages have been sent for this record.
    pub introduce_attempts: u32,
    /// When the last `introduce` was sent.  `None` for records this node did
    /// not initiate, and once the handshake has completed.
    pub last_introduce: Option<Instant>,
}

impl Peer {
    /// A record created by [`crate::HandshakeEngine::connect`].
    pub fn initiated(outgoing_id: PeerId, address: Ipv4Addr, port: u16, now: Instant) -> Self {
        Self {
            outgoing_id,
            incoming_id: None,
            interface_address: address,
            port,
            resolved: false,
            introduce_attempts: 1,
            last_introduce: Some(now),
        }
    }

    /// A record created on the responder side when a `probeReply` arrives.
    pub fn accepted(outgoing_id: PeerId, incoming_id: PeerId, address: Ipv4Addr, port: u16) -> Self {
        Self {
            outgoing_id,
            incoming_id: Some(incoming_id),
            interface_address: address,
            port,
            resolved: true,
            introduce_attempts: 0,
            last_introduce: None,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.interface_address, self.port))
    }

    /// `true` once `send` can address this peer.
    pub fn is_connected(&self) -> bool {
        self.incoming_id.is_some()
    }

    /// `true` for an initiated handshake still waiting for `assignId`.
    pub fn is_pending(&self) -> bool {
        self.incoming_id.is_none() && self.last_introduce.is_some()
    }
}

/// A violation found by [`PeerDirectory::check_consistency`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("interface {address} is indexed to missing peer {id}")]
    DanglingIndex { address: Ipv4Addr, id: PeerId },

    #[error("interface {address} is indexed to peer {id}, whose address is {actual}")]
    IndexMismatch {
        address: Ipv4Addr,
        id: PeerId,
        actual: Ipv4Addr,
    },

    #[error("peer {id} at {address} is not reachable through the interface index")]
    Unindexed { id: PeerId, address: Ipv4Addr },
}

/// All peer records of one node.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    peer_count: u32,
    peers: HashMap<PeerId, Peer>,
    by_interface: HashMap<Ipv4Addr, PeerId>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next outgoing id.  Ids are never reused.
    pub fn allocate_id(&mut self) -> PeerId {
        self.peer_count += 1;
        self.peer_count
    }

    /// Number of ids allocated so far.
    pub fn peer_count(&self) -> u32 {
        self.peer_count
    }

    /// Stores `peer` and points the interface index at it.
    pub fn insert(&mut self, peer: Peer) {
        self.by_interface
            .insert(peer.interface_address, peer.outgoing_id);
        self.peers.insert(peer.outgoing_id, peer);
    }

    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    /// Id of the most recent record for `address`, if any.
    pub fn id_for_interface(&self, address: Ipv4Addr) -> Option<PeerId> {
        self.by_interface.get(&address).copied()
    }

    /// Applies `f` to the record for `id` and refreshes the interface index if
    /// the address changed.  Returns `false` if there is no such record.
    pub fn update<F>(&mut self, id: PeerId, f: F) -> bool
    where
        F: FnOnce(&mut Peer),
    {
        let Some(peer) = self.peers.get_mut(&id) else {
            return false;
        };
        let before = peer.interface_address;
        f(peer);
        peer.outgoing_id = id;
        let after = peer.interface_address;
        if before != after {
            self.unindex(before, id);
            self.by_interface.insert(after, id);
        }
        true
    }

    /// Removes the record for `id` from the store and the index.
    pub fn remove(&mut self, id: PeerId) -> Option<Peer> {
        let peer = self.peers.remove(&id)?;
        self.unindex(peer.interface_address, id);
        Some(peer)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Verifies that the interface index agrees with the store.
    ///
    /// # Errors
    ///
    /// Returns the first [`DirectoryError`] found.
    pub fn check_consistency(&self) -> Result<(), DirectoryError> {
        for (&address, &id) in &self.by_interface {
            let peer = self
                .peers
                .get(&id)
                .ok_or(DirectoryError::DanglingIndex { address, id })?;
            if peer.interface_address != address {
                return Err(DirectoryError::IndexMismatch {
                    address,
                    id,
                    actual: peer.interface_address,
                });
            }
        }
        for peer in self.peers.values() {
            if !self.by_interface.contains_key(&peer.interface_address) {
                return Err(DirectoryError::Unindexed {
                    id: peer.outgoing_id,
                    address: peer.interface_address,
                });
            }
        }
        Ok(())
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    /// Drops the index entry for `address` if it points at `id`, re-pointing
    /// it at another record with the same address when one exists.
    fn unindex(&mut self, address: Ipv4Addr, id: PeerId) {
        if self.by_interface.get(&address) != Some(&id) {
            return;
        }
        let replacement = self
            .peers
            .values()
            .filter(|p| p.outgoing_id != id && p.interface_address == address)
            .map(|p| p.outgoing_id)
            .max();
        match replacement {
            Some(other) => {
                self.by_interface.insert(address, other);
            }
            None => {
                self.by_interface.remove(&address);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
