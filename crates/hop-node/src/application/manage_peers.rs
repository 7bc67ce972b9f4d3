//! ManagePeers: nickname exchange after the handshake.
//!
//! The layout file names screens by nickname, the handshake names peers by
//! number.  The two halves here bridge them:
//!
//! ```text
//!   joining node                          serving node
//!   ────────────                          ────────────
//!   CONNECTED {id} ──REQUEST_NICKNAME──▶  nicknames["macbook"] = envelope.id
//! ```
//!
//! `envelope.id` on the serving side is the id the serving node assigned the
//! joining node during the handshake, which is exactly the id
//! [`MessageSender::send`] expects.

use std::sync::{Arc, PoisonError};

use hop_core::event_bus::{EventBus, OwnerTag};
use hop_core::peering::{MessageSender, PeerEvent, SharedNicknames, CONNECTED};
use hop_core::protocol::messages::{Message, REQUEST_NICKNAME};
use tracing::{info, warn};

/// Sends `REQUEST_NICKNAME {nickname}` to every peer as soon as its handshake
/// completes.  Returns the owner tag of the subscription.
pub fn announce_nickname(
    nickname: impl Into<String>,
    sender: Arc<dyn MessageSender>,
    bus: &EventBus<PeerEvent>,
) -> OwnerTag {
    let nickname = nickname.into();
    let owner = OwnerTag::new();
    bus.subscribe_as(owner, CONNECTED, move |event| {
        let PeerEvent::Connected { id } = event else {
            return;
        };
        info!("connected to peer {id}; announcing nickname '{nickname}'");
        sender.send(
            *id,
            Message::RequestNickname {
                nickname: nickname.clone(),
            },
        );
    });
    owner
}

/// Records `nickname → peer id` for every inbound `REQUEST_NICKNAME`.
/// Returns the owner tag of the subscription.
pub fn record_nicknames(nicknames: SharedNicknames, bus: &EventBus<PeerEvent>) -> OwnerTag {
    let owner = OwnerTag::new();
    bus.subscribe_as(owner, REQUEST_NICKNAME, move |event| {
        let PeerEvent::Inbound { from, envelope } = event else {
            return;
        };
        let Message::RequestNickname { nickname } = &envelope.message else {
            return;
        };
        let previous = nicknames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(nickname.clone(), envelope.id);
        match previous {
            Some(old) if old != envelope.id => {
                warn!("nickname '{nickname}' moved from peer {old} to peer {}", envelope.id)
            }
            _ => info!("set nickname for peer {} ({from}) to '{nickname}'", envelope.id),
        }
    });
    owner
}
