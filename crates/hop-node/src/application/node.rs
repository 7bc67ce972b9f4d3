//! Node: wires the bus, the handshake engine, and one role's use cases.
//!
//! A node plays one of two roles:
//!
//! - **serve** – owns the keyboard and mouse.  Runs the
//!   [`ScreenTransitionController`] and records the nicknames joining nodes
//!   announce.
//! - **join** – lends its screen.  Connects to a serving node, announces its
//!   nickname once connected, and replays forwarded input through the
//!   [`EmulateInputUseCase`].
//!
//! The event loop in `main.rs` owns the sockets and timers and calls the
//! `on_*` methods here; nothing in this module awaits.

use std::net::{SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use hop_core::domain::layout::{LayoutError, ScreenLayout};
use hop_core::event_bus::{EventBus, OwnerTag};
use hop_core::peering::{
    DatagramTransport, HandshakeEngine, HandshakePolicy, LocalEndpoint, MessageSender,
    NicknameMap, PeerEvent, SharedNicknames,
};
use hop_core::protocol::codec::decode_envelope;
use hop_core::protocol::messages::PeerId;
use thiserror::Error;
use tracing::{debug, info};

use super::emulate_input::{self, EmulateInputUseCase, PlatformInputEmulator};
use super::manage_peers;
use super::screen_transition::{
    CaptureControl, CursorController, ScreenTransitionController, Transition,
};
use crate::infrastructure::input_capture::CaptureEvent;

/// Operator misconfiguration detected while starting a node.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartupError {
    #[error("no address to connect to; pass --ip or set HOPSCREEN_CONNECT_IP")]
    MissingConnectAddress,

    #[error("the screen layout has no entry for this node's nickname '{0}'")]
    MissingLayoutEntry(String),
}

/// Settings common to both roles.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub nickname: String,
    pub local: LocalEndpoint,
    pub policy: HandshakePolicy,
    pub layout: ScreenLayout,
    pub recenter: (i32, i32),
}

/// One running node.
pub struct Node {
    nickname: String,
    bus: EventBus<PeerEvent>,
    engine: HandshakeEngine,
    nicknames: SharedNicknames,
    transition: Option<ScreenTransitionController>,
    owners: Vec<OwnerTag>,
}

impl Node {
    /// Starts a serving node.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::MissingLayoutEntry`] if the layout does not
    /// describe this node's screen.
    pub fn serve(
        settings: NodeSettings,
        transport: Arc<dyn DatagramTransport>,
        cursor: Arc<dyn CursorController>,
        capture: Arc<dyn CaptureControl>,
    ) -> Result<Self, StartupError> {
        let mut node = Self::base(&settings, transport);
        node.owners.push(manage_peers::record_nicknames(
            Arc::clone(&node.nicknames),
            &node.bus,
        ));

        let sender: Arc<dyn MessageSender> = Arc::new(node.engine.clone());
        let controller = ScreenTransitionController::new(
            settings.nickname.clone(),
            settings.layout,
            Arc::clone(&node.nicknames),
            sender,
            cursor,
            capture,
            settings.recenter,
        )
        .map_err(|e| match e {
            LayoutError::UnknownScreen(name) => StartupError::MissingLayoutEntry(name),
            LayoutError::MissingEdge { screen, .. } => StartupError::MissingLayoutEntry(screen),
        })?;
        node.transition = Some(controller);

        info!(
            "serving as '{}' on port {}",
            settings.nickname, settings.local.port
        );
        Ok(node)
    }

    /// Starts a joining node and sends the first `introduce` to `connect_to`.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::MissingConnectAddress`] if `connect_to` is
    /// `None`.
    pub fn join(
        settings: NodeSettings,
        connect_to: Option<SocketAddrV4>,
        transport: Arc<dyn DatagramTransport>,
        emulator: Arc<dyn PlatformInputEmulator>,
    ) -> Result<Self, StartupError> {
        let target = connect_to.ok_or(StartupError::MissingConnectAddress)?;
        let mut node = Self::base(&settings, transport);

        let sender: Arc<dyn MessageSender> = Arc::new(node.engine.clone());
        node.owners.push(manage_peers::announce_nickname(
            settings.nickname.clone(),
            sender,
            &node.bus,
        ));
        let use_case = Arc::new(Mutex::new(EmulateInputUseCase::new(emulator)));
        node.owners.push(emulate_input::attach(use_case, &node.bus));

        info!("joining {target} as '{}'", settings.nickname);
        node.engine.connect(*target.ip(), target.port());
        Ok(node)
    }

    fn base(settings: &NodeSettings, transport: Arc<dyn DatagramTransport>) -> Self {
        let bus = EventBus::new();
        let engine = HandshakeEngine::new(settings.local.clone(), transport, bus.clone(), settings.policy);
        Self {
            nickname: settings.nickname.clone(),
            bus,
            engine,
            nicknames: NicknameMap::shared(),
            transition: None,
            owners: Vec::new(),
        }
    }

    // ── Event loop entry points ───────────────────────────────────────────────

    /// Decodes one received datagram and republishes it on the bus.
    /// Malformed datagrams are logged and dropped.
    pub fn on_datagram(&self, from: SocketAddr, bytes: &[u8]) {
        match decode_envelope(bytes) {
            Ok(envelope) => self.engine.handle_datagram(from, envelope),
            Err(e) => debug!("dropping datagram from {from}: {e}"),
        }
    }

    /// Samples the cursor (serving role only).
    pub fn on_tick(&mut self) -> Option<Transition> {
        self.transition.as_mut().and_then(ScreenTransitionController::tick)
    }

    /// Handles one captured input event (serving role only).
    pub fn on_capture(&mut self, event: CaptureEvent) {
        if let Some(controller) = self.transition.as_mut() {
            controller.on_capture(event);
        }
    }

    /// Drives handshake retry and expiry.
    pub fn on_handshake_timer(&self, now: Instant) {
        self.engine.tick(now);
    }

    /// Stops forwarding and detaches every handler from the bus.
    pub fn shutdown(&mut self) {
        if let Some(controller) = self.transition.as_mut() {
            controller.reset();
        }
        for owner in self.owners.drain(..) {
            self.bus.unsubscribe_all(owner);
        }
        self.engine.shutdown();
        info!("node '{}' shut down", self.nickname);
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn bus(&self) -> &EventBus<PeerEvent> {
        &self.bus
    }

    pub fn engine(&self) -> &HandshakeEngine {
        &self.engine
    }

    pub fn nicknames(&self) -> &SharedNicknames {
        &self.nicknames
    }

    /// The peer id recorded for `nickname`, if it has announced itself.
    pub fn peer_for(&self, nickname: &str) -> Option<PeerId> {
        self.nicknames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(nickname)
    }

    pub fn transition(&self) -> Option<&ScreenTransitionController> {
        self.transition.as_ref()
    }
}
