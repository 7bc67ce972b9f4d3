//! The handshake engine: peer directory owner, `connect`/`send`, and the
//! four-message handshake.
//!
//! # The handshake (for beginners)
//!
//! Node A wants to talk to node B but A may have several network adapters,
//! only some of which B can reach.  The handshake finds a working path and
//! leaves each side holding an id for the other:
//!
//! ```text
//!  A                                              B
//!  │ connect(ip_b) → allocates id_a_for_b           │
//!  │──── introduce {id, interfaces, port} ─────────►│
//!  │                                                │ probes every address of A
//!  │◄─── connectionProbe {id, interface, port} ─────│ (one per interface)
//!  │ first probe wins: resolved = true              │
//!  │──── probeReply {id, interface, port} ─────────►│
//!  │                                                │ reuses or allocates id_b_for_a
//!  │◄─── assignId {id, myId} ───────────────────────│ INCOMING_CONNECTION
//!  │ incoming_id = myId; CONNECTED                  │
//! ```
//!
//! Inbound datagrams reach these handlers only through the event bus: the
//! receive loop calls [`HandshakeEngine::handle_datagram`], which republishes
//! the envelope under its `type`.  Application code subscribes to its own
//! message types on the same bus.
//!
//! # Repeated handshakes
//!
//! The responder remembers which `introduce` messages it has probed for.  A
//! `probeReply` matching one of them completes a new handshake and always
//! publishes `INCOMING_CONNECTION`, even when the initiator restarted and
//! picked the same id as before.  A `probeReply` with no open introduction
//! and an unchanged id is a replay: `assignId` is re-sent, nothing is
//! published.
//!
//! # Retry and expiry
//!
//! A handshake started with `connect` is re-introduced every
//! [`HandshakePolicy::retry_interval`] until `assignId` arrives.  After
//! [`HandshakePolicy::max_attempts`] introductions without success the record
//! is removed and `HANDSHAKE_EXPIRED` is published.  `max_attempts = 0` keeps
//! retrying forever.
//!
//! # Locking
//!
//! The directory lock is never held while sending or publishing, so a handler
//! reacting to `CONNECTED` may immediately call back into the engine.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::event_bus::{EventBus, OwnerTag};
use crate::peering::directory::{Peer, PeerDirectory};
use crate::peering::transport::DatagramTransport;
use crate::protocol::messages::{
    Envelope, Message, PeerId, ASSIGN_ID, CONNECTION_PROBE, INTRODUCE, PROBE_REPLY,
};

/// Published on the initiator when `assignId` completes a handshake.
pub const CONNECTED: &str = "CONNECTED";
/// Published on the responder when it sends `assignId`.
pub const INCOMING_CONNECTION: &str = "INCOMING_CONNECTION";
/// Published on the initiator when a handshake is abandoned.
pub const HANDSHAKE_EXPIRED: &str = "HANDSHAKE_EXPIRED";

/// Open introductions kept per responder; the oldest is forgotten first.
const MAX_OPEN_INTRODUCTIONS: usize = 32;

/// Payload type carried on the node's event bus.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// A datagram arrived; published under `envelope.message.kind()`.
    Inbound { from: SocketAddr, envelope: Envelope },
    /// See [`CONNECTED`].
    Connected { id: PeerId },
    /// See [`INCOMING_CONNECTION`].
    IncomingConnection { id: PeerId },
    /// See [`HANDSHAKE_EXPIRED`].
    HandshakeExpired { id: PeerId },
}

/// Anything that can address an application message to a peer.
///
/// Implemented by [`HandshakeEngine`]; application use cases depend on this
/// trait so tests can record sends without a network.
pub trait MessageSender: Send + Sync {
    /// Sends `message` to `peer`.  Never fails from the caller's point of
    /// view: unknown or not-yet-connected peers are silently skipped.
    fn send(&self, peer: PeerId, message: Message);
}

/// What this node advertises in `introduce`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEndpoint {
    pub interfaces: Vec<Ipv4Addr>,
    pub port: u16,
}

/// Retry/expiry settings for initiated handshakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakePolicy {
    pub retry_interval: Duration,
    /// Total introductions before giving up; `0` retries forever.
    pub max_attempts: u32,
}

impl Default for HandshakePolicy {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }
}

/// An `introduce` the responder has probed for but not yet seen answered.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenIntroduction {
    initiator_id: PeerId,
    probed: Vec<Ipv4Addr>,
}

impl OpenIntroduction {
    fn matches(&self, initiator_id: PeerId, interface: Ipv4Addr) -> bool {
        self.initiator_id == initiator_id && self.probed.contains(&interface)
    }
}

struct EngineInner {
    local: LocalEndpoint,
    policy: HandshakePolicy,
    transport: Arc<dyn DatagramTransport>,
    bus: EventBus<PeerEvent>,
    directory: Mutex<PeerDirectory>,
    introductions: Mutex<Vec<OpenIntroduction>>,
    owner: OwnerTag,
}

/// Cheap-to-clone handle to one node's handshake state.
#[derive(Clone)]
pub struct HandshakeEngine {
    inner: Arc<EngineInner>,
}

impl HandshakeEngine {
    /// Creates an engine and subscribes its four handshake handlers to `bus`.
    pub fn new(
        local: LocalEndpoint,
        transport: Arc<dyn DatagramTransport>,
        bus: EventBus<PeerEvent>,
        policy: HandshakePolicy,
    ) -> Self {
        let engine = Self {
            inner: Arc::new(EngineInner {
                local,
                policy,
                transport,
                bus,
                directory: Mutex::new(PeerDirectory::new()),
                introductions: Mutex::new(Vec::new()),
                owner: OwnerTag::new(),
            }),
        };
        engine.register_handlers();
        engine
    }

    /// Starts a handshake with `ip:port` and returns the id assigned to the
    /// new peer.  The peer is not usable for [`send`](Self::send) until
    /// `CONNECTED` is published for that id.
    pub fn connect(&self, ip: Ipv4Addr, port: u16) -> PeerId {
        let id = {
            let mut dir = self.directory();
            let id = dir.allocate_id();
            dir.insert(Peer::initiated(id, ip, port, Instant::now()));
            id
        };
        info!("attempting connection to {ip}:{port}, assigned id {id}");
        self.introduce(id, SocketAddr::V4(SocketAddrV4::new(ip, port)));
        id
    }

    /// Sends `message` to `peer`, stamped with the id the peer assigned us.
    ///
    /// Unknown peers and peers whose handshake has not completed are skipped
    /// silently.  Transport failures are logged and swallowed.
    pub fn send(&self, peer: PeerId, message: Message) {
        let target = {
            let dir = self.directory();
            dir.get(peer)
                .and_then(|p| p.incoming_id.map(|incoming| (p.socket_addr(), incoming)))
        };
        match target {
            Some((dest, incoming)) => self.transmit(dest, Envelope::new(incoming, message)),
            None => trace!("dropping {} for unconnected peer {peer}", message.kind()),
        }
    }

    /// Republishes a received envelope on the bus under its `type`.
    pub fn handle_datagram(&self, from: SocketAddr, envelope: Envelope) {
        let kind = envelope.message.kind();
        trace!("received {kind} from {from}");
        self.inner
            .bus
            .publish(kind, PeerEvent::Inbound { from, envelope });
    }

    /// Re-introduces stale pending handshakes and expires exhausted ones.
    pub fn tick(&self, now: Instant) {
        let policy = self.inner.policy;
        let mut retries = Vec::new();
        let mut expired = Vec::new();
        {
            let mut dir = self.directory();
            let due: Vec<PeerId> = dir
                .iter()
                .filter(|p| p.is_pending())
                .filter(|p| {
                    p.last_introduce
                        .is_some_and(|t| now.saturating_duration_since(t) >= policy.retry_interval)
                })
                .map(|p| p.outgoing_id)
                .collect();

            for id in due {
                let exhausted = dir.get(id).is_some_and(|p| {
                    policy.max_attempts != 0 && p.introduce_attempts >= policy.max_attempts
                });
                if exhausted {
                    dir.remove(id);
                    expired.push(id);
                    continue;
                }
                dir.update(id, |p| {
                    p.introduce_attempts += 1;
                    p.last_introduce = Some(now);
                    p.resolved = false;
                });
                if let Some(peer) = dir.get(id) {
                    retries.push((id, peer.socket_addr(), peer.introduce_attempts));
                }
            }
        }

        for (id, dest, attempt) in retries {
            debug!("re-introducing to {dest} for peer {id} (attempt {attempt})");
            self.introduce(id, dest);
        }
        for id in expired {
            warn!("handshake with peer {id} expired after {} attempts", policy.max_attempts);
            self.inner
                .bus
                .publish(HANDSHAKE_EXPIRED, PeerEvent::HandshakeExpired { id });
        }
    }

    pub fn peer(&self, id: PeerId) -> Option<Peer> {
        self.directory().get(id).cloned()
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.directory().iter().cloned().collect()
    }

    pub fn is_connected(&self, id: PeerId) -> bool {
        self.directory().get(id).is_some_and(Peer::is_connected)
    }

    pub fn peer_count(&self) -> u32 {
        self.directory().peer_count()
    }

    pub fn local(&self) -> &LocalEndpoint {
        &self.inner.local
    }

    pub fn bus(&self) -> &EventBus<PeerEvent> {
        &self.inner.bus
    }

    /// Runs `f` against the directory, for diagnostics and tests.
    pub fn with_directory<R>(&self, f: impl FnOnce(&PeerDirectory) -> R) -> R {
        f(&self.directory())
    }

    /// Removes the engine's handlers from the bus.
    pub fn shutdown(&self) {
        let removed = self.inner.bus.unsubscribe_all(self.inner.owner);
        debug!("handshake engine unsubscribed {removed} handlers");
    }

    // ── Handshake handlers ────────────────────────────────────────────────────

    fn on_introduce(&self, from: SocketAddr, envelope: &Envelope) {
        let Message::Introduce { interfaces, port } = &envelope.message else {
            return;
        };
        info!(
            "introduced by {from}: interfaces {interfaces:?} port {port}, assigned me id {}",
            envelope.id
        );

        let targets: Vec<Ipv4Addr> = if interfaces.is_empty() {
            match from {
                SocketAddr::V4(v4) => vec![*v4.ip()],
                SocketAddr::V6(_) => Vec::new(),
            }
        } else {
            interfaces.clone()
        };
        self.open_introduction(envelope.id, &targets);
        for interface in targets {
            let probe = Message::ConnectionProbe {
                interface,
                port: *port,
            };
            self.transmit(
                SocketAddr::V4(SocketAddrV4::new(interface, *port)),
                Envelope::new(envelope.id, probe),
            );
        }
    }

    fn on_connection_probe(&self, from: SocketAddr, envelope: &Envelope) {
        let Message::ConnectionProbe { interface, port } = &envelope.message else {
            return;
        };
        {
            let mut dir = self.directory();
            match dir.get(envelope.id) {
                None => {
                    debug!("ignoring connectionProbe for unknown peer {}", envelope.id);
                    return;
                }
                Some(peer) if peer.resolved => {
                    debug!("ignoring duplicate connectionProbe for peer {}", envelope.id);
                    return;
                }
                Some(_) => {}
            }
            dir.update(envelope.id, |p| p.resolved = true);
        }
        info!("resolved my address {interface} for peer {}", envelope.id);
        let reply = Message::ProbeReply {
            interface: *interface,
            port: *port,
        };
        self.transmit(from, Envelope::new(envelope.id, reply));
    }

    fn on_probe_reply(&self, envelope: &Envelope) {
        let Message::ProbeReply { interface, port } = &envelope.message else {
            return;
        };
        let introduced = self.close_introduction(envelope.id, *interface);
        let (my_id, first_time) = {
            let mut dir = self.directory();
            match dir.id_for_interface(*interface) {
                Some(existing) => {
                    let repeat = dir
                        .get(existing)
                        .is_some_and(|p| p.incoming_id == Some(envelope.id));
                    dir.update(existing, |p| {
                        p.incoming_id = Some(envelope.id);
                        p.port = *port;
                        p.last_introduce = None;
                    });
                    (existing, introduced || !repeat)
                }
                None => {
                    let id = dir.allocate_id();
                    dir.insert(Peer::accepted(id, envelope.id, *interface, *port));
                    (id, true)
                }
            }
        };

        let dest = SocketAddr::V4(SocketAddrV4::new(*interface, *port));
        self.transmit(dest, Envelope::new(envelope.id, Message::AssignId { my_id }));
        if first_time {
            info!("accepted {dest}, which assigned me id {}; its id is {my_id}", envelope.id);
            self.inner.bus.publish(
                INCOMING_CONNECTION,
                PeerEvent::IncomingConnection { id: my_id },
            );
        } else {
            debug!("re-sent assignId {my_id} to {dest}");
        }
    }

    fn on_assign_id(&self, envelope: &Envelope) {
        let Message::AssignId { my_id } = &envelope.message else {
            return;
        };
        {
            let mut dir = self.directory();
            match dir.get(envelope.id) {
                None => {
                    debug!("ignoring assignId for unknown peer {}", envelope.id);
                    return;
                }
                Some(peer) if peer.incoming_id == Some(*my_id) => {
                    debug!("ignoring duplicate assignId for peer {}", envelope.id);
                    return;
                }
                Some(_) => {}
            }
            dir.update(envelope.id, |p| {
                p.incoming_id = Some(*my_id);
                p.last_introduce = None;
            });
        }
        info!("peer {} assigned me id {my_id}", envelope.id);
        self.inner
            .bus
            .publish(CONNECTED, PeerEvent::Connected { id: envelope.id });
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    fn register_handlers(&self) {
        let bus = &self.inner.bus;
        let owner = self.inner.owner;

        let weak = Arc::downgrade(&self.inner);
        bus.subscribe_as(owner, INTRODUCE, move |event| {
            if let (Some(engine), PeerEvent::Inbound { from, envelope }) = (upgrade(&weak), event) {
                engine.on_introduce(*from, envelope);
            }
        });

        let weak = Arc::downgrade(&self.inner);
        bus.subscribe_as(owner, CONNECTION_PROBE, move |event| {
            if let (Some(engine), PeerEvent::Inbound { from, envelope }) = (upgrade(&weak), event) {
                engine.on_connection_probe(*from, envelope);
            }
        });

        let weak = Arc::downgrade(&self.inner);
        bus.subscribe_as(owner, PROBE_REPLY, move |event| {
            if let (Some(engine), PeerEvent::Inbound { envelope, .. }) = (upgrade(&weak), event) {
                engine.on_probe_reply(envelope);
            }
        });

        let weak = Arc::downgrade(&self.inner);
        bus.subscribe_as(owner, ASSIGN_ID, move |event| {
            if let (Some(engine), PeerEvent::Inbound { envelope, .. }) = (upgrade(&weak), event) {
                engine.on_assign_id(envelope);
            }
        });
    }

    fn open_introduction(&self, initiator_id: PeerId, probed: &[Ipv4Addr]) {
        let mut open = self.introductions();
        open.retain(|i| !probed.iter().any(|&addr| i.matches(initiator_id, addr)));
        if open.len() == MAX_OPEN_INTRODUCTIONS {
            open.remove(0);
        }
        open.push(OpenIntroduction {
            initiator_id,
            probed: probed.to_vec(),
        });
    }

    /// Removes the open introduction answered by a `probeReply`, returning
    /// whether there was one.
    fn close_introduction(&self, initiator_id: PeerId, interface: Ipv4Addr) -> bool {
        let mut open = self.introductions();
        let before = open.len();
        open.retain(|i| !i.matches(initiator_id, interface));
        open.len() != before
    }

    fn introduce(&self, id: PeerId, dest: SocketAddr) {
        let message = Message::Introduce {
            interfaces: self.inner.local.interfaces.clone(),
            port: self.inner.local.port,
        };
        self.transmit(dest, Envelope::new(id, message));
    }

    fn transmit(&self, dest: SocketAddr, envelope: Envelope) {
        if let Err(e) = self.inner.transport.send_to(dest, &envelope) {
            warn!("failed to send {} to {dest}: {e}", envelope.message.kind());
        }
    }

    fn directory(&self) -> MutexGuard<'_, PeerDirectory> {
        self.inner
            .directory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn introductions(&self) -> MutexGuard<'_, Vec<OpenIntroduction>> {
        self.inner
            .introductions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl MessageSender for HandshakeEngine {
    fn send(&self, peer: PeerId, message: Message) {
        HandshakeEngine::send(self, peer, message);
    }
}

/// Handlers hold a weak reference so the bus does not keep the engine alive.
fn upgrade(weak: &Weak<EngineInner>) -> Option<HandshakeEngine> {
    weak.upgrade().map(|inner| HandshakeEngine { inner })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peering::transport::RecordingTransport;

    const A_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const A_ALT: Ipv4Addr = Ipv4Addr::new(192, 168, 7, 1);
    const B_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const PORT: u16 = 5872;

    fn sock(ip: Ipv4Addr) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(ip, PORT))
    }

    fn make_engine(
        interfaces: Vec<Ipv4Addr>,
        policy: HandshakePolicy,
    ) -> (HandshakeEngine, Arc<RecordingTransport>, EventBus<PeerEvent>) {
        let transport = Arc::new(RecordingTransport::new());
        let bus = EventBus::new();
        let engine = HandshakeEngine::new(
            LocalEndpoint {
                interfaces,
                port: PORT,
            },
            Arc::clone(&transport) as Arc<dyn DatagramTransport>,
            bus.clone(),
            policy,
        );
        (engine, transport, bus)
    }

    fn record_events(bus: &EventBus<PeerEvent>, name: &str) -> Arc<Mutex<Vec<PeerEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(name, move |e| sink.lock().unwrap().push(e.clone()));
        seen
    }

    // ── connect ───────────────────────────────────────────────────────────────

    #[test]
    fn test_connect_allocates_id_and_sends_introduce() {
        // Arrange
        let (engine, transport, _) = make_engine(vec![A_ADDR, A_ALT], HandshakePolicy::default());

        // Act
        let id = engine.connect(B_ADDR, PORT);

        // Assert
        assert_eq!(id, 1);
        let sent = transport.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, sock(B_ADDR));
        assert_eq!(
            sent[0].1,
            Envelope::new(
                1,
                Message::Introduce {
                    interfaces: vec![A_ADDR, A_ALT],
                    port: PORT
                }
            )
        );
        let peer = engine.peer(id).unwrap();
        assert_eq!(peer.interface_address, B_ADDR);
        assert!(!peer.is_connected());
    }

    #[test]
    fn test_connect_twice_allocates_distinct_ids() {
        let (engine, _, _) = make_engine(vec![A_ADDR], HandshakePolicy::default());

        let first = engine.connect(B_ADDR, PORT);
        let second = engine.connect(Ipv4Addr::new(10, 0, 0, 3), PORT);

        assert_ne!(first, second);
        engine.with_directory(|d| d.check_consistency()).unwrap();
    }

    // ── send ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_send_to_unknown_peer_is_silent_noop() {
        let (engine, transport, _) = make_engine(vec![A_ADDR], HandshakePolicy::default());

        for id in [0, 1, 42, PeerId::MAX] {
            engine.send(id, Message::MouseDown);
        }

        assert!(transport.is_empty());
    }

    #[test]
    fn test_send_before_handshake_completes_is_dropped() {
        let (engine, transport, _) = make_engine(vec![A_ADDR], HandshakePolicy::default());
        let id = engine.connect(B_ADDR, PORT);
        transport.take();

        engine.send(id, Message::Coord { x: 1.0, y: 2.0 });

        assert!(transport.is_empty());
    }

    #[test]
    fn test_send_after_assign_id_stamps_incoming_id() {
        // Arrange
        let (engine, transport, _) = make_engine(vec![A_ADDR], HandshakePolicy::default());
        let id = engine.connect(B_ADDR, PORT);
        engine.handle_datagram(sock(B_ADDR), Envelope::new(id, Message::AssignId { my_id: 9 }));
        transport.take();

        // Act
        engine.send(id, Message::KeyUp { c: 65 });

        // Assert
        let sent = transport.take();
        assert_eq!(sent, vec![(sock(B_ADDR), Envelope::new(9, Message::KeyUp { c: 65 }))]);
    }

    #[test]
    fn test_send_swallows_transport_failure() {
        let transport = Arc::new(RecordingTransport::failing());
        let engine = HandshakeEngine::new(
            LocalEndpoint {
                interfaces: vec![A_ADDR],
                port: PORT,
            },
            Arc::clone(&transport) as Arc<dyn DatagramTransport>,
            EventBus::new(),
            HandshakePolicy::default(),
        );

        let id = engine.connect(B_ADDR, PORT);
        engine.send(id, Message::MouseUp);

        assert!(transport.is_empty());
    }

    // ── introduce ─────────────────────────────────────────────────────────────

    #[test]
    fn test_introduce_probes_every_advertised_interface() {
        // Arrange
        let (responder, transport, _) = make_engine(vec![B_ADDR], HandshakePolicy::default());
        let introduce = Envelope::new(
            3,
            Message::Introduce {
                interfaces: vec![A_ADDR, A_ALT],
                port: 6000,
            },
        );

        // Act
        responder.handle_datagram(sock(A_ADDR), introduce);

        // Assert
        let sent = transport.take();
        assert_eq!(sent.len(), 2);
        for (dest, envelope) in &sent {
            let SocketAddr::V4(v4) = dest else {
                panic!("expected an IPv4 destination");
            };
            assert_eq!(v4.port(), 6000);
            assert_eq!(envelope.id, 3);
            assert_eq!(
                envelope.message,
                Message::ConnectionProbe {
                    interface: *v4.ip(),
                    port: 6000
                }
            );
        }
        assert!(responder.peers().is_empty(), "introduce alone creates no record");
    }

    #[test]
    fn test_introduce_without_interfaces_probes_source_address() {
        let (responder, transport, _) = make_engine(vec![B_ADDR], HandshakePolicy::default());

        responder.handle_datagram(
            sock(A_ADDR),
            Envelope::new(1, Message::Introduce { interfaces: vec![], port: PORT }),
        );

        let sent = transport.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, sock(A_ADDR));
    }

    // ── connectionProbe ───────────────────────────────────────────────────────

    #[test]
    fn test_probe_for_unknown_peer_is_ignored() {
        let (engine, transport, _) = make_engine(vec![A_ADDR], HandshakePolicy::default());

        engine.handle_datagram(
            sock(B_ADDR),
            Envelope::new(5, Message::ConnectionProbe { interface: A_ADDR, port: PORT }),
        );

        assert!(transport.is_empty());
    }

    #[test]
    fn test_first_probe_resolves_and_replies_to_sender() {
        // Arrange
        let (engine, transport, _) = make_engine(vec![A_ADDR, A_ALT], HandshakePolicy::default());
        let id = engine.connect(B_ADDR, PORT);
        transport.take();
        let sender: SocketAddr = "10.0.0.2:41000".parse().unwrap();

        // Act
        engine.handle_datagram(
            sender,
            Envelope::new(id, Message::ConnectionProbe { interface: A_ALT, port: PORT }),
        );

        // Assert
        assert!(engine.peer(id).unwrap().resolved);
        assert_eq!(
            transport.take(),
            vec![(
                sender,
                Envelope::new(id, Message::ProbeReply { interface: A_ALT, port: PORT })
            )]
        );
    }

    #[test]
    fn test_duplicate_probe_after_resolution_sends_nothing() {
        let (engine, transport, _) = make_engine(vec![A_ADDR, A_ALT], HandshakePolicy::default());
        let id = engine.connect(B_ADDR, PORT);
        let probe = |iface| Envelope::new(id, Message::ConnectionProbe { interface: iface, port: PORT });
        engine.handle_datagram(sock(B_ADDR), probe(A_ADDR));
        transport.take();

        engine.handle_datagram(sock(B_ADDR), probe(A_ALT));
        engine.handle_datagram(sock(B_ADDR), probe(A_ADDR));

        assert!(transport.is_empty());
    }

    // ── probeReply ────────────────────────────────────────────────────────────

    #[test]
    fn test_probe_reply_allocates_id_sends_assign_and_publishes_incoming() {
        // Arrange
        let (responder, transport, bus) = make_engine(vec![B_ADDR], HandshakePolicy::default());
        let incoming = record_events(&bus, INCOMING_CONNECTION);

        // Act
        responder.handle_datagram(
            sock(A_ADDR),
            Envelope::new(4, Message::ProbeReply { interface: A_ALT, port: PORT }),
        );

        // Assert
        let sent = transport.take();
        assert_eq!(
            sent,
            vec![(sock(A_ALT), Envelope::new(4, Message::AssignId { my_id: 1 }))]
        );
        assert_eq!(*incoming.lock().unwrap(), vec![PeerEvent::IncomingConnection { id: 1 }]);
        let peer = responder.peer(1).unwrap();
        assert_eq!(peer.incoming_id, Some(4));
        assert_eq!(peer.interface_address, A_ALT);
    }

    #[test]
    fn test_probe_reply_reuses_id_for_known_interface() {
        // Arrange – a previous session left a record for A_ALT
        let (responder, transport, _) = make_engine(vec![B_ADDR], HandshakePolicy::default());
        responder.handle_datagram(
            sock(A_ADDR),
            Envelope::new(4, Message::ProbeReply { interface: A_ALT, port: PORT }),
        );
        transport.take();

        // Act – the initiator restarted and assigned a new id
        responder.handle_datagram(
            sock(A_ADDR),
            Envelope::new(11, Message::ProbeReply { interface: A_ALT, port: PORT }),
        );

        // Assert
        let sent = transport.take();
        assert_eq!(sent[0].1, Envelope::new(11, Message::AssignId { my_id: 1 }));
        assert_eq!(responder.peer_count(), 1);
        assert_eq!(responder.peer(1).unwrap().incoming_id, Some(11));
    }

    #[test]
    fn test_duplicate_probe_reply_resends_assign_without_republishing() {
        let (responder, transport, bus) = make_engine(vec![B_ADDR], HandshakePolicy::default());
        let incoming = record_events(&bus, INCOMING_CONNECTION);
        let reply = Envelope::new(4, Message::ProbeReply { interface: A_ALT, port: PORT });

        responder.handle_datagram(sock(A_ADDR), reply.clone());
        responder.handle_datagram(sock(A_ADDR), reply);

        assert_eq!(transport.len(), 2);
        assert_eq!(incoming.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_probe_reply_after_fresh_introduce_republishes_for_same_id() {
        // Arrange – a first session with initiator id 1 completed
        let (responder, transport, bus) = make_engine(vec![B_ADDR], HandshakePolicy::default());
        let incoming = record_events(&bus, INCOMING_CONNECTION);
        let introduce = Envelope::new(1, Message::Introduce { interfaces: vec![A_ADDR], port: PORT });
        let reply = Envelope::new(1, Message::ProbeReply { interface: A_ADDR, port: PORT });
        responder.handle_datagram(sock(A_ADDR), introduce.clone());
        responder.handle_datagram(sock(A_ADDR), reply.clone());

        // Act – the initiator restarts and its counter hands out 1 again
        responder.handle_datagram(sock(A_ADDR), introduce);
        responder.handle_datagram(sock(A_ADDR), reply);

        // Assert
        assert_eq!(
            *incoming.lock().unwrap(),
            vec![
                PeerEvent::IncomingConnection { id: 1 },
                PeerEvent::IncomingConnection { id: 1 }
            ]
        );
        assert_eq!(responder.peer_count(), 1);
        let assigns = transport
            .take()
            .into_iter()
            .filter(|(_, e)| matches!(e.message, Message::AssignId { .. }))
            .count();
        assert_eq!(assigns, 2);
    }

    #[test]
    fn test_replayed_probe_reply_after_introduce_publishes_once() {
        let (responder, _, bus) = make_engine(vec![B_ADDR], HandshakePolicy::default());
        let incoming = record_events(&bus, INCOMING_CONNECTION);
        let reply = Envelope::new(2, Message::ProbeReply { interface: A_ALT, port: PORT });
        responder.handle_datagram(
            sock(A_ADDR),
            Envelope::new(2, Message::Introduce { interfaces: vec![A_ADDR, A_ALT], port: PORT }),
        );

        responder.handle_datagram(sock(A_ALT), reply.clone());
        responder.handle_datagram(sock(A_ALT), reply);

        assert_eq!(incoming.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_probe_reply_for_different_interfaces_allocates_distinct_ids() {
        let (responder, _, _) = make_engine(vec![B_ADDR], HandshakePolicy::default());

        responder.handle_datagram(
            sock(A_ADDR),
            Envelope::new(1, Message::ProbeReply { interface: A_ADDR, port: PORT }),
        );
        responder.handle_datagram(
            sock(A_ALT),
            Envelope::new(1, Message::ProbeReply { interface: A_ALT, port: PORT }),
        );

        assert_eq!(responder.peer_count(), 2);
        responder.with_directory(|d| d.check_consistency()).unwrap();
    }

    // ── assignId ──────────────────────────────────────────────────────────────

    #[test]
    fn test_assign_id_sets_incoming_and_publishes_connected_once() {
        // Arrange
        let (engine, _, bus) = make_engine(vec![A_ADDR], HandshakePolicy::default());
        let connected = record_events(&bus, CONNECTED);
        let id = engine.connect(B_ADDR, PORT);
        let assign = Envelope::new(id, Message::AssignId { my_id: 2 });

        // Act
        engine.handle_datagram(sock(B_ADDR), assign.clone());
        engine.handle_datagram(sock(B_ADDR), assign);

        // Assert
        assert_eq!(engine.peer(id).unwrap().incoming_id, Some(2));
        assert_eq!(*connected.lock().unwrap(), vec![PeerEvent::Connected { id }]);
    }

    #[test]
    fn test_assign_id_for_unknown_peer_is_ignored() {
        let (engine, _, bus) = make_engine(vec![A_ADDR], HandshakePolicy::default());
        let connected = record_events(&bus, CONNECTED);

        engine.handle_datagram(sock(B_ADDR), Envelope::new(8, Message::AssignId { my_id: 1 }));

        assert!(connected.lock().unwrap().is_empty());
    }

    #[test]
    fn test_connected_handler_can_send_immediately() {
        // Arrange
        let (engine, transport, bus) = make_engine(vec![A_ADDR], HandshakePolicy::default());
        let sender = engine.clone();
        bus.subscribe(CONNECTED, move |event| {
            if let PeerEvent::Connected { id } = event {
                sender.send(*id, Message::RequestNickname { nickname: "imac".into() });
            }
        });
        let id = engine.connect(B_ADDR, PORT);
        transport.take();

        // Act
        engine.handle_datagram(sock(B_ADDR), Envelope::new(id, Message::AssignId { my_id: 6 }));

        // Assert
        let sent = transport.take();
        assert_eq!(
            sent,
            vec![(
                sock(B_ADDR),
                Envelope::new(6, Message::RequestNickname { nickname: "imac".into() })
            )]
        );
    }

    // ── Retry / expiry ────────────────────────────────────────────────────────

    #[test]
    fn test_tick_before_interval_sends_nothing() {
        let (engine, transport, _) = make_engine(vec![A_ADDR], HandshakePolicy::default());
        engine.connect(B_ADDR, PORT);
        transport.take();

        engine.tick(Instant::now());

        assert!(transport.is_empty());
    }

    #[test]
    fn test_tick_after_interval_reintroduces_and_clears_resolved() {
        // Arrange
        let policy = HandshakePolicy {
            retry_interval: Duration::from_millis(100),
            max_attempts: 3,
        };
        let (engine, transport, _) = make_engine(vec![A_ADDR], policy);
        let id = engine.connect(B_ADDR, PORT);
        engine.handle_datagram(
            sock(B_ADDR),
            Envelope::new(id, Message::ConnectionProbe { interface: A_ADDR, port: PORT }),
        );
        transport.take();

        // Act
        engine.tick(Instant::now() + Duration::from_millis(150));

        // Assert
        let sent = transport.take();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0].1.message, Message::Introduce { .. }));
        let peer = engine.peer(id).unwrap();
        assert_eq!(peer.introduce_attempts, 2);
        assert!(!peer.resolved);
    }

    #[test]
    fn test_tick_expires_after_max_attempts() {
        // Arrange
        let policy = HandshakePolicy {
            retry_interval: Duration::from_millis(10),
            max_attempts: 2,
        };
        let (engine, _, bus) = make_engine(vec![A_ADDR], policy);
        let expired = record_events(&bus, HANDSHAKE_EXPIRED);
        let id = engine.connect(B_ADDR, PORT);
        let start = Instant::now();

        // Act
        engine.tick(start + Duration::from_millis(20));
        engine.tick(start + Duration::from_millis(40));

        // Assert
        assert!(engine.peer(id).is_none());
        assert_eq!(*expired.lock().unwrap(), vec![PeerEvent::HandshakeExpired { id }]);
        engine.with_directory(|d| d.check_consistency()).unwrap();
    }

    #[test]
    fn test_tick_with_zero_max_attempts_retries_forever() {
        let policy = HandshakePolicy {
            retry_interval: Duration::from_millis(10),
            max_attempts: 0,
        };
        let (engine, transport, _) = make_engine(vec![A_ADDR], policy);
        let id = engine.connect(B_ADDR, PORT);
        let start = Instant::now();

        for step in 1..=20u64 {
            engine.tick(start + Duration::from_millis(step * 20));
        }

        assert_eq!(transport.len(), 21);
        assert_eq!(engine.peer(id).unwrap().introduce_attempts, 21);
    }

    #[test]
    fn test_tick_leaves_connected_peers_alone() {
        let policy = HandshakePolicy {
            retry_interval: Duration::from_millis(10),
            max_attempts: 1,
        };
        let (engine, transport, _) = make_engine(vec![A_ADDR], policy);
        let id = engine.connect(B_ADDR, PORT);
        engine.handle_datagram(sock(B_ADDR), Envelope::new(id, Message::AssignId { my_id: 3 }));
        transport.take();

        engine.tick(Instant::now() + Duration::from_secs(60));

        assert!(transport.is_empty());
        assert!(engine.is_connected(id));
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    #[test]
    fn test_shutdown_removes_handshake_handlers() {
        let (engine, _, bus) = make_engine(vec![A_ADDR], HandshakePolicy::default());
        assert!(bus.has_subscribers(INTRODUCE));

        engine.shutdown();

        for name in [INTRODUCE, CONNECTION_PROBE, PROBE_REPLY, ASSIGN_ID] {
            assert!(!bus.has_subscribers(name), "{name} still subscribed");
        }
    }
}
