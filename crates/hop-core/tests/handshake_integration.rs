//! Integration tests for the peer handshake.
//!
//! Two or more [`HandshakeEngine`]s exchange real JSON datagrams over an
//! in-memory LAN: every send is encoded with the wire codec, queued, and
//! delivered to whichever host owns the destination address.  Datagrams to
//! addresses no host owns are dropped, like an unreachable interface.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hop_core::peering::{
    DatagramTransport, HandshakeEngine, HandshakePolicy, LocalEndpoint, PeerEvent, TransportError,
    CONNECTED, HANDSHAKE_EXPIRED, INCOMING_CONNECTION,
};
use hop_core::protocol::messages::{Message, PeerId, COORD};
use hop_core::{decode_envelope, encode_envelope, EventBus};

const PORT: u16 = 5872;

type Wire = Arc<Mutex<VecDeque<(SocketAddr, SocketAddr, Vec<u8>)>>>;

struct LoopbackTransport {
    me: SocketAddr,
    wire: Wire,
}

impl DatagramTransport for LoopbackTransport {
    fn send_to(&self, dest: SocketAddr, envelope: &hop_core::Envelope) -> Result<(), TransportError> {
        let bytes = encode_envelope(envelope)?;
        self.wire.lock().unwrap().push_back((self.me, dest, bytes));
        Ok(())
    }
}

struct Host {
    addresses: Vec<SocketAddr>,
    engine: HandshakeEngine,
    events: Arc<Mutex<Vec<(&'static str, PeerEvent)>>>,
}

#[derive(Default)]
struct Lan {
    wire: Wire,
    hosts: Vec<Host>,
}

fn addr(ip: Ipv4Addr) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(ip, PORT))
}

impl Lan {
    /// Adds a host reachable at, and advertising, `interfaces`.  Returns the
    /// host's index.
    fn add_host(&mut self, interfaces: &[Ipv4Addr]) -> usize {
        self.add_multi_homed(interfaces, interfaces)
    }

    /// Adds a host reachable at `reachable` (the first is the one it sends
    /// from) that advertises `advertised` in `introduce`.
    fn add_multi_homed(&mut self, reachable: &[Ipv4Addr], advertised: &[Ipv4Addr]) -> usize {
        let host = self.build_host(reachable, advertised);
        self.hosts.push(host);
        self.hosts.len() - 1
    }

    /// Replaces `host` with a freshly started engine on the same addresses,
    /// as if the process had been restarted.
    fn restart(&mut self, host: usize, interfaces: &[Ipv4Addr]) {
        let fresh = self.build_host(interfaces, interfaces);
        self.hosts[host] = fresh;
    }

    fn build_host(&self, reachable: &[Ipv4Addr], advertised: &[Ipv4Addr]) -> Host {
        let transport = Arc::new(LoopbackTransport {
            me: addr(reachable[0]),
            wire: Arc::clone(&self.wire),
        });
        let bus = EventBus::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        for name in [CONNECTED, INCOMING_CONNECTION, HANDSHAKE_EXPIRED] {
            let events = Arc::clone(&events);
            bus.subscribe(name, move |event: &PeerEvent| {
                events.lock().unwrap().push((name, event.clone()));
            });
        }
        let engine = HandshakeEngine::new(
            LocalEndpoint {
                interfaces: advertised.to_vec(),
                port: PORT,
            },
            transport,
            bus,
            HandshakePolicy {
                retry_interval: Duration::from_secs(1),
                max_attempts: 3,
            },
        );
        Host {
            addresses: reachable.iter().copied().map(addr).collect(),
            engine,
            events,
        }
    }

    fn engine(&self, host: usize) -> &HandshakeEngine {
        &self.hosts[host].engine
    }

    fn events(&self, host: usize, name: &str) -> Vec<PeerEvent> {
        self.hosts[host]
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Delivers queued datagrams until the wire is quiet.  Returns
    /// `(delivered, dropped)`.
    fn pump(&self) -> (usize, usize) {
        let (mut delivered, mut dropped) = (0, 0);
        loop {
            let next = self.wire.lock().unwrap().pop_front();
            let Some((from, to, bytes)) = next else {
                break;
            };
            match self.hosts.iter().find(|h| h.addresses.contains(&to)) {
                Some(host) => {
                    host.engine
                        .handle_datagram(from, decode_envelope(&bytes).unwrap());
                    delivered += 1;
                }
                None => dropped += 1,
            }
        }
        (delivered, dropped)
    }
}

const SERVER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const JOINER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn test_handshake_assigns_ids_symmetrically() {
    // Arrange: the server has already spent id 1 on an unreachable host.
    let mut lan = Lan::default();
    let server = lan.add_host(&[SERVER_IP]);
    let joiner = lan.add_host(&[JOINER_IP]);
    lan.engine(server).connect(Ipv4Addr::new(10, 0, 0, 99), PORT);

    // Act
    let server_id_at_joiner = lan.engine(joiner).connect(SERVER_IP, PORT);
    let (delivered, _) = lan.pump();

    // Assert: introduce, connectionProbe, probeReply, assignId.
    assert_eq!(delivered, 4);
    let joiner_id_at_server: PeerId = 2;
    assert_eq!(
        lan.engine(joiner).peer(server_id_at_joiner).unwrap().incoming_id,
        Some(joiner_id_at_server)
    );
    assert_eq!(
        lan.engine(server).peer(joiner_id_at_server).unwrap().incoming_id,
        Some(server_id_at_joiner)
    );
    assert_eq!(
        lan.events(joiner, CONNECTED),
        vec![PeerEvent::Connected { id: server_id_at_joiner }]
    );
    assert_eq!(
        lan.events(server, INCOMING_CONNECTION),
        vec![PeerEvent::IncomingConnection { id: joiner_id_at_server }]
    );
    assert!(lan.engine(joiner).is_connected(server_id_at_joiner));
}

#[test]
fn test_multi_homed_initiator_is_resolved_through_first_reachable_interface() {
    // Arrange: the first advertised address is unreachable; the other two
    // both lead to the joiner.
    let mut lan = Lan::default();
    let server = lan.add_host(&[SERVER_IP]);
    let lan_ip = Ipv4Addr::new(192, 168, 1, 2);
    let joiner = lan.add_multi_homed(
        &[JOINER_IP, lan_ip],
        &[Ipv4Addr::new(172, 16, 0, 2), JOINER_IP, lan_ip],
    );

    // Act
    let id = lan.engine(joiner).connect(SERVER_IP, PORT);
    let (_, dropped) = lan.pump();

    // Assert: one probe was lost, the second of the two delivered probes was
    // ignored, and only one relationship exists on the server.
    assert_eq!(dropped, 1);
    assert_eq!(lan.engine(server).peer_count(), 1);
    assert_eq!(lan.events(server, INCOMING_CONNECTION).len(), 1);
    let record = lan.engine(server).peer(1).unwrap();
    assert_eq!(record.interface_address, JOINER_IP);
    assert_eq!(record.incoming_id, Some(id));
    assert!(lan.engine(joiner).is_connected(id));
}

#[test]
fn test_application_message_is_stamped_with_receivers_id() {
    // Arrange
    let mut lan = Lan::default();
    let server = lan.add_host(&[SERVER_IP]);
    let joiner = lan.add_host(&[JOINER_IP]);
    let server_id_at_joiner = lan.engine(joiner).connect(SERVER_IP, PORT);
    lan.pump();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    lan.engine(joiner).bus().subscribe(COORD, move |event| {
        if let PeerEvent::Inbound { envelope, .. } = event {
            sink.lock().unwrap().push(envelope.clone());
        }
    });

    // Act
    lan.engine(server).send(1, Message::Coord { x: 12.0, y: 34.0 });
    lan.pump();

    // Assert
    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].id, server_id_at_joiner);
    assert_eq!(received[0].message, Message::Coord { x: 12.0, y: 34.0 });
}

#[test]
fn test_reconnect_from_same_interface_reuses_outgoing_id() {
    // Arrange
    let mut lan = Lan::default();
    let server = lan.add_host(&[SERVER_IP]);
    let joiner = lan.add_host(&[JOINER_IP]);
    lan.engine(joiner).connect(SERVER_IP, PORT);
    lan.pump();

    // Act: the joiner starts a second handshake, e.g. after a restart.
    let second = lan.engine(joiner).connect(SERVER_IP, PORT);
    lan.pump();

    // Assert
    assert_eq!(lan.engine(server).peer_count(), 1);
    let record = lan.engine(server).peer(1).unwrap();
    assert_eq!(record.incoming_id, Some(second));
    assert!(lan.engine(joiner).is_connected(second));
    assert!(lan
        .engine(server)
        .with_directory(|dir| dir.check_consistency())
        .is_ok());
}

#[test]
fn test_restarted_joiner_reusing_its_id_is_announced_again() {
    // Arrange
    let mut lan = Lan::default();
    let server = lan.add_host(&[SERVER_IP]);
    let joiner = lan.add_host(&[JOINER_IP]);
    lan.engine(joiner).connect(SERVER_IP, PORT);
    lan.pump();

    // Act: the joiner process restarts and its fresh counter hands out 1 again.
    lan.restart(joiner, &[JOINER_IP]);
    let id = lan.engine(joiner).connect(SERVER_IP, PORT);
    lan.pump();

    // Assert
    assert_eq!(id, 1);
    assert_eq!(
        lan.events(joiner, CONNECTED),
        vec![PeerEvent::Connected { id: 1 }]
    );
    assert_eq!(
        lan.events(server, INCOMING_CONNECTION),
        vec![
            PeerEvent::IncomingConnection { id: 1 },
            PeerEvent::IncomingConnection { id: 1 }
        ]
    );
    assert_eq!(lan.engine(server).peer_count(), 1);
    assert!(lan.engine(joiner).is_connected(id));
}

#[test]
fn test_send_before_handshake_completes_is_dropped() {
    let mut lan = Lan::default();
    lan.add_host(&[SERVER_IP]);
    let joiner = lan.add_host(&[JOINER_IP]);
    let id = lan.engine(joiner).connect(SERVER_IP, PORT);
    // Discard the introduce without delivering it.
    lan.wire.lock().unwrap().clear();

    lan.engine(joiner).send(id, Message::MouseDown);

    assert!(lan.wire.lock().unwrap().is_empty());
}

#[test]
fn test_unreachable_responder_is_retried_then_expired() {
    // Arrange
    let mut lan = Lan::default();
    let joiner = lan.add_host(&[JOINER_IP]);
    let id = lan.engine(joiner).connect(Ipv4Addr::new(10, 0, 0, 50), PORT);
    let base = Instant::now();

    // Act
    for step in 1..=3 {
        lan.engine(joiner).tick(base + Duration::from_secs(step));
    }
    let (_, dropped) = lan.pump();

    // Assert: the first introduce plus two retries, then expiry.
    assert_eq!(dropped, 3);
    assert_eq!(lan.engine(joiner).peer(id), None);
    assert_eq!(
        lan.events(joiner, HANDSHAKE_EXPIRED),
        vec![PeerEvent::HandshakeExpired { id }]
    );
}
