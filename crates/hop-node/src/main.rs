//! hopscreen node entry point.
//!
//! Loads the configuration, binds the UDP socket, builds a [`Node`] for the
//! chosen role, and runs the single-threaded event loop.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config() + CLI overrides
//!  └─ UdpTransport::bind()
//!  └─ Node::serve() | Node::join()
//!  └─ select! loop
//!       ├─ UDP datagram        -> Node::on_datagram
//!       ├─ capture event       -> Node::on_capture
//!       ├─ sampling interval   -> Node::on_tick
//!       ├─ handshake interval  -> Node::on_handshake_timer
//!       └─ Ctrl-C              -> Node::shutdown
//! ```
//!
//! # Why one thread? (for beginners)
//!
//! Every handler in the node is synchronous and short.  Running them all from
//! one `tokio::select!` loop on a `current_thread` runtime means a handler
//! never races another one, so the bus, the peer directory, and the
//! transition state need no real locking discipline.
//!
//! # Platform capture, cursor, and emulation
//!
//! The node ships the in-memory `MockInputSource`, `MockCursorController`,
//! and `MockInputEmulator`.  They keep the binary runnable headless; OS
//! backends plug in behind the same traits.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hop_core::peering::{DatagramTransport, LocalEndpoint};
use hop_core::protocol::codec::MAX_DATAGRAM_SIZE;
use hop_node::application::node::{Node, NodeSettings};
use hop_node::infrastructure::{
    cursor::mock::MockCursorController,
    input_capture::{mock::MockInputSource, InputSource},
    input_emulation::mock::MockInputEmulator,
    network::{interfaces::advertised_addresses, udp::UdpTransport},
    storage::config::{load_config, AppConfig},
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Share one keyboard and mouse across networked screens.
#[derive(Debug, Parser)]
#[command(name = "hop-node", about = "Peer-to-peer screen hopping node", version)]
struct Cli {
    /// Path to the TOML configuration file.  A missing file means defaults.
    #[arg(long, default_value = "hopscreen.toml", env = "HOPSCREEN_CONFIG")]
    config: PathBuf,

    /// This screen's nickname.  Overrides `[node].nickname`.
    #[arg(long, env = "HOPSCREEN_NICKNAME")]
    nickname: Option<String>,

    /// UDP port to listen on.  Overrides `[node].port`.
    #[arg(long, env = "HOPSCREEN_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    role: Role,
}

#[derive(Debug, Subcommand)]
enum Role {
    /// Own the keyboard and mouse and hand them to neighbouring screens.
    Serve,

    /// Lend this screen to a serving node.
    Join {
        /// IPv4 address of the serving node.
        #[arg(long, env = "HOPSCREEN_CONNECT_IP")]
        ip: Option<Ipv4Addr>,

        /// The serving node's port.  Defaults to this node's port.
        #[arg(long, env = "HOPSCREEN_REMOTE_PORT")]
        remote_port: Option<u16>,
    },
}

impl Cli {
    /// Applies the command-line overrides on top of the file configuration.
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(nickname) = &self.nickname {
            config.node.nickname = nickname.clone();
        }
        if let Some(port) = self.port {
            config.node.port = port;
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);

    // `RUST_LOG` wins; otherwise the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.node.log_level)),
        )
        .init();

    if let Err(e) = run(cli.role, config).await {
        error!("fatal: {e:#}");
        return Err(e);
    }
    Ok(())
}

async fn run(role: Role, config: AppConfig) -> anyhow::Result<()> {
    let bind_addr = config.node.bind_socket_addr()?;
    let transport = Arc::new(UdpTransport::bind(bind_addr).await?);
    let port = transport.local_addr()?.port();

    let settings = NodeSettings {
        nickname: config.node.nickname.clone(),
        local: LocalEndpoint {
            interfaces: advertised_addresses(&config.node.advertise),
            port,
        },
        policy: config.handshake.policy(),
        layout: config.screens.clone(),
        recenter: config.node.recenter(),
    };
    info!(
        "advertising {:?} on port {port}",
        settings.local.interfaces
    );

    let capture = Arc::new(MockInputSource::new());
    let mut capture_rx = capture.start()?;
    let datagrams: Arc<dyn DatagramTransport> = transport.clone();

    let mut node = match role {
        Role::Serve => Node::serve(
            settings,
            datagrams,
            Arc::new(MockCursorController::new()),
            capture.clone(),
        )?,
        Role::Join { ip, remote_port } => {
            let target = ip.map(|ip| SocketAddrV4::new(ip, remote_port.unwrap_or(port)));
            Node::join(settings, target, datagrams, Arc::new(MockInputEmulator::new()))?
        }
    };

    let mut sampling = interval(config.node.poll_interval());
    sampling.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut handshake = interval(config.handshake.policy().retry_interval);
    handshake.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    // ── Main event loop ───────────────────────────────────────────────────────
    loop {
        tokio::select! {
            received = transport.recv_from(&mut buf) => match received {
                Ok((len, from)) => node.on_datagram(from, &buf[..len]),
                Err(e) => warn!("UDP receive failed: {e}"),
            },
            Some(event) = capture_rx.recv() => node.on_capture(event),
            _ = sampling.tick() => {
                node.on_tick();
            }
            now = handshake.tick() => node.on_handshake_timer(now.into_std()),
            signal = &mut shutdown => {
                match signal {
                    Ok(()) => info!("received Ctrl-C; shutting down"),
                    Err(e) => error!("failed to listen for Ctrl-C: {e}"),
                }
                break;
            }
        }
    }

    node.shutdown();
    capture.stop();
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
