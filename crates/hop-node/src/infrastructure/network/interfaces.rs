//! Local IPv4 addresses to advertise in `introduce`.
//!
//! The responder probes every advertised address, so the list should hold
//! each address a neighbour might plausibly reach.  Loopback is left out and
//! IPv6 is not supported by the handshake.

use std::net::{IpAddr, Ipv4Addr};

use tracing::{debug, warn};

use super::NetworkError;

/// Enumerates the non-loopback IPv4 addresses of this host.
///
/// # Errors
///
/// Returns [`NetworkError::Interfaces`] if the OS query fails.
pub fn local_ipv4_addresses() -> Result<Vec<Ipv4Addr>, NetworkError> {
    let interfaces = if_addrs::get_if_addrs().map_err(NetworkError::Interfaces)?;
    for iface in &interfaces {
        debug!("found interface {} with address {}", iface.name, iface.ip());
    }
    Ok(select_ipv4(interfaces.iter().map(|iface| iface.ip())))
}

/// Returns `configured` if non-empty, otherwise the enumerated addresses.
///
/// An enumeration failure is logged and yields an empty list; the responder
/// then probes the `introduce` datagram's source address instead.
pub fn advertised_addresses(configured: &[Ipv4Addr]) -> Vec<Ipv4Addr> {
    if !configured.is_empty() {
        return configured.to_vec();
    }
    match local_ipv4_addresses() {
        Ok(addresses) => addresses,
        Err(e) => {
            warn!("{e}; advertising no interfaces");
            Vec::new()
        }
    }
}

/// Keeps unique, non-loopback, non-unspecified IPv4 addresses in input order.
fn select_ipv4(addresses: impl IntoIterator<Item = IpAddr>) -> Vec<Ipv4Addr> {
    let mut selected = Vec::new();
    for address in addresses {
        let IpAddr::V4(v4) = address else {
            continue;
        };
        if v4.is_loopback() || v4.is_unspecified() || selected.contains(&v4) {
            continue;
        }
        selected.push(v4);
    }
    selected
}
