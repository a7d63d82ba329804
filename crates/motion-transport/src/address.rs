use std::net::{IpAddr, Ipv4Addr};

use tracing::debug;

use crate::interfaces;

/// Source of the host's primary IPv4 address, consulted once per start attempt.
pub trait AddressProvider: Send + Sync {
    fn primary_ipv4(&self) -> Option<Ipv4Addr>;
}

/// Resolves the primary address from the host: a configured override wins,
/// then the address of the default-route interface, then the first usable
/// interface candidate.
#[derive(Debug, Clone, Default)]
pub struct LocalAddressProvider {
    override_addr: Option<Ipv4Addr>,
}

impl LocalAddressProvider {
    pub fn new(override_addr: Option<Ipv4Addr>) -> Self {
        Self { override_addr }
    }
}

impl AddressProvider for LocalAddressProvider {
    fn primary_ipv4(&self) -> Option<Ipv4Addr> {
        if let Some(addr) = self.override_addr {
            return Some(addr);
        }

        match local_ip_address::local_ip() {
            Ok(IpAddr::V4(addr)) => return Some(addr),
            Ok(IpAddr::V6(addr)) => debug!(%addr, "Default route is IPv6, scanning interfaces"),
            Err(e) => debug!("Default route lookup failed: {}", e),
        }

        interfaces::select_candidates()
            .into_iter()
            .flat_map(|c| c.ipv4)
            .next()
    }
}
