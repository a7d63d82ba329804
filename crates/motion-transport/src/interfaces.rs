//! Local interface discovery.
//!
//! Enumerates the host's interfaces and keeps the ones that can carry the
//! motors' IPv4 multicast: administratively up, not loopback, with at least
//! one IPv4 address.

use std::io;
use std::net::{IpAddr, Ipv4Addr};

use serde::Serialize;
use tracing::{debug, error};

/// An interface that can join the motor multicast group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceCandidate {
    pub name: String,
    pub ipv4: Vec<Ipv4Addr>,
}

impl InterfaceCandidate {
    pub fn owns(&self, addr: Ipv4Addr) -> bool {
        self.ipv4.contains(&addr)
    }
}

/// Raw view of one interface as reported by the OS.
#[derive(Debug, Clone)]
pub struct InterfaceRecord {
    pub name: String,
    pub up: bool,
    pub loopback: bool,
    pub addresses: Vec<IpAddr>,
}

/// Enumerate local interfaces and keep the usable ones.
/// Enumeration failure is logged and yields an empty list.
pub fn select_candidates() -> Vec<InterfaceCandidate> {
    match list_interfaces() {
        Ok(records) => filter_candidates(records),
        Err(e) => {
            error!("Error getting network interfaces: {}", e);
            Vec::new()
        }
    }
}

/// Resolve an address to the interface it is bound on.
pub fn find_by_address(addr: Ipv4Addr) -> Option<InterfaceCandidate> {
    select_candidates().into_iter().find(|c| c.owns(addr))
}

pub fn filter_candidates(
    records: impl IntoIterator<Item = InterfaceRecord>,
) -> Vec<InterfaceCandidate> {
    records
        .into_iter()
        .filter_map(|record| {
            if !record.up || record.loopback {
                debug!(
                    interface = %record.name,
                    up = record.up,
                    loopback = record.loopback,
                    "Skipping interface"
                );
                return None;
            }

            let ipv4: Vec<Ipv4Addr> = record
                .addresses
                .iter()
                .filter_map(|addr| match addr {
                    IpAddr::V4(v4) => Some(*v4),
                    IpAddr::V6(_) => None,
                })
                .collect();

            if ipv4.is_empty() {
                debug!(interface = %record.name, "Skipping interface without IPv4 address");
                return None;
            }

            Some(InterfaceCandidate {
                name: record.name,
                ipv4,
            })
        })
        .collect()
}

/// getifaddrs yields one entry per (interface, address); fold them per name
/// keeping the OS order.
#[cfg(unix)]
fn list_interfaces() -> io::Result<Vec<InterfaceRecord>> {
    use nix::ifaddrs::getifaddrs;
    use nix::net::if_::InterfaceFlags;

    let mut records: Vec<InterfaceRecord> = Vec::new();

    for entry in getifaddrs().map_err(io::Error::from)? {
        let address = entry
            .address
            .as_ref()
            .and_then(|storage| storage.as_sockaddr_in())
            .map(|sin| IpAddr::V4(*std::net::SocketAddrV4::from(*sin).ip()));

        let index = match records
            .iter()
            .position(|r| r.name == entry.interface_name)
        {
            Some(index) => index,
            None => {
                records.push(InterfaceRecord {
                    name: entry.interface_name.clone(),
                    up: entry.flags.contains(InterfaceFlags::IFF_UP),
                    loopback: entry.flags.contains(InterfaceFlags::IFF_LOOPBACK),
                    addresses: Vec::new(),
                });
                records.len() - 1
            }
        };

        if let Some(address) = address {
            records[index].addresses.push(address);
        }
    }

    Ok(records)
}

/// Without getifaddrs there are no flags; every listed interface is treated
/// as up and loopback is judged by address.
#[cfg(not(unix))]
fn list_interfaces() -> io::Result<Vec<InterfaceRecord>> {
    let interfaces = local_ip_address::list_afinet_netifas().map_err(io::Error::other)?;

    let mut records: Vec<InterfaceRecord> = Vec::new();
    for (name, ip) in interfaces {
        match records.iter_mut().find(|r| r.name == name) {
            Some(record) => record.addresses.push(ip),
            None => records.push(InterfaceRecord {
                name,
                up: true,
                loopback: ip.is_loopback(),
                addresses: vec![ip],
            }),
        }
    }

    Ok(records)
}
