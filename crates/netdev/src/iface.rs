//! Interface and route discovery for engine startup.

use std::net::{IpAddr, Ipv4Addr};

use pktizr_packet::MacAddr;
use tracing::debug;

use crate::NetdevError;

/// What the engine needs to know about its local interface.
#[derive(Debug, Clone)]
pub struct LinkInfo {
    pub name: String,
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
}

/// Look up the MAC and first IPv4 address of a named interface.
pub fn lookup(name: &str) -> Result<LinkInfo, NetdevError> {
    let iface = pnet_datalink::interfaces()
        .into_iter()
        .find(|i| i.name == name)
        .ok_or_else(|| NetdevError::NoSuchInterface(name.to_string()))?;

    let mac = iface
        .mac
        .map(|m| MacAddr([m.0, m.1, m.2, m.3, m.4, m.5]))
        .ok_or_else(|| NetdevError::IfaceResolveFailed(name.to_string()))?;
    let ip = iface
        .ips
        .iter()
        .find_map(|net| match net.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| NetdevError::IfaceResolveFailed(name.to_string()))?;

    debug!(iface = %name, %mac, %ip, "resolved interface");
    Ok(LinkInfo {
        name: name.to_string(),
        mac,
        ip,
    })
}

/// Resolve the default route to `(interface name, gateway address)`.
#[cfg(target_os = "linux")]
pub fn default_route() -> Result<(String, Ipv4Addr), NetdevError> {
    let table = std::fs::read_to_string("/proc/net/route")
        .map_err(|e| NetdevError::RouteResolveFailed(e.to_string()))?;
    parse_route_table(&table)
        .ok_or_else(|| NetdevError::RouteResolveFailed("no default route entry".to_string()))
}

#[cfg(not(target_os = "linux"))]
pub fn default_route() -> Result<(String, Ipv4Addr), NetdevError> {
    Err(NetdevError::RouteResolveFailed(
        "route table lookup is only implemented on linux".to_string(),
    ))
}

/// Scan a `/proc/net/route` table for the first usable default entry.
///
/// Addresses in the table are the in-memory u32 rendered as hex, so the
/// network-order bytes come back out little-endian.
fn parse_route_table(table: &str) -> Option<(String, Ipv4Addr)> {
    const RTF_UP: u32 = 0x0001;
    const RTF_GATEWAY: u32 = 0x0002;

    for line in table.lines().skip(1) {
        let mut fields = line.split_whitespace();
        let iface = fields.next()?;
        let dest = u32::from_str_radix(fields.next()?, 16).ok()?;
        let gateway = u32::from_str_radix(fields.next()?, 16).ok()?;
        let flags = u32::from_str_radix(fields.next()?, 16).ok()?;
        if dest == 0 && flags & RTF_UP != 0 && flags & RTF_GATEWAY != 0 {
            return Some((iface.to_string(), Ipv4Addr::from(gateway.to_le_bytes())));
        }
    }
    None
}
