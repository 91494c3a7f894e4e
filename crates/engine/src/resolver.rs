//! Gateway MAC resolution over ARP.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::EngineError;
use pktizr_netdev::{FrameRx, FrameTx};
use pktizr_packet::{
    arp_op, codec, ArpHeader, EthHeader, Layer, MacAddr, PacketChain,
};

/// How long to wait for the gateway before giving up.
pub const ARP_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle pause between capture polls while waiting for the reply.
const POLL_PAUSE: Duration = Duration::from_millis(1);

/// Broadcast an ARP request for `gateway_ip` and wait for the matching
/// reply, returning the gateway's hardware address.
pub fn resolve_gateway_mac(
    tx: &mut dyn FrameTx,
    rx: &mut dyn FrameRx,
    local_mac: MacAddr,
    local_ip: Ipv4Addr,
    gateway_ip: Ipv4Addr,
) -> Result<MacAddr, EngineError> {
    resolve_gateway_mac_within(tx, rx, local_mac, local_ip, gateway_ip, ARP_TIMEOUT)
}

/// Same as [`resolve_gateway_mac`] with an explicit deadline; tests use
/// short ones.
pub fn resolve_gateway_mac_within(
    tx: &mut dyn FrameTx,
    rx: &mut dyn FrameRx,
    local_mac: MacAddr,
    local_ip: Ipv4Addr,
    gateway_ip: Ipv4Addr,
    timeout: Duration,
) -> Result<MacAddr, EngineError> {
    let request = PacketChain::from_layers(vec![
        Layer::Eth(EthHeader {
            src: local_mac,
            dst: MacAddr::BROADCAST,
            ethertype: 0,
        }),
        Layer::Arp(ArpHeader {
            op: arp_op::REQUEST,
            sha: local_mac,
            spa: local_ip,
            tha: MacAddr::ZERO,
            tpa: gateway_ip,
            ..Default::default()
        }),
    ]);
    let len = codec::pack(&request, tx.frame_buf())?;
    tx.inject(len)?;
    debug!(%gateway_ip, "arp request sent");

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match rx.capture()? {
            Some(frame) => {
                let Ok(chain) = codec::unpack(frame) else {
                    continue;
                };
                if let Some(arp) = chain.arp() {
                    if arp.op == arp_op::REPLY && arp.spa == gateway_ip && arp.tpa == local_ip {
                        debug!(gateway_mac = %arp.sha, "gateway resolved");
                        return Ok(arp.sha);
                    }
                }
            }
            None => std::thread::sleep(POLL_PAUSE),
        }
    }
    Err(EngineError::ArpTimeout(gateway_ip))
}
