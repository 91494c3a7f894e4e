use std::net::Ipv4Addr;

use thiserror::Error;

use crate::script::ScriptError;
use pktizr_netdev::NetdevError;
use pktizr_packet::PacketError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no arp reply from gateway {0} within the timeout")]
    ArpTimeout(Ipv4Addr),

    #[error(transparent)]
    Netdev(#[from] NetdevError),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("{0} worker did not start or panicked")]
    Worker(&'static str),
}
