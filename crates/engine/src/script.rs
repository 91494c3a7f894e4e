//! The contract between the engine and its probe scripts.
//!
//! A script is two entry points: `probe` builds the outbound chain for
//! one (target, port) step, `recv` judges one decoded inbound chain.
//! The engine loads two independent instances, one per worker thread;
//! they must not share state, so a script correlates probe and reply
//! through the cookie helpers on the environment, never in memory.

use std::net::Ipv4Addr;

use thiserror::Error;

use pktizr_netdev::NetdevError;
use pktizr_packet::{PacketChain, PacketError};

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("unknown script '{0}'")]
    Unknown(String),

    #[error("script failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Netdev(#[from] NetdevError),
}

/// What `recv` decided about one inbound chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecvOutcome {
    /// The packet answered one of our probes; count it.
    pub consumed: bool,
    /// The script wants the whole scan to stop.
    pub halt: bool,
}

impl RecvOutcome {
    /// Not ours, keep going.
    pub fn ignore() -> Self {
        Self::default()
    }

    /// Counted as an accepted reply.
    pub fn accept() -> Self {
        Self {
            consumed: true,
            halt: false,
        }
    }
}

/// Utility surface the engine exposes to scripts.
pub trait ScriptEnv {
    /// Source address probes are sent from.
    fn local_ip(&self) -> Ipv4Addr;

    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;

    fn cookie32(&self, src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16) -> u32;

    fn cookie16(&self, src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16) -> u16;

    /// Inject a chain immediately, bypassing the outbound queue and the
    /// rate limit; meant for handshake follow-ups from `recv`. The
    /// Ethernet layer is prepended when the chain starts at IPv4.
    fn send(&mut self, chain: PacketChain) -> Result<(), ScriptError>;

    /// Scan findings, one line per event.
    fn report(&mut self, line: &str);
}

/// A probe script instance, owned by exactly one worker thread.
pub trait Script: Send {
    /// Build the outbound chain for one enumeration step, or `None` to
    /// skip this (target, port) without spending a token.
    fn probe(
        &mut self,
        env: &mut dyn ScriptEnv,
        dst: Ipv4Addr,
        port: u16,
    ) -> Result<Option<PacketChain>, ScriptError>;

    /// Judge one decoded inbound chain.
    fn recv(
        &mut self,
        env: &mut dyn ScriptEnv,
        chain: &PacketChain,
    ) -> Result<RecvOutcome, ScriptError>;
}
