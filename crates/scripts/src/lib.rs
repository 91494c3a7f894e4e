//! Built-in probe scripts.
//!
//! Each script is a pair of functions behind the engine's script host
//! trait: `probe` crafts one outbound chain per (target, port) step and
//! `recv` judges decoded inbound chains. Correlation is stateless:
//! every probe carries a keyed cookie over its flow 4-tuple, and a
//! reply counts only if it echoes the cookie back (sequence numbers for
//! TCP, id/seq for ICMP, the payload for UDP).

pub mod ack;
pub mod ping;
pub mod syn;
pub mod udp;

use pktizr_common::ScanConfig;
use pktizr_engine::{Script, ScriptError};

/// Source port every built-in probe transmits from; replies are
/// recognized partly by coming back to it.
pub const SOURCE_PORT: u16 = 64434;

/// Instantiate a fresh script context by name. The engine loads two,
/// one per worker thread.
pub fn load(name: &str, _cfg: &ScanConfig) -> Result<Box<dyn Script>, ScriptError> {
    match name {
        "syn" => Ok(Box::new(syn::SynScan)),
        "ping" => Ok(Box::new(ping::Ping)),
        "udp" => Ok(Box::new(udp::UdpProbe)),
        "ack" => Ok(Box::new(ack::AckProbe)),
        other => Err(ScriptError::Unknown(other.to_string())),
    }
}

/// Names for the CLI help text.
pub const AVAILABLE: &[&str] = &["syn", "ping", "udp", "ack"];
