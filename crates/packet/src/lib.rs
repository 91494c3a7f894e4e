//! Packet object model and wire codec.
//!
//! A packet is a chain of typed layer headers, outermost first, encoded
//! and decoded against the standard Ethernet II / ARP / IPv4 / ICMP /
//! TCP / UDP wire formats. The codec owns every derived field: lengths,
//! ethertype/protocol dispatch bytes and checksums are computed on
//! encode and read back on decode, never supplied by the caller.
//!
//! The cookie module provides the keyed flow hashes that let a
//! stateless scanner recognize replies to its own probes.

pub mod checksum;
pub mod codec;
pub mod cookie;
pub mod error;
pub mod layer;
pub mod wire;

pub use codec::{pack, unpack};
pub use cookie::CookieKey;
pub use error::PacketError;
pub use layer::{
    arp_op, eth_type, icmp_type, ip_proto, tcp_flags, ArpHeader, EthHeader, IcmpHeader,
    Ip4Header, Layer, MacAddr, PacketChain, TcpHeader, UdpHeader,
};
