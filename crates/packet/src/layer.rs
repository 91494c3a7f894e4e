//! Typed layer headers and the packet chain.
//!
//! A chain is an ordered sequence of layer values, outermost first when
//! serialized. Probe scripts usually build the network layers only
//! (IPv4, then TCP/UDP/ICMP, then an opaque payload) and the engine
//! prepends the Ethernet layer before the chain hits the wire.
//!
//! Fields the codec derives (lengths, dispatch bytes, checksums) do not
//! appear here unless decode needs somewhere to store the wire value;
//! see the per-field notes.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Ethertype values the codec dispatches on.
pub mod eth_type {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
}

/// IPv4 protocol numbers the codec dispatches on.
pub mod ip_proto {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

/// ARP operation codes.
pub mod arp_op {
    pub const REQUEST: u16 = 1;
    pub const REPLY: u16 = 2;
}

/// TCP flag bits as they sit in the header's flags byte.
pub mod tcp_flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
}

/// ICMP message types used by the built-in probes.
pub mod icmp_type {
    pub const ECHO_REPLY: u8 = 0;
    pub const DEST_UNREACHABLE: u8 = 3;
    pub const ECHO_REQUEST: u8 = 8;

    /// Code for port unreachable under `DEST_UNREACHABLE`.
    pub const CODE_PORT_UNREACHABLE: u8 = 3;
}

/// 48-bit Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    #[inline]
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in &mut octets {
            let part = parts.next().ok_or_else(|| format!("bad MAC '{s}'"))?;
            *octet = u8::from_str_radix(part, 16).map_err(|_| format!("bad MAC '{s}'"))?;
        }
        if parts.next().is_some() {
            return Err(format!("bad MAC '{s}'"));
        }
        Ok(MacAddr(octets))
    }
}

/// Ethernet II header.
///
/// `ethertype` is derived from the next layer on encode; decode stores
/// the wire value so re-encoding an unknown-type frame is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthHeader {
    pub src: MacAddr,
    pub dst: MacAddr,
    pub ethertype: u16,
}

impl Default for EthHeader {
    fn default() -> Self {
        Self {
            src: MacAddr::ZERO,
            dst: MacAddr::ZERO,
            ethertype: 0,
        }
    }
}

/// RFC 826 ARP for IPv4 over Ethernet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpHeader {
    pub hw_type: u16,
    pub proto_type: u16,
    pub op: u16,
    pub sha: MacAddr,
    pub spa: Ipv4Addr,
    pub tha: MacAddr,
    pub tpa: Ipv4Addr,
}

impl Default for ArpHeader {
    fn default() -> Self {
        Self {
            hw_type: 1,
            proto_type: eth_type::IPV4,
            op: arp_op::REQUEST,
            sha: MacAddr::ZERO,
            spa: Ipv4Addr::UNSPECIFIED,
            tha: MacAddr::ZERO,
            tpa: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// RFC 791 IPv4 header.
///
/// Total length, IHL and the header checksum are codec-owned.
/// `protocol` is derived from the next layer when there is one to
/// derive from; a chain that ends in `Raw` (fragments, protocols we do
/// not model) keeps the value stored here. Options ride along as
/// opaque bytes and must be a multiple of four long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ip4Header {
    pub id: u16,
    pub ttl: u8,
    pub tos: u8,
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub df: bool,
    pub mf: bool,
    pub frag_offset: u16,
    pub options: Vec<u8>,
}

impl Default for Ip4Header {
    fn default() -> Self {
        Self {
            id: 0,
            ttl: 64,
            tos: 0,
            protocol: 0,
            src: Ipv4Addr::UNSPECIFIED,
            dst: Ipv4Addr::UNSPECIFIED,
            df: false,
            mf: false,
            frag_offset: 0,
            options: Vec::new(),
        }
    }
}

impl Ip4Header {
    /// True when this header describes a fragment of a larger datagram.
    #[inline]
    pub fn is_fragment(&self) -> bool {
        self.mf || self.frag_offset != 0
    }
}

/// RFC 792 ICMP header (echo-style layout: type, code, id, seq).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IcmpHeader {
    pub icmp_type: u8,
    pub code: u8,
    pub id: u16,
    pub seq: u16,
}

/// RFC 793 TCP header.
///
/// Data offset and checksum are codec-owned; options ride along as
/// opaque bytes (multiple of four) and push the data offset past five
/// words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader {
    pub sport: u16,
    pub dport: u16,
    pub seq: u32,
    pub ack_seq: u32,
    pub flags: u8,
    pub window: u16,
    pub urg_ptr: u16,
    pub options: Vec<u8>,
}

impl Default for TcpHeader {
    fn default() -> Self {
        Self {
            sport: 0,
            dport: 0,
            seq: 0,
            ack_seq: 0,
            flags: 0,
            window: 64240,
            urg_ptr: 0,
            options: Vec::new(),
        }
    }
}

impl TcpHeader {
    #[inline]
    pub fn has_flags(&self, mask: u8) -> bool {
        self.flags & mask == mask
    }
}

/// RFC 768 UDP header. Length and checksum are codec-owned;
/// `zero_checksum` records a zero wire checksum on decode so that
/// re-encoding leaves it zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UdpHeader {
    pub sport: u16,
    pub dport: u16,
    pub zero_checksum: bool,
}

/// One layer of a packet chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Eth(EthHeader),
    Arp(ArpHeader),
    Ip4(Ip4Header),
    Icmp(IcmpHeader),
    Tcp(TcpHeader),
    Udp(UdpHeader),
    Raw(Vec<u8>),
}

impl Layer {
    /// Layers that may carry another layer behind them. `Raw` may only
    /// terminate a chain.
    #[inline]
    pub fn is_container(&self) -> bool {
        !matches!(self, Layer::Raw(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Layer::Eth(_) => "eth",
            Layer::Arp(_) => "arp",
            Layer::Ip4(_) => "ip4",
            Layer::Icmp(_) => "icmp",
            Layer::Tcp(_) => "tcp",
            Layer::Udp(_) => "udp",
            Layer::Raw(_) => "raw",
        }
    }
}

/// Ordered layer sequence representing one packet, outermost first,
/// plus the probe flag driving progress accounting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PacketChain {
    layers: Vec<Layer>,
    probe: bool,
}

impl PacketChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_layers(layers: Vec<Layer>) -> Self {
        Self {
            layers,
            probe: false,
        }
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn push(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    /// Insert a layer in front of the chain; the engine uses this to
    /// wrap script-built network layers in Ethernet.
    pub fn prepend(&mut self, layer: Layer) {
        self.layers.insert(0, layer);
    }

    #[inline]
    pub fn first(&self) -> Option<&Layer> {
        self.layers.first()
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Layer> {
        self.layers.get(idx)
    }

    #[inline]
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn set_probe(&mut self, probe: bool) {
        self.probe = probe;
    }

    pub fn eth(&self) -> Option<&EthHeader> {
        self.layers.iter().find_map(|l| match l {
            Layer::Eth(h) => Some(h),
            _ => None,
        })
    }

    pub fn arp(&self) -> Option<&ArpHeader> {
        self.layers.iter().find_map(|l| match l {
            Layer::Arp(h) => Some(h),
            _ => None,
        })
    }

    pub fn ip4(&self) -> Option<&Ip4Header> {
        self.layers.iter().find_map(|l| match l {
            Layer::Ip4(h) => Some(h),
            _ => None,
        })
    }

    pub fn icmp(&self) -> Option<&IcmpHeader> {
        self.layers.iter().find_map(|l| match l {
            Layer::Icmp(h) => Some(h),
            _ => None,
        })
    }

    pub fn tcp(&self) -> Option<&TcpHeader> {
        self.layers.iter().find_map(|l| match l {
            Layer::Tcp(h) => Some(h),
            _ => None,
        })
    }

    pub fn udp(&self) -> Option<&UdpHeader> {
        self.layers.iter().find_map(|l| match l {
            Layer::Udp(h) => Some(h),
            _ => None,
        })
    }

    pub fn raw(&self) -> Option<&[u8]> {
        self.layers.iter().find_map(|l| match l {
            Layer::Raw(b) => Some(b.as_slice()),
            _ => None,
        })
    }
}
