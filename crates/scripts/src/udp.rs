//! UDP probe.
//!
//! The datagram payload is the 4-byte flow cookie. Two kinds of
//! answers matter: a UDP reply back to our source port means the
//! service spoke, and an ICMP port-unreachable quoting our datagram
//! means the port is closed. The quote is parsed by hand from the ICMP
//! payload (embedded IPv4 header plus the first 8 bytes of our UDP
//! header, per RFC 792), with the embedded source port and, when
//! quoted, the cookie payload tying it back to this scan.

use std::net::Ipv4Addr;

use pktizr_engine::{RecvOutcome, Script, ScriptEnv, ScriptError};
use pktizr_packet::{icmp_type, ip_proto, Ip4Header, Layer, PacketChain, UdpHeader};

use crate::SOURCE_PORT;

pub struct UdpProbe;

impl Script for UdpProbe {
    fn probe(
        &mut self,
        env: &mut dyn ScriptEnv,
        dst: Ipv4Addr,
        port: u16,
    ) -> Result<Option<PacketChain>, ScriptError> {
        let cookie = env.cookie32(env.local_ip(), dst, SOURCE_PORT, port);
        let mut chain = PacketChain::new();
        chain.push(Layer::Ip4(Ip4Header {
            src: env.local_ip(),
            dst,
            ..Default::default()
        }));
        chain.push(Layer::Udp(UdpHeader {
            sport: SOURCE_PORT,
            dport: port,
            zero_checksum: false,
        }));
        chain.push(Layer::Raw(cookie.to_be_bytes().to_vec()));
        Ok(Some(chain))
    }

    fn recv(
        &mut self,
        env: &mut dyn ScriptEnv,
        chain: &PacketChain,
    ) -> Result<RecvOutcome, ScriptError> {
        let Some(ip) = chain.ip4() else {
            return Ok(RecvOutcome::ignore());
        };
        if ip.dst != env.local_ip() {
            return Ok(RecvOutcome::ignore());
        }

        if let Some(udp) = chain.udp() {
            if udp.dport == SOURCE_PORT {
                env.report(&format!("{}:{} open", ip.src, udp.sport));
                return Ok(RecvOutcome::accept());
            }
            return Ok(RecvOutcome::ignore());
        }

        if let Some(icmp) = chain.icmp() {
            if icmp.icmp_type == icmp_type::DEST_UNREACHABLE
                && icmp.code == icmp_type::CODE_PORT_UNREACHABLE
            {
                if let Some(quote) = chain.raw().and_then(parse_quoted_udp) {
                    if quote.sport == SOURCE_PORT && quote_matches_cookie(env, &quote) {
                        env.report(&format!("{}:{} closed", quote.dst, quote.dport));
                        return Ok(RecvOutcome::accept());
                    }
                }
            }
        }
        Ok(RecvOutcome::ignore())
    }
}

/// The bits of our original datagram an ICMP error quotes back.
struct QuotedUdp {
    dst: Ipv4Addr,
    sport: u16,
    dport: u16,
    payload_prefix: Option<[u8; 4]>,
}

/// Pull the embedded IPv4+UDP headers out of an ICMP error payload.
fn parse_quoted_udp(quote: &[u8]) -> Option<QuotedUdp> {
    let version_ihl = *quote.first()?;
    if version_ihl >> 4 != 4 {
        return None;
    }
    let hdr_len = usize::from(version_ihl & 0x0f) * 4;
    if hdr_len < 20 || quote.len() < hdr_len + 8 {
        return None;
    }
    if quote[9] != ip_proto::UDP {
        return None;
    }
    let dst = Ipv4Addr::new(quote[16], quote[17], quote[18], quote[19]);
    let udp = &quote[hdr_len..];
    let sport = u16::from_be_bytes([udp[0], udp[1]]);
    let dport = u16::from_be_bytes([udp[2], udp[3]]);
    // routers quote at least our UDP header; some include the payload
    let payload_prefix = udp
        .get(8..12)
        .and_then(|b| <[u8; 4]>::try_from(b).ok());
    Some(QuotedUdp {
        dst,
        sport,
        dport,
        payload_prefix,
    })
}

/// When the quote carries our payload, insist it is our cookie.
fn quote_matches_cookie(env: &dyn ScriptEnv, quote: &QuotedUdp) -> bool {
    match quote.payload_prefix {
        Some(prefix) => {
            let cookie = env.cookie32(env.local_ip(), quote.dst, SOURCE_PORT, quote.dport);
            prefix == cookie.to_be_bytes()
        }
        // header-only quote: the source port match is all we have
        None => true,
    }
}
