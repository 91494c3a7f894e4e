//! TCP SYN scan.
//!
//! The probe's initial sequence number is the cookie over the flow
//! 4-tuple, so a SYN+ACK (or RST) acknowledging `cookie + 1` proves the
//! reply answers one of our probes. Open ports get a RST follow-up to
//! tear the half-open connection down; the follow-up is not a probe, so
//! progress counting ignores it.

use std::net::Ipv4Addr;

use pktizr_engine::{RecvOutcome, Script, ScriptEnv, ScriptError};
use pktizr_packet::{tcp_flags, Ip4Header, Layer, PacketChain, TcpHeader};

use crate::SOURCE_PORT;

pub struct SynScan;

impl Script for SynScan {
    fn probe(
        &mut self,
        env: &mut dyn ScriptEnv,
        dst: Ipv4Addr,
        port: u16,
    ) -> Result<Option<PacketChain>, ScriptError> {
        let seq = env.cookie32(env.local_ip(), dst, SOURCE_PORT, port);
        let mut chain = PacketChain::new();
        chain.push(Layer::Ip4(Ip4Header {
            src: env.local_ip(),
            dst,
            ..Default::default()
        }));
        chain.push(Layer::Tcp(TcpHeader {
            sport: SOURCE_PORT,
            dport: port,
            seq,
            flags: tcp_flags::SYN,
            ..Default::default()
        }));
        Ok(Some(chain))
    }

    fn recv(
        &mut self,
        env: &mut dyn ScriptEnv,
        chain: &PacketChain,
    ) -> Result<RecvOutcome, ScriptError> {
        let (Some(ip), Some(tcp)) = (chain.ip4(), chain.tcp()) else {
            return Ok(RecvOutcome::ignore());
        };
        if tcp.dport != SOURCE_PORT || ip.dst != env.local_ip() {
            return Ok(RecvOutcome::ignore());
        }
        let cookie = env.cookie32(env.local_ip(), ip.src, SOURCE_PORT, tcp.sport);
        if tcp.ack_seq.wrapping_sub(1) != cookie {
            return Ok(RecvOutcome::ignore());
        }

        if tcp.has_flags(tcp_flags::SYN | tcp_flags::ACK) {
            env.report(&format!("{}:{} open", ip.src, tcp.sport));
            let mut rst = PacketChain::new();
            rst.push(Layer::Ip4(Ip4Header {
                src: env.local_ip(),
                dst: ip.src,
                ..Default::default()
            }));
            rst.push(Layer::Tcp(TcpHeader {
                sport: SOURCE_PORT,
                dport: tcp.sport,
                seq: tcp.ack_seq,
                flags: tcp_flags::RST,
                ..Default::default()
            }));
            env.send(rst)?;
            Ok(RecvOutcome::accept())
        } else if tcp.flags & tcp_flags::RST != 0 {
            env.report(&format!("{}:{} closed", ip.src, tcp.sport));
            Ok(RecvOutcome::accept())
        } else {
            Ok(RecvOutcome::ignore())
        }
    }
}
