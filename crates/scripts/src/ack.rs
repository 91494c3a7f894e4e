//! TCP ACK probe for firewall mapping.
//!
//! An unsolicited ACK draws a RST from any host whose port is not
//! screened, whatever its open/closed state, so the interesting
//! distinction is answered ("unfiltered") versus silence ("filtered").
//! The probe's acknowledgment number carries the cookie; a live host
//! echoes it back as the sequence number of its RST.

use std::net::Ipv4Addr;

use pktizr_engine::{RecvOutcome, Script, ScriptEnv, ScriptError};
use pktizr_packet::{tcp_flags, Ip4Header, Layer, PacketChain, TcpHeader};

use crate::SOURCE_PORT;

pub struct AckProbe;

impl Script for AckProbe {
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
        chain.push(Layer::Tcp(TcpHeader {
            sport: SOURCE_PORT,
            dport: port,
            seq: cookie,
            ack_seq: cookie,
            flags: tcp_flags::ACK,
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
        if tcp.dport != SOURCE_PORT
            || ip.dst != env.local_ip()
            || tcp.flags & tcp_flags::RST == 0
        {
            return Ok(RecvOutcome::ignore());
        }
        let cookie = env.cookie32(env.local_ip(), ip.src, SOURCE_PORT, tcp.sport);
        if tcp.seq != cookie {
            return Ok(RecvOutcome::ignore());
        }
        env.report(&format!("{}:{} unfiltered", ip.src, tcp.sport));
        Ok(RecvOutcome::accept())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testenv::TestEnv;

    #[test]
    fn probe_is_a_bare_ack_with_cookie() {
        let mut env = TestEnv::new();
        let dst = Ipv4Addr::new(192, 0, 2, 1);
        let chain = AckProbe.probe(&mut env, dst, 22).unwrap().unwrap();
        let tcp = chain.tcp().unwrap();
        let cookie = env
            .cookies
            .cookie32(env.local.into(), dst.into(), SOURCE_PORT, 22);
        assert_eq!(tcp.flags, tcp_flags::ACK);
        assert_eq!(tcp.ack_seq, cookie);
    }

    #[test]
    fn rst_echoing_the_cookie_is_unfiltered() {
        let mut env = TestEnv::new();
        let from = Ipv4Addr::new(192, 0, 2, 1);
        let cookie = env
            .cookies
            .cookie32(env.local.into(), from.into(), SOURCE_PORT, 22);
        let chain = PacketChain::from_layers(vec![
            Layer::Ip4(Ip4Header {
                src: from,
                dst: env.local,
                ..Default::default()
            }),
            Layer::Tcp(TcpHeader {
                sport: 22,
                dport: SOURCE_PORT,
                seq: cookie,
                flags: tcp_flags::RST,
                ..Default::default()
            }),
        ]);
        assert!(AckProbe.recv(&mut env, &chain).unwrap().consumed);
        assert_eq!(env.reports, vec!["192.0.2.1:22 unfiltered"]);
    }

    #[test]
    fn rst_with_foreign_seq_is_ignored() {
        let mut env = TestEnv::new();
        let from = Ipv4Addr::new(192, 0, 2, 1);
        let chain = PacketChain::from_layers(vec![
            Layer::Ip4(Ip4Header {
                src: from,
                dst: env.local,
                ..Default::default()
            }),
            Layer::Tcp(TcpHeader {
                sport: 22,
                dport: SOURCE_PORT,
                seq: 12345,
                flags: tcp_flags::RST,
                ..Default::default()
            }),
        ]);
        assert!(!AckProbe.recv(&mut env, &chain).unwrap().consumed);
    }
}
