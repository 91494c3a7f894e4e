//! ICMP echo sweep.
//!
//! ICMP has no ports, so the cookie is keyed on `(local, dst,
//! SOURCE_PORT, 0)` and carried in the echo sequence field; the id is a
//! constant. The 8-byte payload is the send timestamp, which the echo
//! reply carries back for a round-trip estimate.

use std::net::Ipv4Addr;

use pktizr_engine::{RecvOutcome, Script, ScriptEnv, ScriptError};
use pktizr_packet::{icmp_type, IcmpHeader, Ip4Header, Layer, PacketChain};

use crate::SOURCE_PORT;

/// Echo identifier shared by every probe of a run.
const ECHO_ID: u16 = 1;

pub struct Ping;

impl Script for Ping {
    fn probe(
        &mut self,
        env: &mut dyn ScriptEnv,
        dst: Ipv4Addr,
        _port: u16,
    ) -> Result<Option<PacketChain>, ScriptError> {
        let seq = env.cookie16(env.local_ip(), dst, SOURCE_PORT, 0);
        let mut chain = PacketChain::new();
        chain.push(Layer::Ip4(Ip4Header {
            src: env.local_ip(),
            dst,
            ..Default::default()
        }));
        chain.push(Layer::Icmp(IcmpHeader {
            icmp_type: icmp_type::ECHO_REQUEST,
            code: 0,
            id: ECHO_ID,
            seq,
        }));
        chain.push(Layer::Raw(env.now_ms().to_be_bytes().to_vec()));
        Ok(Some(chain))
    }

    fn recv(
        &mut self,
        env: &mut dyn ScriptEnv,
        chain: &PacketChain,
    ) -> Result<RecvOutcome, ScriptError> {
        let (Some(ip), Some(icmp)) = (chain.ip4(), chain.icmp()) else {
            return Ok(RecvOutcome::ignore());
        };
        if icmp.icmp_type != icmp_type::ECHO_REPLY
            || icmp.id != ECHO_ID
            || ip.dst != env.local_ip()
        {
            return Ok(RecvOutcome::ignore());
        }
        if icmp.seq != env.cookie16(env.local_ip(), ip.src, SOURCE_PORT, 0) {
            return Ok(RecvOutcome::ignore());
        }

        match echo_timestamp(chain.raw()) {
            Some(then) => {
                let rtt = env.now_ms().saturating_sub(then);
                env.report(&format!("{} is up ({rtt} ms)", ip.src));
            }
            None => env.report(&format!("{} is up", ip.src)),
        }
        Ok(RecvOutcome::accept())
    }
}

fn echo_timestamp(payload: Option<&[u8]>) -> Option<u64> {
    let bytes: [u8; 8] = payload?.get(..8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testenv::TestEnv;

    fn echo_reply(env: &TestEnv, from: Ipv4Addr, seq: u16, payload: Vec<u8>) -> PacketChain {
        PacketChain::from_layers(vec![
            Layer::Ip4(Ip4Header {
                src: from,
                dst: env.local,
                ..Default::default()
            }),
            Layer::Icmp(IcmpHeader {
                icmp_type: icmp_type::ECHO_REPLY,
                code: 0,
                id: ECHO_ID,
                seq,
            }),
            Layer::Raw(payload),
        ])
    }

    #[test]
    fn probe_carries_cookie_and_timestamp() {
        let mut env = TestEnv::new();
        let dst = Ipv4Addr::new(10, 0, 0, 9);
        let chain = Ping.probe(&mut env, dst, 0).unwrap().unwrap();
        let icmp = chain.icmp().unwrap();
        assert_eq!(icmp.icmp_type, icmp_type::ECHO_REQUEST);
        assert_eq!(icmp.id, ECHO_ID);
        assert_eq!(
            icmp.seq,
            env.cookies
                .cookie16(env.local.into(), dst.into(), SOURCE_PORT, 0)
        );
        assert_eq!(chain.raw().unwrap(), env.now.to_be_bytes());
    }

    #[test]
    fn matching_reply_reports_rtt() {
        let mut env = TestEnv::new();
        let from = Ipv4Addr::new(10, 0, 0, 9);
        let seq = env
            .cookies
            .cookie16(env.local.into(), from.into(), SOURCE_PORT, 0);
        let then = env.now - 12;
        let chain = echo_reply(&env, from, seq, then.to_be_bytes().to_vec());
        assert!(Ping.recv(&mut env, &chain).unwrap().consumed);
        assert_eq!(env.reports, vec!["10.0.0.9 is up (12 ms)"]);
    }

    #[test]
    fn wrong_seq_is_ignored() {
        let mut env = TestEnv::new();
        let from = Ipv4Addr::new(10, 0, 0, 9);
        let seq = env
            .cookies
            .cookie16(env.local.into(), from.into(), SOURCE_PORT, 0);
        let chain = echo_reply(&env, from, seq.wrapping_add(1), vec![0; 8]);
        assert!(!Ping.recv(&mut env, &chain).unwrap().consumed);
    }

    #[test]
    fn short_payload_still_reports() {
        let mut env = TestEnv::new();
        let from = Ipv4Addr::new(10, 0, 0, 9);
        let seq = env
            .cookies
            .cookie16(env.local.into(), from.into(), SOURCE_PORT, 0);
        let chain = echo_reply(&env, from, seq, vec![1, 2]);
        assert!(Ping.recv(&mut env, &chain).unwrap().consumed);
        assert_eq!(env.reports, vec!["10.0.0.9 is up"]);
    }
}
