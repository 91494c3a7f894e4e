//! Scan configuration as parsed from the command line.

use std::net::Ipv4Addr;

/// Everything the operator can ask for in one scan.
///
/// Range specs are kept as strings here; the runner parses them into
/// interval sets right before the engine starts, so a malformed spec
/// fails the process before any thread is spawned.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Comma-separated target spec: `A.B.C.D`, `A.B.C.D-E.F.G.H`, `A.B.C.D/prefix`.
    pub targets: String,
    /// Comma-separated port spec: `n` or `a-b`.
    pub ports: String,
    /// Name of the probe script to load, twice (loop side and recv side).
    pub script: String,
    /// Probes per second; 0 disables throttling entirely.
    pub rate: u64,
    /// Cookie key seed; `None` draws from OS entropy.
    pub seed: Option<u64>,
    /// Seconds to keep capturing after the last probe went out.
    pub wait: u64,
    /// Duplicate probes per (target, port) pair.
    pub count: u64,
    /// Source address override; defaults to the interface address.
    pub local_addr: Option<Ipv4Addr>,
    /// Gateway override; defaults to the default route's gateway.
    pub gateway_addr: Option<Ipv4Addr>,
    /// Suppress the status line.
    pub quiet: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            targets: String::new(),
            ports: "1".to_string(),
            script: String::new(),
            rate: 100,
            seed: None,
            wait: 5,
            count: 1,
            local_addr: None,
            gateway_addr: None,
            quiet: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cli_defaults() {
        let cfg = ScanConfig::default();
        assert_eq!(cfg.ports, "1");
        assert_eq!(cfg.rate, 100);
        assert_eq!(cfg.wait, 5);
        assert_eq!(cfg.count, 1);
        assert!(cfg.seed.is_none());
        assert!(!cfg.quiet);
    }
}
