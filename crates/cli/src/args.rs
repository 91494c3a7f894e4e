use std::net::Ipv4Addr;

use clap::Parser;

use pktizr_common::ScanConfig;

#[derive(Parser)]
#[command(name = "pktizr")]
#[command(version)]
#[command(about = "Scriptable stateless packet generator and analyzer", long_about = None)]
pub struct Cli {
    /// Targets: comma-separated A.B.C.D, A.B.C.D-E.F.G.H or A.B.C.D/prefix
    pub targets: String,

    /// Probe script to run (syn, ping, udp, ack)
    #[arg(short = 'S', long)]
    pub script: String,

    /// Destination ports: a, a-b, comma-joined
    #[arg(short, long, default_value = "1")]
    pub ports: String,

    /// Probes per second; 0 disables rate limiting
    #[arg(short, long, default_value_t = 100)]
    pub rate: u64,

    /// Cookie key seed; defaults to OS entropy
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Seconds to keep capturing after the last probe
    #[arg(short, long, default_value_t = 5)]
    pub wait: u64,

    /// Duplicate probes per (target, port)
    #[arg(short, long, default_value_t = 1)]
    pub count: u64,

    /// Source address override
    #[arg(short = 'l', long)]
    pub local_addr: Option<Ipv4Addr>,

    /// Gateway address override
    #[arg(short = 'g', long)]
    pub gateway_addr: Option<Ipv4Addr>,

    /// Suppress the status line
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn into_config(self) -> ScanConfig {
        ScanConfig {
            targets: self.targets,
            ports: self.ports,
            script: self.script,
            rate: self.rate,
            seed: self.seed,
            wait: self.wait,
            count: self.count,
            local_addr: self.local_addr,
            gateway_addr: self.gateway_addr,
            quiet: self.quiet,
        }
    }
}
