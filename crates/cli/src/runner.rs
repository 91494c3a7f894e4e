//! Scan startup: resolve the network context, open the device, load
//! the scripts, hand everything to the engine.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use pktizr_common::ScanConfig;
use pktizr_engine::{resolver, Engine, EngineConfig};
use pktizr_netdev::iface;
use pktizr_ranges::{parse_ports, parse_targets};

use crate::signal;

pub fn run_scan(cfg: ScanConfig) -> Result<()> {
    let targets = parse_targets(&cfg.targets).context("invalid target specification")?;
    let ports = parse_ports(&cfg.ports).context("invalid port specification")?;

    let (ifname, route_gateway) =
        iface::default_route().context("could not determine the default route")?;
    let link = iface::lookup(&ifname)
        .with_context(|| format!("could not resolve interface {ifname}"))?;

    // the two overrides are independent: either may be set without
    // disturbing the other
    let local_ip = cfg.local_addr.unwrap_or(link.ip);
    let gateway_ip = cfg.gateway_addr.unwrap_or(route_gateway);

    info!(
        iface = %ifname,
        local_mac = %link.mac,
        %local_ip,
        %gateway_ip,
        script = %cfg.script,
        "scan context resolved"
    );

    let (mut tx, mut rx) =
        pktizr_netdev::open(&ifname).with_context(|| format!("could not open {ifname}"))?;
    let gateway_mac =
        resolver::resolve_gateway_mac(tx.as_mut(), rx.as_mut(), link.mac, local_ip, gateway_ip)
            .context("gateway did not answer arp")?;

    let loop_script = pktizr_scripts::load(&cfg.script, &cfg).context("could not load script")?;
    let recv_script = pktizr_scripts::load(&cfg.script, &cfg).context("could not load script")?;

    let engine = Engine::new(
        EngineConfig {
            targets,
            ports,
            count: cfg.count,
            rate: cfg.rate,
            wait: Duration::from_secs(cfg.wait),
            quiet: cfg.quiet,
            seed: cfg.seed,
            local_mac: link.mac,
            gateway_mac,
            local_ip,
        },
        tx,
        rx,
        loop_script,
        recv_script,
    );

    signal::watch(engine.shutdown_handle());
    let summary = engine.run().context("scan failed")?;
    info!(
        sent = summary.sent,
        probes = summary.probes,
        received = summary.received,
        rate_pps = summary.rate() as u64,
        "scan summary"
    );
    Ok(())
}
