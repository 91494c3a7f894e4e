//! Worker threads and scan lifecycle.

use std::io::Write as _;
use std::net::Ipv4Addr;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::bucket::TokenBucket;
use crate::error::EngineError;
use crate::queue::TxQueue;
use crate::script::{Script, ScriptEnv, ScriptError};
use pktizr_common::{Counters, ScanSummary, Shutdown};
use pktizr_netdev::{FrameRx, FrameTx};
use pktizr_packet::{codec, CookieKey, EthHeader, Layer, MacAddr, PacketChain};
use pktizr_ranges::RangeSet;

/// Idle pause when the send queue or the capture ring has nothing for
/// us, short enough to keep the drain latency negligible.
const IDLE_PAUSE: Duration = Duration::from_micros(50);

/// Status thread tick; stop-flag latency is bounded by this.
const STATUS_TICK: Duration = Duration::from_millis(100);

/// Everything a scan needs decided before it starts.
pub struct EngineConfig {
    pub targets: RangeSet,
    pub ports: RangeSet,
    pub count: u64,
    pub rate: u64,
    pub wait: Duration,
    pub quiet: bool,
    pub seed: Option<u64>,
    pub local_mac: MacAddr,
    pub gateway_mac: MacAddr,
    pub local_ip: Ipv4Addr,
}

/// Shared worker state, handed around as an `Arc`. The shutdown flags
/// get their own `Arc` so signal handlers can hold them without seeing
/// the queue or the counters.
struct Shared {
    shutdown: Arc<Shutdown>,
    counters: Counters,
    queue: TxQueue,
}

/// Script-visible utility surface wired to the live engine.
struct EngineEnv {
    local_ip: Ipv4Addr,
    local_mac: MacAddr,
    gateway_mac: MacAddr,
    cookies: CookieKey,
    tx: Arc<Mutex<Box<dyn FrameTx>>>,
    shared: Arc<Shared>,
}

impl EngineEnv {
    /// Wrap script-built network layers in Ethernet toward the gateway.
    fn frame(&self, mut chain: PacketChain) -> PacketChain {
        if !matches!(chain.first(), Some(Layer::Eth(_))) {
            chain.prepend(Layer::Eth(EthHeader {
                src: self.local_mac,
                dst: self.gateway_mac,
                ethertype: 0,
            }));
        }
        chain
    }
}

impl ScriptEnv for EngineEnv {
    fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn cookie32(&self, src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16) -> u32 {
        self.cookies.cookie32(src.into(), dst.into(), sport, dport)
    }

    fn cookie16(&self, src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16) -> u16 {
        self.cookies.cookie16(src.into(), dst.into(), sport, dport)
    }

    fn send(&mut self, chain: PacketChain) -> Result<(), ScriptError> {
        let chain = self.frame(chain);
        let mut dev = self.tx.lock();
        let len = codec::pack(&chain, dev.frame_buf())?;
        dev.inject(len)?;
        self.shared.counters.add_sent();
        if chain.is_probe() {
            self.shared.counters.add_probe();
        }
        Ok(())
    }

    fn report(&mut self, line: &str) {
        println!("{line}");
    }
}

pub struct Engine {
    cfg: EngineConfig,
    shared: Arc<Shared>,
    cookies: CookieKey,
    tx: Arc<Mutex<Box<dyn FrameTx>>>,
    rx: Box<dyn FrameRx>,
    loop_script: Box<dyn Script>,
    recv_script: Box<dyn Script>,
}

impl Engine {
    pub fn new(
        cfg: EngineConfig,
        tx: Box<dyn FrameTx>,
        rx: Box<dyn FrameRx>,
        loop_script: Box<dyn Script>,
        recv_script: Box<dyn Script>,
    ) -> Self {
        let cookies = match cfg.seed {
            Some(seed) => CookieKey::from_seed(seed),
            None => CookieKey::random(),
        };
        Self {
            cfg,
            shared: Arc::new(Shared {
                shutdown: Arc::new(Shutdown::new()),
                counters: Counters::new(),
                queue: TxQueue::new(),
            }),
            cookies,
            tx: Arc::new(Mutex::new(tx)),
            rx,
            loop_script,
            recv_script,
        }
    }

    /// Stop handle for signal wiring; requesting stop here winds the
    /// whole scan down at the next loop boundaries.
    pub fn shutdown_handle(&self) -> Arc<Shutdown> {
        Arc::clone(&self.shared.shutdown)
    }

    /// Run the scan to completion. Blocks until every worker has
    /// exited and returns the final counters.
    pub fn run(self) -> Result<ScanSummary, EngineError> {
        let Engine {
            cfg,
            shared,
            cookies,
            tx,
            rx,
            loop_script,
            recv_script,
        } = self;

        let started = Instant::now();
        let total = cfg.targets.count() * cfg.ports.count() * cfg.count;
        info!(
            probes = total,
            targets = cfg.targets.count(),
            ports = cfg.ports.count(),
            count = cfg.count,
            rate = cfg.rate,
            "starting scan"
        );

        let make_env = |shared: &Arc<Shared>| EngineEnv {
            local_ip: cfg.local_ip,
            local_mac: cfg.local_mac,
            gateway_mac: cfg.gateway_mac,
            cookies,
            tx: Arc::clone(&tx),
            shared: Arc::clone(shared),
        };

        let (ready_tx, ready_rx) = mpsc::channel::<&'static str>();

        let loop_handle = {
            let shared = Arc::clone(&shared);
            let env = make_env(&shared);
            let ready = ready_tx.clone();
            let targets = cfg.targets.clone();
            let ports = cfg.ports.clone();
            let bucket = TokenBucket::new(cfg.rate);
            let count = cfg.count;
            thread::Builder::new()
                .name("loop".to_string())
                .spawn(move || loop_worker(shared, env, loop_script, targets, ports, count, bucket, ready))
                .map_err(|_| EngineError::Worker("loop"))?
        };

        let send_handle = {
            let shared = Arc::clone(&shared);
            let tx = Arc::clone(&tx);
            let ready = ready_tx.clone();
            let bucket = TokenBucket::new(cfg.rate);
            thread::Builder::new()
                .name("send".to_string())
                .spawn(move || send_worker(shared, tx, bucket, ready))
                .map_err(|_| EngineError::Worker("send"))?
        };

        let recv_handle = {
            let shared = Arc::clone(&shared);
            let env = make_env(&shared);
            let ready = ready_tx.clone();
            thread::Builder::new()
                .name("recv".to_string())
                .spawn(move || recv_worker(shared, env, recv_script, rx, ready))
                .map_err(|_| EngineError::Worker("recv"))?
        };
        drop(ready_tx);

        // every worker checks in before the status thread starts the clock
        for _ in 0..3 {
            let name = ready_rx
                .recv_timeout(Duration::from_secs(5))
                .map_err(|_| EngineError::Worker("startup"))?;
            debug!(worker = name, "ready");
        }

        let status_handle = {
            let shared = Arc::clone(&shared);
            let wait = cfg.wait;
            let quiet = cfg.quiet;
            thread::Builder::new()
                .name("status".to_string())
                .spawn(move || status_worker(shared, wait, quiet))
                .map_err(|_| EngineError::Worker("status"))?
        };

        loop_handle.join().map_err(|_| EngineError::Worker("loop"))?;
        send_handle.join().map_err(|_| EngineError::Worker("send"))?;
        recv_handle.join().map_err(|_| EngineError::Worker("recv"))?;
        status_handle
            .join()
            .map_err(|_| EngineError::Worker("status"))?;

        let snap = shared.counters.snapshot();
        let summary = ScanSummary {
            sent: snap.sent,
            probes: snap.probes,
            received: snap.received,
            elapsed: started.elapsed(),
        };
        info!(
            sent = summary.sent,
            probes = summary.probes,
            received = summary.received,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "scan finished"
        );
        Ok(summary)
    }
}

/// Map one enumeration index to its (target ordinal, port ordinal).
/// All targets cycle within a port, `count` consecutive duplicates per
/// pair.
#[inline]
fn pair_indices(i: u64, count: u64, target_count: u64) -> (u64, u64) {
    let pair = i / count;
    (pair % target_count, pair / target_count)
}

#[allow(clippy::too_many_arguments)]
fn loop_worker(
    shared: Arc<Shared>,
    mut env: EngineEnv,
    mut script: Box<dyn Script>,
    targets: RangeSet,
    ports: RangeSet,
    count: u64,
    bucket: TokenBucket,
    ready: mpsc::Sender<&'static str>,
) {
    let _ = ready.send("loop");
    let target_count = targets.count();
    let total = target_count * ports.count() * count;
    for i in 0..total {
        if shared.shutdown.stop_requested() {
            break;
        }
        if !bucket.wait_ready(&shared.shutdown) {
            break;
        }
        let (t_idx, p_idx) = pair_indices(i, count, target_count);
        let daddr = Ipv4Addr::from(targets.pick(t_idx) as u32);
        let dport = ports.pick(p_idx) as u16;
        match script.probe(&mut env, daddr, dport) {
            Ok(Some(mut chain)) => {
                chain.set_probe(true);
                let chain = env.frame(chain);
                shared.queue.push(chain);
                bucket.debit();
            }
            Ok(None) => {
                // skipped pair, no token spent
            }
            Err(e) => {
                warn!(dst = %daddr, port = dport, error = %e, "probe script failed");
            }
        }
    }
    shared.shutdown.signal_done();
    debug!("loop worker done");
}

fn send_worker(
    shared: Arc<Shared>,
    tx: Arc<Mutex<Box<dyn FrameTx>>>,
    bucket: TokenBucket,
    ready: mpsc::Sender<&'static str>,
) {
    let _ = ready.send("send");
    loop {
        if shared.shutdown.stop_requested() {
            break;
        }
        bucket.refill();
        let mut moved = false;
        while bucket.has_token() {
            let Some(chain) = shared.queue.pop() else {
                break;
            };
            moved = true;
            let mut dev = tx.lock();
            match codec::pack(&chain, dev.frame_buf()) {
                Ok(len) => match dev.inject(len) {
                    Ok(()) => {
                        shared.counters.add_sent();
                        if chain.is_probe() {
                            shared.counters.add_probe();
                        }
                        bucket.debit();
                    }
                    Err(e) => {
                        warn!(error = %e, "inject failed, dropping frame");
                    }
                },
                Err(e) => {
                    debug!(error = %e, "dropping unencodable chain");
                }
            }
        }
        if !moved {
            thread::sleep(IDLE_PAUSE);
        }
    }
    debug!("send worker done");
}

fn recv_worker(
    shared: Arc<Shared>,
    mut env: EngineEnv,
    mut script: Box<dyn Script>,
    mut rx: Box<dyn FrameRx>,
    ready: mpsc::Sender<&'static str>,
) {
    let _ = ready.send("recv");
    loop {
        if shared.shutdown.stop_requested() {
            break;
        }
        let chain = match rx.capture() {
            Ok(Some(frame)) => match codec::unpack(frame) {
                Ok(chain) => chain,
                Err(e) => {
                    debug!(error = %e, "undecodable frame dropped");
                    continue;
                }
            },
            Ok(None) => {
                thread::sleep(IDLE_PAUSE);
                continue;
            }
            Err(e) => {
                warn!(error = %e, "capture error");
                thread::sleep(IDLE_PAUSE);
                continue;
            }
        };
        match script.recv(&mut env, &chain) {
            Ok(outcome) => {
                if outcome.consumed {
                    shared.counters.add_received();
                }
                if outcome.halt {
                    info!("script requested halt");
                    shared.shutdown.request_stop();
                }
            }
            Err(e) => {
                warn!(error = %e, "recv script failed, packet dropped");
            }
        }
    }
    debug!("recv worker done");
}

/// Progress line, drain window, final stop.
fn status_worker(shared: Arc<Shared>, wait: Duration, quiet: bool) {
    let mut drain_started: Option<Instant> = None;
    let mut last_print = Instant::now();
    let mut last_sent = 0u64;
    loop {
        if shared.shutdown.stop_requested() {
            break;
        }
        if drain_started.is_none() && shared.shutdown.is_done() && shared.queue.is_empty() {
            debug!(wait_secs = wait.as_secs(), "all probes out, draining");
            drain_started = Some(Instant::now());
        }
        if let Some(t0) = drain_started {
            if t0.elapsed() >= wait {
                shared.shutdown.request_stop();
                break;
            }
        }
        if !quiet && last_print.elapsed() >= Duration::from_secs(1) {
            let snap = shared.counters.snapshot();
            let rate = (snap.sent - last_sent) as f64 / last_print.elapsed().as_secs_f64();
            eprint!(
                "\rrate: {rate:8.0} pkt/s  sent: {:<10}  recv: {:<10}",
                snap.sent, snap.received
            );
            let _ = std::io::stderr().flush();
            last_print = Instant::now();
            last_sent = snap.sent;
        }
        thread::sleep(STATUS_TICK);
    }
    if !quiet {
        let snap = shared.counters.snapshot();
        eprintln!(
            "\rsent: {}  probes: {}  recv: {}              ",
            snap.sent, snap.probes, snap.received
        );
    }
}
