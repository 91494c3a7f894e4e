//! Signal-to-stop-flag plumbing.
//!
//! Workers never see signals directly: the handler just sets a flag,
//! and a watcher thread forwards it to the engine's stop token. The
//! handler body stays async-signal-safe (one atomic store).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use pktizr_common::Shutdown;

static SIGNALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_sig: libc::c_int) {
    SIGNALLED.store(true, Ordering::SeqCst);
}

/// Install handlers for SIGINT/SIGTERM/SIGHUP and start the watcher.
pub fn watch(shutdown: Arc<Shutdown>) {
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
        libc::signal(libc::SIGHUP, handler);
    }

    let spawned = thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || loop {
            if SIGNALLED.load(Ordering::SeqCst) {
                info!("signal received, stopping");
                shutdown.request_stop();
                break;
            }
            if shutdown.stop_requested() {
                break;
            }
            thread::sleep(Duration::from_millis(100));
        });
    if let Err(e) = spawned {
        warn!(error = %e, "could not start the signal watcher");
    }
}
