//! Link-layer device abstraction.
//!
//! The engine's send and recv workers run on disjoint halves of the
//! device, so the interface is a pair of traits rather than one handle:
//! `FrameTx` owns a scratch buffer the codec packs into before
//! injection, `FrameRx` yields captured frames as borrows that are
//! released back to the driver on the next call. Drivers behind the
//! traits are interchangeable; the default is a `pnet_datalink`
//! Ethernet channel, and an in-memory pair backs the engine tests.

pub mod datalink;
pub mod iface;
pub mod mem;

use thiserror::Error;

/// Largest frame the scratch buffers accommodate (untagged Ethernet).
pub const MAX_FRAME: usize = 1514;

#[derive(Error, Debug)]
pub enum NetdevError {
    #[error("no such interface: {0}")]
    NoSuchInterface(String),

    #[error("failed to open device on {iface}: {reason}")]
    OpenFailed { iface: String, reason: String },

    #[error("could not resolve a default route: {0}")]
    RouteResolveFailed(String),

    #[error("could not resolve interface details for {0}")]
    IfaceResolveFailed(String),

    #[error("device i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound half: scratch buffer plus blocking single-frame inject.
pub trait FrameTx: Send {
    /// Driver-owned scratch buffer for the next outbound frame.
    fn frame_buf(&mut self) -> &mut [u8];

    /// Send the first `len` bytes of the scratch buffer as one frame.
    fn inject(&mut self, len: usize) -> Result<(), NetdevError>;
}

/// Inbound half: non-blocking single-frame capture.
pub trait FrameRx: Send {
    /// The next captured frame, or `None` when nothing arrived within
    /// the driver's poll window. The returned slice is driver-owned and
    /// valid until the next `capture` call.
    fn capture(&mut self) -> Result<Option<&[u8]>, NetdevError>;
}

/// Open the default driver on the named interface.
pub fn open(ifname: &str) -> Result<(Box<dyn FrameTx>, Box<dyn FrameRx>), NetdevError> {
    datalink::open(ifname)
}
