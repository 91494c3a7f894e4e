//! Shared plumbing for the pktizr workspace.
//!
//! This crate carries the pieces every other crate agrees on:
//! - the parsed scan configuration handed from the CLI to the runner,
//!   the engine and the script loader
//! - the shutdown flag pair coordinating the worker threads
//! - the packet counters and the end-of-scan summary

pub mod config;
pub mod stats;
pub mod sync;

pub use config::ScanConfig;
pub use stats::{CounterSnapshot, Counters, ScanSummary};
pub use sync::Shutdown;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
