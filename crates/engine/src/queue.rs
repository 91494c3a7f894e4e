//! Outbound chain queue.
//!
//! Multi-producer (loop worker, recv-side script), single consumer
//! (send worker). `SegQueue` gives lock-free push and non-blocking pop
//! with per-producer FIFO order, which is all the engine relies on; no
//! ordering is promised across producers.

use crossbeam_queue::SegQueue;

use pktizr_packet::PacketChain;

#[derive(Default)]
pub struct TxQueue {
    inner: SegQueue<PacketChain>,
}

impl TxQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, chain: PacketChain) {
        self.inner.push(chain);
    }

    pub fn pop(&self) -> Option<PacketChain> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
