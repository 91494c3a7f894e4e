//! In-memory driver for tests.
//!
//! `pair()` yields a tx/rx pair plus a handle: frames injected on the
//! tx side are recorded for inspection, and the test feeds synthetic
//! inbound frames through the handle for the rx side to capture. The
//! engine cannot tell it apart from a real device.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{FrameRx, FrameTx, NetdevError, MAX_FRAME};

#[derive(Default)]
struct MemState {
    injected: Vec<Vec<u8>>,
    inbound: VecDeque<Vec<u8>>,
}

/// Test-side view of the in-memory link.
#[derive(Clone, Default)]
pub struct MemHandle {
    state: Arc<Mutex<MemState>>,
}

impl MemHandle {
    /// Frames injected so far, oldest first.
    pub fn injected(&self) -> Vec<Vec<u8>> {
        self.state.lock().injected.clone()
    }

    pub fn injected_count(&self) -> usize {
        self.state.lock().injected.len()
    }

    /// Queue a frame for the rx side to capture.
    pub fn push_inbound(&self, frame: Vec<u8>) {
        self.state.lock().inbound.push_back(frame);
    }
}

struct MemTx {
    state: Arc<Mutex<MemState>>,
    scratch: Vec<u8>,
}

struct MemRx {
    state: Arc<Mutex<MemState>>,
    last: Vec<u8>,
}

/// Build a connected tx/rx pair and its observation handle.
pub fn pair() -> (Box<dyn FrameTx>, Box<dyn FrameRx>, MemHandle) {
    let handle = MemHandle::default();
    let tx = MemTx {
        state: handle.state.clone(),
        scratch: vec![0u8; MAX_FRAME],
    };
    let rx = MemRx {
        state: handle.state.clone(),
        last: Vec::new(),
    };
    (Box::new(tx), Box::new(rx), handle)
}

impl FrameTx for MemTx {
    fn frame_buf(&mut self) -> &mut [u8] {
        &mut self.scratch
    }

    fn inject(&mut self, len: usize) -> Result<(), NetdevError> {
        let len = len.min(self.scratch.len());
        self.state.lock().injected.push(self.scratch[..len].to_vec());
        Ok(())
    }
}

impl FrameRx for MemRx {
    fn capture(&mut self) -> Result<Option<&[u8]>, NetdevError> {
        let popped = self.state.lock().inbound.pop_front();
        match popped {
            Some(frame) => {
                self.last = frame;
                Ok(Some(&self.last))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_frames_are_recorded() {
        let (mut tx, _rx, handle) = pair();
        tx.frame_buf()[..4].copy_from_slice(&[1, 2, 3, 4]);
        tx.inject(4).unwrap();
        assert_eq!(handle.injected(), vec![vec![1, 2, 3, 4]]);
    }

    #[test]
    fn inbound_frames_come_back_in_order() {
        let (_tx, mut rx, handle) = pair();
        assert!(rx.capture().unwrap().is_none());
        handle.push_inbound(vec![1]);
        handle.push_inbound(vec![2]);
        assert_eq!(rx.capture().unwrap(), Some(&[1u8][..]));
        assert_eq!(rx.capture().unwrap(), Some(&[2u8][..]));
        assert!(rx.capture().unwrap().is_none());
    }
}
