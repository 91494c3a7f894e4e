//! Default driver: a raw Ethernet channel via `pnet_datalink`.

use std::io;
use std::time::Duration;

use pnet_datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender};
use tracing::debug;

use crate::{FrameRx, FrameTx, NetdevError, MAX_FRAME};

/// How long one capture poll may block before reporting "nothing yet".
const READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Transient-error retries before an inject gives up.
const INJECT_RETRIES: usize = 3;

struct DatalinkTx {
    tx: Box<dyn DataLinkSender>,
    scratch: Vec<u8>,
}

struct DatalinkRx {
    rx: Box<dyn DataLinkReceiver>,
}

pub fn open(ifname: &str) -> Result<(Box<dyn FrameTx>, Box<dyn FrameRx>), NetdevError> {
    let iface = pnet_datalink::interfaces()
        .into_iter()
        .find(|i| i.name == ifname)
        .ok_or_else(|| NetdevError::NoSuchInterface(ifname.to_string()))?;

    let config = Config {
        read_timeout: Some(READ_TIMEOUT),
        ..Default::default()
    };
    match pnet_datalink::channel(&iface, config) {
        Ok(Channel::Ethernet(tx, rx)) => {
            debug!(iface = %ifname, "opened datalink channel");
            Ok((
                Box::new(DatalinkTx {
                    tx,
                    scratch: vec![0u8; MAX_FRAME],
                }),
                Box::new(DatalinkRx { rx }),
            ))
        }
        Ok(_) => Err(NetdevError::OpenFailed {
            iface: ifname.to_string(),
            reason: "unsupported channel type".to_string(),
        }),
        Err(e) => Err(NetdevError::OpenFailed {
            iface: ifname.to_string(),
            reason: e.to_string(),
        }),
    }
}

impl FrameTx for DatalinkTx {
    fn frame_buf(&mut self) -> &mut [u8] {
        &mut self.scratch
    }

    fn inject(&mut self, len: usize) -> Result<(), NetdevError> {
        let frame = &self.scratch[..len.min(MAX_FRAME)];
        let mut attempts = 0;
        loop {
            match self.tx.send_to(frame, None) {
                Some(Ok(())) => return Ok(()),
                Some(Err(e)) if e.kind() == io::ErrorKind::Interrupted && attempts < INJECT_RETRIES => {
                    attempts += 1;
                }
                Some(Err(e)) => return Err(NetdevError::Io(e)),
                None => {
                    return Err(NetdevError::Io(io::Error::new(
                        io::ErrorKind::Other,
                        "datalink sender refused the frame",
                    )))
                }
            }
        }
    }
}

impl FrameRx for DatalinkRx {
    fn capture(&mut self) -> Result<Option<&[u8]>, NetdevError> {
        match self.rx.next() {
            Ok(frame) => Ok(Some(frame)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(NetdevError::Io(e)),
        }
    }
}
