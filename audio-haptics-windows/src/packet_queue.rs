//! Bounded hand-off from a capture worker thread to the capture thread.
//!
//! The worker side never blocks: when the consumer falls behind, packets
//! are dropped, and when it has gone away the worker is told to exit.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use audio_haptics_core::models::error::CaptureError;

use crate::error::PlatformError;

/// One captured packet, copied out of the driver buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub data: Vec<u8>,
    pub frames: usize,
    pub silent: bool,
}

pub type PacketResult = Result<Packet, CaptureError>;

/// Worker half of the queue.
pub struct PacketSender {
    tx: Sender<PacketResult>,
}

/// Create a queue holding at most `capacity` undelivered items.
pub fn packet_queue(capacity: usize) -> (PacketSender, Receiver<PacketResult>) {
    let (tx, rx) = bounded(capacity);
    (PacketSender { tx }, rx)
}

impl PacketSender {
    /// Queue a packet or a terminal error without blocking.
    ///
    /// Returns `Ok(false)` if the queue was full and the item was dropped.
    /// A dropped error still ends the session: the worker exits after
    /// reporting it, and the consumer then sees the queue disconnect.
    pub fn offer(&self, item: PacketResult) -> Result<bool, PlatformError> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(Ok(_))) => {
                log::debug!("Capture thread behind; dropping packet");
                Ok(false)
            }
            Err(TrySendError::Full(Err(e))) => {
                log::debug!("Capture thread behind; dropping error: {}", e);
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Err(PlatformError::WorkerGone),
        }
    }
}
