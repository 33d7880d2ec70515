//! Bounded hand-off between the receive thread and the decode worker.
//!
//! Receiving must never block on decoding, so a full queue sheds its oldest
//! frame to make room for the newest.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;

use super::IngestFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pushed {
    Queued,
    /// Queue was full; the oldest frame was discarded
    DroppedOldest,
    /// The decode worker's receiver is gone; the frame was discarded
    Closed,
}

pub struct FrameSender {
    sender: Sender<IngestFrame>,
    /// Lets the producer evict from the head of the queue
    evictor: Receiver<IngestFrame>,
}

pub struct FrameReceiver {
    receiver: Receiver<IngestFrame>,
}

pub fn frame_queue(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (sender, receiver) = bounded(capacity.max(1));
    (
        FrameSender {
            sender,
            evictor: receiver.clone(),
        },
        FrameReceiver { receiver },
    )
}

impl FrameSender {
    pub fn push(&self, frame: IngestFrame) -> Pushed {
        // The evictor is always one of the receivers
        if self.sender.receiver_count() <= 1 {
            return Pushed::Closed;
        }

        let mut frame = frame;
        let mut dropped = false;

        loop {
            match self.sender.try_send(frame) {
                Ok(()) => {
                    return if dropped {
                        Pushed::DroppedOldest
                    } else {
                        Pushed::Queued
                    };
                }
                Err(TrySendError::Full(rejected)) => {
                    // The consumer may have drained it meanwhile; either way retry
                    if self.evictor.try_recv().is_ok() {
                        dropped = true;
                    }
                    frame = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return Pushed::Closed,
            }
        }
    }
}

impl FrameReceiver {
    /// Next frame in arrival order
    pub fn recv_timeout(&self, timeout: Duration) -> Result<IngestFrame, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Frames currently waiting
    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}
