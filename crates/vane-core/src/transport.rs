//! Telemetry transport and image-transfer backpressure
//!
//! The wind engine does not own a network stack. It publishes through
//! [`Transport`] and checks [`TransferMonitor`] before doing so, so a long
//! image upload on the same link is never interleaved with telemetry.

use core::sync::atomic::{AtomicBool, Ordering};

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("publish to {topic_len}-byte topic timed out")]
    Timeout { topic_len: usize },
    #[error("broker rejected publish: {0}")]
    Rejected(&'static str),
}

/// Publish/subscribe client used for every report.
pub trait Transport {
    /// Publish `payload` to `topic`. An empty retained payload erases the
    /// topic's retained message.
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> impl Future<Output = Result<(), TransportError>>;
}

/// Busy signal from the image subsystem
pub trait TransferMonitor {
    fn is_transfer_busy(&self) -> bool;
}

/// Lock-free busy flag the image task raises for the duration of a transfer.
pub struct TransferGate {
    busy: AtomicBool,
}

impl TransferGate {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::Release);
    }
}

impl Default for TransferGate {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferMonitor for TransferGate {
    fn is_transfer_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl<M: TransferMonitor> TransferMonitor for &M {
    fn is_transfer_busy(&self) -> bool {
        (**self).is_transfer_busy()
    }
}
