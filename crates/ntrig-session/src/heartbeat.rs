use std::sync::atomic::{AtomicBool, Ordering};

use ntrig_frame::LowMessage;
use tracing::debug;

use crate::counters::{Counter, CounterTable};
use crate::ncp;
use crate::validator::{check_header, ReportContract};

/// Keepalive bookkeeping shared by the drain and write paths.
///
/// `pending_ack` is raised while the bus is held and acted upon only after it
/// is released. `awaiting_reply` marks a request of ours whose solicited
/// reply must be swallowed.
#[derive(Debug, Default)]
pub struct HeartbeatState {
    pending_ack: AtomicBool,
    awaiting_reply: AtomicBool,
}

impl HeartbeatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a complete reply carrying the heartbeat signature.
    ///
    /// Returns `true` when the message is consumed here and must not reach the
    /// reply queue.
    pub fn on_heartbeat(&self, msg: &LowMessage, data: &[u8], counters: &CounterTable) -> bool {
        counters.increment(Counter::Heartbeat);
        if check_header(msg, &ReportContract::HEARTBEAT, counters).is_empty() {
            counters.increment(Counter::ValidHeartbeat);
        }

        if ncp::is_unsolicited(data) {
            debug!("unsolicited heartbeat, ACK deferred");
            self.pending_ack.store(true, Ordering::Release);
            true
        } else if self.awaiting_reply.swap(false, Ordering::AcqRel) {
            debug!("discarding solicited heartbeat reply");
            true
        } else {
            debug!("solicited heartbeat passed to reply queue");
            false
        }
    }

    /// Whether an ACK is owed to the sensor.
    pub fn ack_pending(&self) -> bool {
        self.pending_ack.load(Ordering::Acquire)
    }

    /// Clear and return the owed-ACK flag.
    pub fn take_pending_ack(&self) -> bool {
        self.pending_ack.swap(false, Ordering::AcqRel)
    }

    /// Put the owed-ACK flag back after a failed send.
    pub fn restore_pending_ack(&self) {
        self.pending_ack.store(true, Ordering::Release);
    }

    /// Whether a solicited reply is expected.
    pub fn awaiting_reply(&self) -> bool {
        self.awaiting_reply.load(Ordering::Acquire)
    }

    pub fn expect_reply(&self, expect: bool) {
        self.awaiting_reply.store(expect, Ordering::Release);
    }
}
