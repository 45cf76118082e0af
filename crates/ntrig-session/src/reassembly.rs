use bytes::Bytes;
use ntrig_frame::MAX_LOGICAL_MESSAGE_SIZE;
use tracing::{debug, warn};

/// Why an in-progress logical message was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentError {
    /// The remaining-fragments count did not step down by one.
    Sequence { previous: u8, current: u8 },
    /// The assembled message would not fit in the aggregation buffer.
    Overflow { size: usize, capacity: usize },
}

/// Result of offering one fragment to the [`Reassembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// The logical message is complete.
    Complete(Bytes),
    /// More fragments are needed.
    Pending,
    /// The in-progress message was discarded.
    Discarded(FragmentError),
}

/// Collects multi-fragment replies into one bounded aggregation buffer.
#[derive(Debug, Default)]
pub struct Reassembler {
    buf: heapless::Vec<u8, MAX_LOGICAL_MESSAGE_SIZE>,
    fragments_left: u8,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a logical message is partly assembled.
    pub fn in_progress(&self) -> bool {
        self.fragments_left > 0
    }

    /// Bytes assembled so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Offer a fragment with `remaining` fragments still to come.
    ///
    /// A lone message (`remaining == 0` with nothing in progress) completes
    /// immediately.
    pub fn accept(&mut self, payload: &[u8], remaining: u8) -> FragmentOutcome {
        if remaining == 0 && !self.in_progress() {
            self.buf.clear();
            return FragmentOutcome::Complete(Bytes::copy_from_slice(payload));
        }

        if self.in_progress() && self.fragments_left != remaining.wrapping_add(1) {
            let error = FragmentError::Sequence {
                previous: self.fragments_left,
                current: remaining,
            };
            warn!(previous = self.fragments_left, current = remaining, "fragment sequence corrupted, discarding");
            self.reset();
            return FragmentOutcome::Discarded(error);
        }

        if self.buf.extend_from_slice(payload).is_err() {
            let error = FragmentError::Overflow {
                size: self.buf.len() + payload.len(),
                capacity: self.buf.capacity(),
            };
            warn!(size = self.buf.len() + payload.len(), capacity = self.buf.capacity(), "logical message too large, discarding");
            self.reset();
            return FragmentOutcome::Discarded(error);
        }
        self.fragments_left = remaining;

        if remaining > 0 {
            debug!(remaining, assembled = self.buf.len(), "waiting for more fragments");
            return FragmentOutcome::Pending;
        }

        let complete = Bytes::copy_from_slice(&self.buf);
        self.buf.clear();
        FragmentOutcome::Complete(complete)
    }

    /// Drop any partly assembled message.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.fragments_left = 0;
    }
}
