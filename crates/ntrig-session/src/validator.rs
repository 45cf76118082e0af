use std::fmt::Write as _;

use bitflags::bitflags;
use ntrig_frame::{
    LowMessage, FRAME_SIZE_LARGE, FUNCTION_MT_REPORT, FUNCTION_NCP, FUNCTION_PEN_REPORT,
    HEADER_SIZE, TYPE_RESPONSE, TYPE_SPONTANEOUS_REPORT,
};
use tracing::{debug, warn};

use crate::counters::{Counter, CounterTable};

/// Distance of the checksum field from the end of the message.
const CHECKSUM_TRAILER: usize = 2;

/// Distance of the report sequence counter from the end of the message.
const SEQUENCE_TRAILER: usize = 6;

/// Every this many checksum mismatches the offending message is dumped.
const CHECKSUM_DUMP_INTERVAL: u64 = 10;

const DUMP_CAPACITY: usize = 3 * FRAME_SIZE_LARGE;

bitflags! {
    /// Header fields that did not match a report contract.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderErrors: u8 {
        const LENGTH = 1;
        const TYPE = 2;
        const FUNCTION = 4;
    }
}

impl HeaderErrors {
    /// A report is still delivered when the only problem is its length.
    pub fn permits_delivery(self) -> bool {
        self.is_empty() || self == HeaderErrors::LENGTH
    }
}

/// Fixed header expectations for one kind of report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportContract {
    pub name: &'static str,
    pub length: u16,
    pub msg_type: u8,
    pub function: u8,
}

impl ReportContract {
    pub const MULTITOUCH: Self = Self {
        name: "mt",
        length: 166,
        msg_type: TYPE_SPONTANEOUS_REPORT,
        function: FUNCTION_MT_REPORT,
    };

    pub const PEN: Self = Self {
        name: "pen",
        length: 22,
        msg_type: TYPE_SPONTANEOUS_REPORT,
        function: FUNCTION_PEN_REPORT,
    };

    pub const HEARTBEAT: Self = Self {
        name: "hb",
        length: 256,
        msg_type: TYPE_RESPONSE,
        function: FUNCTION_NCP,
    };
}

/// Compare a message header against a contract.
///
/// Every mismatching field is reported and counted: a wrong length under
/// "packet size error", a wrong type or function under "other errors".
pub fn check_header(
    msg: &LowMessage,
    contract: &ReportContract,
    counters: &CounterTable,
) -> HeaderErrors {
    let mut errors = HeaderErrors::empty();
    if msg.length != contract.length {
        warn!(report = contract.name, length = msg.length, expected = contract.length, "invalid report length");
        counters.increment(Counter::ErrorPacketSize);
        errors |= HeaderErrors::LENGTH;
    }
    if msg.msg_type != contract.msg_type {
        warn!(report = contract.name, msg_type = msg.msg_type, expected = contract.msg_type, "invalid report type");
        counters.increment(Counter::ErrorOther);
        errors |= HeaderErrors::TYPE;
    }
    if msg.function != contract.function {
        warn!(report = contract.name, function = msg.function, expected = contract.function, "invalid report function");
        counters.increment(Counter::ErrorOther);
        errors |= HeaderErrors::FUNCTION;
    }
    errors
}

/// Compute the additive checksum of a report and read the stored one.
///
/// Returns `(computed, stored)`, or `None` when the message is too short to
/// carry a checksum.
pub fn compute_checksum(msg: &LowMessage) -> Option<(u16, u16)> {
    let length = msg.length as usize;
    let field = length.checked_sub(HEADER_SIZE + CHECKSUM_TRAILER)?;
    let stored = msg.payload_u16(field)?;
    let computed = msg
        .header_bytes()
        .iter()
        .chain(&msg.payload[..field])
        .fold(0u16, |sum, &b| sum.wrapping_add(u16::from(b)));
    Some((computed, stored))
}

/// Check a report's checksum, counting and occasionally dumping mismatches.
pub fn verify_checksum(msg: &LowMessage, counters: &CounterTable) -> bool {
    let Some((computed, stored)) = compute_checksum(msg) else {
        return false;
    };
    if computed == stored {
        return true;
    }

    let bad = counters.add(Counter::BadChecksum, 1);
    warn!(channel = msg.channel, stored, expected = computed, "incorrect report checksum");
    if bad % CHECKSUM_DUMP_INTERVAL == 0 {
        let (dump, truncated) = dump_message(msg);
        warn!(
            channel = msg.channel,
            bytes = %dump,
            truncated,
            "bad checksum packet dump"
        );
    }
    false
}

/// Hex dump of a message into a bounded scratch buffer.
fn dump_message(msg: &LowMessage) -> (heapless::String<DUMP_CAPACITY>, bool) {
    let mut out = heapless::String::new();
    let limit = DUMP_CAPACITY - 4;
    for b in msg.wire_bytes() {
        if out.len() > limit || write!(out, " {b:x}").is_err() {
            return (out, true);
        }
    }
    (out, false)
}

/// Running sequence expectation for one report channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceTracker {
    expected: u32,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence value expected.
    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Record an observed sequence value; returns the number of lost reports.
    pub fn observe(&mut self, observed: u32) -> u32 {
        if observed == self.expected {
            self.expected = self.expected.wrapping_add(1);
            return 0;
        }
        let lost = observed.wrapping_sub(self.expected);
        debug!(observed, expected = self.expected, lost, "sequence gap");
        self.expected = observed.wrapping_add(1);
        lost
    }
}

/// Read the running sequence counter from a report trailer.
pub fn report_sequence(msg: &LowMessage) -> Option<u32> {
    let offset = (msg.length as usize).checked_sub(HEADER_SIZE + SEQUENCE_TRAILER)?;
    msg.payload_u32(offset)
}

#[cfg(test)]
mod tests {
    use ntrig_frame::{MULTITOUCH, PEN};

    use super::*;

    /// Build a report of `length` bytes with a valid sequence and checksum trailer.
    fn report(contract: &ReportContract, channel: u8, seq: u32) -> LowMessage {
        let mut payload = vec![0u8; contract.length as usize - HEADER_SIZE];
        for (i, b) in payload.iter_mut().enumerate() {
            *b = (i * 7) as u8;
        }
        let n = payload.len();
        payload[n - 6..n - 2].copy_from_slice(&seq.to_le_bytes());
        let mut msg = LowMessage::new(contract.msg_type, 0, channel, contract.function, payload);
        let (sum, _) = compute_checksum(&msg).unwrap();
        let mut payload = msg.payload.to_vec();
        payload[n - 2..].copy_from_slice(&sum.to_le_bytes());
        msg.payload = payload.into();
        msg
    }

    #[test]
    fn matching_header_has_no_errors() {
        let counters = CounterTable::new();
        let msg = report(&ReportContract::PEN, PEN, 0);
        let errors = check_header(&msg, &ReportContract::PEN, &counters);
        assert!(errors.is_empty());
        assert!(errors.permits_delivery());
        assert!(counters.snapshot().iter().all(|e| e.count == 0));
    }

    #[test]
    fn every_mismatch_is_reported_and_counted() {
        let counters = CounterTable::new();
        let msg = LowMessage::new(TYPE_RESPONSE, 0, PEN, FUNCTION_NCP, vec![0u8; 4]);
        let errors = check_header(&msg, &ReportContract::PEN, &counters);
        assert_eq!(errors, HeaderErrors::all());
        assert!(!errors.permits_delivery());
        assert_eq!(counters.get(Counter::ErrorPacketSize), 1);
        assert_eq!(counters.get(Counter::ErrorOther), 2);
    }

    #[test]
    fn length_alone_still_delivers() {
        assert!(HeaderErrors::LENGTH.permits_delivery());
        assert!(!HeaderErrors::TYPE.permits_delivery());
        assert!(!(HeaderErrors::LENGTH | HeaderErrors::FUNCTION).permits_delivery());
    }

    #[test]
    fn valid_checksum_passes() {
        let counters = CounterTable::new();
        let msg = report(&ReportContract::MULTITOUCH, MULTITOUCH, 9);
        assert!(verify_checksum(&msg, &counters));
        assert_eq!(counters.get(Counter::BadChecksum), 0);
    }

    #[test]
    fn any_covered_byte_flip_is_detected() {
        let msg = report(&ReportContract::PEN, PEN, 3);
        let n = msg.payload.len();
        for i in 0..n - 2 {
            let mut payload = msg.payload.to_vec();
            payload[i] ^= 0x10;
            let mut flipped = msg.clone();
            flipped.payload = payload.into();
            let (computed, stored) = compute_checksum(&flipped).unwrap();
            assert_ne!(computed, stored, "flip at payload offset {i} went unnoticed");
        }
    }

    #[test]
    fn checksum_field_flip_changes_only_stored_value() {
        let msg = report(&ReportContract::PEN, PEN, 3);
        let (computed, _) = compute_checksum(&msg).unwrap();
        let mut payload = msg.payload.to_vec();
        let n = payload.len();
        payload[n - 1] ^= 0x01;
        let mut flipped = msg.clone();
        flipped.payload = payload.into();
        let (recomputed, stored) = compute_checksum(&flipped).unwrap();
        assert_eq!(recomputed, computed);
        assert_ne!(stored, computed);
    }

    #[test]
    fn mismatches_are_counted() {
        let counters = CounterTable::new();
        let mut msg = report(&ReportContract::PEN, PEN, 0);
        let mut payload = msg.payload.to_vec();
        payload[0] ^= 0xFF;
        msg.payload = payload.into();
        for _ in 0..10 {
            assert!(!verify_checksum(&msg, &counters));
        }
        assert_eq!(counters.get(Counter::BadChecksum), 10);
    }

    #[test]
    fn short_message_has_no_checksum() {
        let msg = LowMessage::new(TYPE_SPONTANEOUS_REPORT, 0, PEN, FUNCTION_PEN_REPORT, vec![1u8]);
        assert_eq!(compute_checksum(&msg), None);
        assert_eq!(report_sequence(&msg), None);
    }

    #[test]
    fn dump_is_bounded_and_marked_truncated() {
        let big = LowMessage::new(TYPE_RESPONSE, 0, PEN, FUNCTION_NCP, vec![0xABu8; 1024]);
        let (dump, truncated) = dump_message(&big);
        assert!(truncated);
        assert!(dump.len() <= DUMP_CAPACITY);

        let small = LowMessage::new(TYPE_RESPONSE, 0, PEN, FUNCTION_NCP, vec![0x0Fu8]);
        let (dump, truncated) = dump_message(&small);
        assert!(!truncated);
        assert_eq!(dump.as_str(), " 2 7 0 0 30 3 f");
    }

    #[test]
    fn sequence_in_order_and_gaps() {
        let mut seq = SequenceTracker::new();
        assert_eq!(seq.observe(0), 0);
        assert_eq!(seq.observe(1), 0);
        assert_eq!(seq.expected(), 2);

        assert_eq!(seq.observe(7), 5);
        assert_eq!(seq.expected(), 8);
    }

    #[test]
    fn sequence_wraps() {
        let mut seq = SequenceTracker { expected: u32::MAX };
        assert_eq!(seq.observe(u32::MAX), 0);
        assert_eq!(seq.expected(), 0);
        assert_eq!(seq.observe(2), 2);
        assert_eq!(seq.expected(), 3);
    }

    #[test]
    fn sequence_read_from_trailer() {
        let msg = report(&ReportContract::MULTITOUCH, MULTITOUCH, 0xDEAD_BEEF);
        assert_eq!(report_sequence(&msg), Some(0xDEAD_BEEF));
    }
}
