//! Named traffic and error counters.
//!
//! One [`CounterTable`] is shared by every path of a session (and may be
//! shared across sessions). Increments are atomic; the table is only ever
//! reset as a whole.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// A countable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Multi-touch reports received.
    Multitouch,
    /// Pen reports received.
    Pen,
    /// Maintenance replies received.
    MaintReply,
    /// Debug replies received.
    DebugReply,
    /// Maintenance commands sent.
    Maint,
    /// Debug commands sent.
    Debug,
    /// Replies dropped because the reply queue was full.
    ErrorFullReceiveQueue,
    /// Logical messages discarded for a broken fragment sequence.
    ErrorFragmentation,
    /// Messages with a wrong or oversized length.
    ErrorPacketSize,
    /// NCP replies not starting with the NCP start byte.
    ErrorNcpBadFirstByte,
    /// Multi-touch reports lost, from sequence gaps.
    MultitouchPacketsLost,
    /// Pen reports lost, from sequence gaps.
    PenPacketsLost,
    /// Interrupt assertions seen.
    Irq,
    /// Heartbeat reports received.
    Heartbeat,
    /// Reports with wrong type, function or unusable contents.
    ErrorOther,
    /// Multi-touch reports that passed every check.
    ValidMultitouch,
    /// Pen reports that passed every check.
    ValidPen,
    /// Heartbeat reports with a correct header.
    ValidHeartbeat,
    /// Reports whose checksum did not match.
    BadChecksum,
}

impl Counter {
    /// Every counter, in export order.
    pub const ALL: [Counter; 19] = [
        Counter::Multitouch,
        Counter::Pen,
        Counter::MaintReply,
        Counter::DebugReply,
        Counter::Maint,
        Counter::Debug,
        Counter::ErrorFullReceiveQueue,
        Counter::ErrorFragmentation,
        Counter::ErrorPacketSize,
        Counter::ErrorNcpBadFirstByte,
        Counter::MultitouchPacketsLost,
        Counter::PenPacketsLost,
        Counter::Irq,
        Counter::Heartbeat,
        Counter::ErrorOther,
        Counter::ValidMultitouch,
        Counter::ValidPen,
        Counter::ValidHeartbeat,
        Counter::BadChecksum,
    ];

    /// Number of counters in a table.
    pub const COUNT: usize = Self::ALL.len();

    /// Exported counter name.
    pub fn name(self) -> &'static str {
        match self {
            Counter::Multitouch => "channel multitouch",
            Counter::Pen => "channel pen",
            Counter::MaintReply => "channel maint reply",
            Counter::DebugReply => "channel debug reply",
            Counter::Maint => "channel maint",
            Counter::Debug => "channel debug",
            Counter::ErrorFullReceiveQueue => "full queue error",
            Counter::ErrorFragmentation => "fragmentation error",
            Counter::ErrorPacketSize => "packet size error",
            Counter::ErrorNcpBadFirstByte => "ncp bad first byte error",
            Counter::MultitouchPacketsLost => "number of multi touch lost packets",
            Counter::PenPacketsLost => "number of pen lost packets",
            Counter::Irq => "number of IRQ assertions",
            Counter::Heartbeat => "number of heartbeat reports",
            Counter::ErrorOther => "reports with other errors",
            Counter::ValidMultitouch => "valid multitouch reports",
            Counter::ValidPen => "valid pen reports",
            Counter::ValidHeartbeat => "valid heartbeat reports",
            Counter::BadChecksum => "bad hid checksum reports",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// One exported counter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterEntry {
    pub name: &'static str,
    pub count: u64,
}

/// Fixed table of named, monotonically increasing counters.
#[derive(Debug)]
pub struct CounterTable {
    counts: [AtomicU64; Counter::COUNT],
}

impl Default for CounterTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterTable {
    /// Create a table with every counter at zero.
    pub fn new() -> Self {
        Self {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Count one occurrence.
    pub fn increment(&self, counter: Counter) {
        self.add(counter, 1);
    }

    /// Count `n` occurrences. Returns the new value.
    pub fn add(&self, counter: Counter, n: u64) -> u64 {
        self.counts[counter.index()]
            .fetch_add(n, Ordering::Relaxed)
            .wrapping_add(n)
    }

    /// Current value of one counter.
    pub fn get(&self, counter: Counter) -> u64 {
        self.counts[counter.index()].load(Ordering::Relaxed)
    }

    /// Every counter with its name, in export order.
    pub fn snapshot(&self) -> Vec<CounterEntry> {
        Counter::ALL
            .iter()
            .map(|&counter| CounterEntry {
                name: counter.name(),
                count: self.get(counter),
            })
            .collect()
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for count in &self.counts {
            count.store(0, Ordering::Relaxed);
        }
    }
}
