//! Message validation, reassembly, routing and command bridging for N-Trig
//! SPI sensors.
//!
//! A [`Session`] owns the bus and everything that must only change while the
//! bus is held. Messages decoded from each exchange flow through:
//!
//! ```text
//! exchange -> FrameDecoder -> router -> touch/pen event (EventSink)
//!                                    -> heartbeat handling
//!                                    -> reassembly -> ReplyFifo -> read()
//! ```
//!
//! Commands take the opposite path through [`Session::write`].

pub mod config;
pub mod counters;
pub mod error;
pub mod event;
pub mod fifo;
pub mod heartbeat;
pub mod lock;
pub mod ncp;
pub mod reassembly;
pub mod report;
pub mod router;
pub mod session;
pub mod validator;

pub use config::{SessionConfig, Settings};
pub use counters::{Counter, CounterEntry, CounterTable};
pub use error::{Result, SessionError};
pub use event::{EventRecorder, EventSink, Finger, FingerLayout, PenEvent, SensorEvent, TouchFrame};
pub use fifo::{ReplyFifo, ReplyFifoFull, ReplyReader};
pub use heartbeat::HeartbeatState;
pub use lock::{BusGuard, BusLock, CancelToken, Cancelled};
pub use reassembly::{FragmentError, FragmentOutcome, Reassembler};
pub use report::{parse_pen_report, parse_touch_report, ReportError};
pub use router::{route, LinkState, RouteContext, RouteOutcome};
pub use session::{DrainReport, Session};
pub use validator::{
    check_header, compute_checksum, report_sequence, verify_checksum, HeaderErrors, ReportContract,
    SequenceTracker,
};
