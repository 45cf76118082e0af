//! Dispatch of complete low messages by channel.

use std::sync::atomic::{AtomicUsize, Ordering};

use ntrig_frame::{
    channel_name, LowMessage, DEBUG_REPLY, FRAME_SIZE_LARGE, FUNCTION_NCP, MAINT_REPLY,
    MULTITOUCH, MULTITOUCH_TRACKED, PEN,
};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::counters::{Counter, CounterTable};
use crate::event::{EventSink, SensorEvent};
use crate::fifo::ReplyFifo;
use crate::heartbeat::HeartbeatState;
use crate::ncp::{self, MAX_REPLY_SIZE, NCP_START};
use crate::reassembly::{FragmentError, FragmentOutcome, Reassembler};
use crate::report::{parse_pen_report, parse_touch_report};
use crate::validator::{
    check_header, report_sequence, verify_checksum, HeaderErrors, ReportContract, SequenceTracker,
};

/// Per-link state touched only while the bus is held.
#[derive(Debug, Default)]
pub struct LinkState {
    pub reassembler: Reassembler,
    pub touch_seq: SequenceTracker,
    pub pen_seq: SequenceTracker,
}

impl LinkState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Session-wide collaborators a routed message may reach.
pub struct RouteContext<'a> {
    pub counters: &'a CounterTable,
    pub heartbeat: &'a HeartbeatState,
    pub replies: &'a ReplyFifo,
    pub sink: &'a dyn EventSink,
    pub settings: &'a Settings,
    pub frame_size: &'a AtomicUsize,
    pub sensor_id: u32,
}

/// What became of a routed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A touch or pen event was delivered.
    Emitted,
    /// A report failed header or layout checks.
    Rejected,
    /// A reply was placed in the reply queue.
    Queued,
    /// A heartbeat was consumed.
    Heartbeat,
    /// A fragment was stored; the logical message is not complete yet.
    FragmentPending,
    /// The message was counted and thrown away.
    Dropped,
    /// The channel carries nothing for the host.
    Ignored,
}

/// Route one complete low message.
pub fn route(msg: &LowMessage, link: &mut LinkState, ctx: &RouteContext<'_>) -> RouteOutcome {
    debug!(
        channel = channel_name(msg.channel),
        msg_type = msg.msg_type,
        function = msg.function,
        length = msg.length,
        "routing message"
    );

    if msg.is_large_frame() {
        let previous = ctx.frame_size.fetch_max(FRAME_SIZE_LARGE, Ordering::AcqRel);
        if previous < FRAME_SIZE_LARGE {
            info!(frame_size = FRAME_SIZE_LARGE, "large-frame sensor detected, widening exchanges");
        }
    }

    match msg.channel {
        MULTITOUCH | MULTITOUCH_TRACKED => route_touch(msg, link, ctx),
        PEN => route_pen(msg, link, ctx),
        MAINT_REPLY | DEBUG_REPLY => route_reply(msg, link, ctx),
        other => {
            debug!(channel = other, "ignoring message on unhandled channel");
            RouteOutcome::Ignored
        }
    }
}

/// Header check plus the advisory checksum. A bad checksum only withholds
/// the valid-report count.
fn accept_report(
    msg: &LowMessage,
    contract: &ReportContract,
    valid_counter: Counter,
    ctx: &RouteContext<'_>,
) -> bool {
    let errors: HeaderErrors = check_header(msg, contract, ctx.counters);
    if !errors.permits_delivery() {
        return false;
    }
    if ctx.settings.verify_checksum() && verify_checksum(msg, ctx.counters) && errors.is_empty() {
        ctx.counters.increment(valid_counter);
    }
    true
}

fn track_sequence(
    msg: &LowMessage,
    tracker: &mut SequenceTracker,
    lost_counter: Counter,
    ctx: &RouteContext<'_>,
) -> bool {
    let Some(seq) = report_sequence(msg) else {
        warn!(channel = msg.channel, length = msg.length, "report too short for sequence trailer");
        ctx.counters.increment(Counter::ErrorOther);
        return false;
    };
    let lost = tracker.observe(seq);
    if lost > 0 {
        warn!(channel = channel_name(msg.channel), lost, current = seq, "lost reports");
        ctx.counters.add(lost_counter, u64::from(lost));
    }
    true
}

fn route_touch(msg: &LowMessage, link: &mut LinkState, ctx: &RouteContext<'_>) -> RouteOutcome {
    ctx.counters.increment(Counter::Multitouch);
    if !accept_report(msg, &ReportContract::MULTITOUCH, Counter::ValidMultitouch, ctx) {
        return RouteOutcome::Rejected;
    }
    if !track_sequence(msg, &mut link.touch_seq, Counter::MultitouchPacketsLost, ctx) {
        return RouteOutcome::Dropped;
    }

    match parse_touch_report(msg, ctx.sensor_id) {
        Ok(frame) => {
            debug!(fingers = frame.fingers.len(), frame_index = frame.frame_index, "touch frame");
            ctx.sink.deliver(SensorEvent::Touch(frame));
            RouteOutcome::Emitted
        }
        Err(err) => {
            warn!(error = %err, "invalid multi-touch report");
            ctx.counters.increment(Counter::ErrorOther);
            RouteOutcome::Rejected
        }
    }
}

fn route_pen(msg: &LowMessage, link: &mut LinkState, ctx: &RouteContext<'_>) -> RouteOutcome {
    ctx.counters.increment(Counter::Pen);
    if !accept_report(msg, &ReportContract::PEN, Counter::ValidPen, ctx) {
        return RouteOutcome::Rejected;
    }
    if !track_sequence(msg, &mut link.pen_seq, Counter::PenPacketsLost, ctx) {
        return RouteOutcome::Dropped;
    }

    match parse_pen_report(msg, ctx.sensor_id) {
        Ok(pen) => {
            ctx.sink.deliver(SensorEvent::Pen(pen));
            RouteOutcome::Emitted
        }
        Err(err) => {
            warn!(error = %err, "invalid pen report");
            ctx.counters.increment(Counter::ErrorOther);
            RouteOutcome::Rejected
        }
    }
}

fn route_reply(msg: &LowMessage, link: &mut LinkState, ctx: &RouteContext<'_>) -> RouteOutcome {
    ctx.counters.increment(if msg.channel == MAINT_REPLY {
        Counter::MaintReply
    } else {
        Counter::DebugReply
    });

    let size = msg.payload.len();
    if size > MAX_REPLY_SIZE {
        warn!(size, max = MAX_REPLY_SIZE, "reply too large, discarding");
        ctx.counters.increment(Counter::ErrorPacketSize);
        return RouteOutcome::Dropped;
    }

    let data = match link.reassembler.accept(&msg.payload, msg.fragments_remaining()) {
        FragmentOutcome::Complete(data) => data,
        FragmentOutcome::Pending => return RouteOutcome::FragmentPending,
        FragmentOutcome::Discarded(FragmentError::Sequence { .. }) => {
            ctx.counters.increment(Counter::ErrorFragmentation);
            return RouteOutcome::Dropped;
        }
        FragmentOutcome::Discarded(FragmentError::Overflow { .. }) => {
            ctx.counters.increment(Counter::ErrorPacketSize);
            return RouteOutcome::Dropped;
        }
    };

    if ncp::is_heartbeat(&data) && ctx.heartbeat.on_heartbeat(msg, &data, ctx.counters) {
        return RouteOutcome::Heartbeat;
    }

    if msg.function == FUNCTION_NCP && data.first() != Some(&NCP_START) {
        debug!(first = ?data.first(), "NCP reply with unexpected first byte");
        ctx.counters.increment(Counter::ErrorNcpBadFirstByte);
    }

    match ctx.replies.push(data) {
        Ok(()) => RouteOutcome::Queued,
        Err(_) => {
            ctx.counters.increment(Counter::ErrorFullReceiveQueue);
            RouteOutcome::Dropped
        }
    }
}

#[cfg(test)]
mod tests {
    use ntrig_frame::{
        FLAG_LARGE_FRAME, FRAME_SIZE_STANDARD, FUNCTION_DEBUG_AGENT, FUNCTION_MT_REPORT,
        FUNCTION_PEN_REPORT, MAINT, TYPE_RESPONSE, TYPE_SPONTANEOUS_REPORT,
    };

    use super::*;
    use crate::config::SessionConfig;
    use crate::event::EventRecorder;
    use crate::validator::compute_checksum;

    struct Harness {
        counters: CounterTable,
        heartbeat: HeartbeatState,
        replies: ReplyFifo,
        sink: EventRecorder,
        settings: Settings,
        frame_size: AtomicUsize,
        link: LinkState,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                counters: CounterTable::new(),
                heartbeat: HeartbeatState::new(),
                replies: ReplyFifo::new(2),
                sink: EventRecorder::new(),
                settings: Settings::new(&SessionConfig::default()),
                frame_size: AtomicUsize::new(FRAME_SIZE_STANDARD),
                link: LinkState::new(),
            }
        }

        fn route(&mut self, msg: &LowMessage) -> RouteOutcome {
            let ctx = RouteContext {
                counters: &self.counters,
                heartbeat: &self.heartbeat,
                replies: &self.replies,
                sink: &self.sink,
                settings: &self.settings,
                frame_size: &self.frame_size,
                sensor_id: 3,
            };
            route(msg, &mut self.link, &ctx)
        }
    }

    fn pen_report(seq: u32, flags: u8) -> LowMessage {
        let mut payload = vec![0u8; 16];
        payload[..8].copy_from_slice(&[10, 0, 20, 0, 30, 0, 1, 99]);
        payload[10..14].copy_from_slice(&seq.to_le_bytes());
        let mut msg = LowMessage::new(TYPE_SPONTANEOUS_REPORT, flags, PEN, FUNCTION_PEN_REPORT, payload);
        let (sum, _) = compute_checksum(&msg).unwrap();
        let mut payload = msg.payload.to_vec();
        payload[14..].copy_from_slice(&sum.to_le_bytes());
        msg.payload = payload.into();
        msg
    }

    fn touch_report(channel: u8, seq: u32) -> LowMessage {
        let mut payload = vec![0u8; 160];
        payload[2] = 1;
        payload[3..9].copy_from_slice(&[0x05, 7, 0x20, 0x01, 0x40, 0x02]);
        payload[154..158].copy_from_slice(&seq.to_le_bytes());
        let mut msg = LowMessage::new(TYPE_SPONTANEOUS_REPORT, 0, channel, FUNCTION_MT_REPORT, payload);
        let (sum, _) = compute_checksum(&msg).unwrap();
        let mut payload = msg.payload.to_vec();
        payload[158..].copy_from_slice(&sum.to_le_bytes());
        msg.payload = payload.into();
        msg
    }

    fn reply(flags: u8, payload: &[u8]) -> LowMessage {
        LowMessage::new(TYPE_RESPONSE, flags, MAINT_REPLY, FUNCTION_NCP, payload.to_vec())
    }

    #[test]
    fn valid_pen_report_is_emitted_and_counted() {
        let mut h = Harness::new();
        assert_eq!(h.route(&pen_report(0, 0)), RouteOutcome::Emitted);
        assert_eq!(h.counters.get(Counter::Pen), 1);
        assert_eq!(h.counters.get(Counter::ValidPen), 1);
        assert_eq!(h.counters.get(Counter::PenPacketsLost), 0);

        let events = h.sink.take();
        assert!(matches!(&events[..], [SensorEvent::Pen(p)] if p.sensor_id == 3 && p.battery == 99));
    }

    #[test]
    fn pen_sequence_gap_is_counted() {
        let mut h = Harness::new();
        h.route(&pen_report(0, 0));
        h.route(&pen_report(4, 0));
        assert_eq!(h.counters.get(Counter::PenPacketsLost), 3);
        assert_eq!(h.link.pen_seq.expected(), 5);
        assert_eq!(h.sink.events().len(), 2);
    }

    #[test]
    fn bad_checksum_is_advisory() {
        let mut h = Harness::new();
        let mut msg = pen_report(0, 0);
        let mut payload = msg.payload.to_vec();
        payload[15] ^= 0xFF;
        msg.payload = payload.into();

        assert_eq!(h.route(&msg), RouteOutcome::Emitted);
        assert_eq!(h.counters.get(Counter::ValidPen), 0);
        assert_eq!(h.counters.get(Counter::BadChecksum), 1);
    }

    #[test]
    fn disabled_checksum_never_counts_valid() {
        let mut h = Harness::new();
        h.settings.set_verify_checksum(false);
        assert_eq!(h.route(&pen_report(0, 0)), RouteOutcome::Emitted);
        assert_eq!(h.counters.get(Counter::ValidPen), 0);
        assert_eq!(h.counters.get(Counter::BadChecksum), 0);
    }

    #[test]
    fn wrong_function_rejects_report() {
        let mut h = Harness::new();
        let mut msg = pen_report(0, 0);
        msg.function = FUNCTION_DEBUG_AGENT;
        assert_eq!(h.route(&msg), RouteOutcome::Rejected);
        assert_eq!(h.counters.get(Counter::ErrorOther), 1);
        assert!(h.sink.events().is_empty());
        assert_eq!(h.link.pen_seq.expected(), 0);
    }

    #[test]
    fn large_frame_flag_upgrades_once() {
        let mut h = Harness::new();
        h.route(&pen_report(0, FLAG_LARGE_FRAME));
        assert_eq!(h.frame_size.load(Ordering::Acquire), FRAME_SIZE_LARGE);
        h.route(&pen_report(1, 0));
        assert_eq!(h.frame_size.load(Ordering::Acquire), FRAME_SIZE_LARGE);
    }

    #[test]
    fn reply_is_queued_and_bad_first_byte_counted() {
        let mut h = Harness::new();
        assert_eq!(h.route(&reply(0, &[0x7E, 0x81, 1])), RouteOutcome::Queued);
        assert_eq!(h.route(&reply(0, &[0x10, 0x81, 1])), RouteOutcome::Queued);
        assert_eq!(h.counters.get(Counter::MaintReply), 2);
        assert_eq!(h.counters.get(Counter::ErrorNcpBadFirstByte), 1);
        assert_eq!(h.replies.len(), 2);

        assert_eq!(h.route(&reply(0, &[0x7E])), RouteOutcome::Dropped);
        assert_eq!(h.counters.get(Counter::ErrorFullReceiveQueue), 1);
    }

    #[test]
    fn tracked_touch_report_shares_the_touch_path() {
        let mut h = Harness::new();
        assert_eq!(h.route(&touch_report(MULTITOUCH_TRACKED, 0)), RouteOutcome::Emitted);
        assert_eq!(h.route(&touch_report(MULTITOUCH, 2)), RouteOutcome::Emitted);
        assert_eq!(h.counters.get(Counter::Multitouch), 2);
        assert_eq!(h.counters.get(Counter::ValidMultitouch), 2);
        assert_eq!(h.counters.get(Counter::MultitouchPacketsLost), 1);

        let events = h.sink.take();
        let [SensorEvent::Touch(first), SensorEvent::Touch(_)] = &events[..] else {
            panic!("expected two touch events, got {events:?}");
        };
        assert_eq!(first.sensor_id, 3);
        assert_eq!(first.fingers.len(), 1);
        assert_eq!(first.fingers[0].track_id, 7);
        assert_eq!(first.fingers[0].x, 0x0120);
        assert_eq!(first.fingers[0].y, 0x0240);
    }

    #[test]
    fn debug_reply_is_queued_under_its_own_counter() {
        let mut h = Harness::new();
        let msg = LowMessage::new(TYPE_RESPONSE, 0, DEBUG_REPLY, FUNCTION_DEBUG_AGENT, vec![0x60, 1, 2]);
        assert_eq!(h.route(&msg), RouteOutcome::Queued);
        assert_eq!(h.counters.get(Counter::DebugReply), 1);
        assert_eq!(h.counters.get(Counter::MaintReply), 0);
        assert_eq!(h.counters.get(Counter::ErrorNcpBadFirstByte), 0);
        assert_eq!(
            h.replies.pop_timeout(std::time::Duration::ZERO).unwrap().as_ref(),
            &[0x60, 1, 2]
        );
    }

    #[test]
    fn oversize_reply_dropped() {
        let mut h = Harness::new();
        assert_eq!(h.route(&reply(0, &[0x7E; MAX_REPLY_SIZE + 1])), RouteOutcome::Dropped);
        assert_eq!(h.counters.get(Counter::ErrorPacketSize), 1);
        assert!(h.replies.is_empty());
    }

    #[test]
    fn fragmented_reply_waits_then_queues() {
        let mut h = Harness::new();
        assert_eq!(h.route(&reply(2, &[0x7E, 1])), RouteOutcome::FragmentPending);
        assert_eq!(h.route(&reply(1, &[2, 3])), RouteOutcome::FragmentPending);
        assert_eq!(h.route(&reply(FLAG_LARGE_FRAME, &[4])), RouteOutcome::Queued);
        assert_eq!(
            h.replies.pop_timeout(std::time::Duration::ZERO).unwrap().as_ref(),
            &[0x7E, 1, 2, 3, 4]
        );
    }

    #[test]
    fn broken_fragment_sequence_counted_once() {
        let mut h = Harness::new();
        h.route(&reply(3, &[0x7E]));
        assert_eq!(h.route(&reply(1, &[2])), RouteOutcome::Dropped);
        assert_eq!(h.counters.get(Counter::ErrorFragmentation), 1);
        assert!(!h.link.reassembler.in_progress());
        assert!(h.replies.is_empty());
    }

    #[test]
    fn unsolicited_heartbeat_is_consumed() {
        let mut h = Harness::new();
        let hb = [0x7E, ncp::KIND_UNSOLICITED, 0, 0, 0, 0, 0x0A, 0x01];
        assert_eq!(h.route(&reply(0, &hb)), RouteOutcome::Heartbeat);
        assert!(h.heartbeat.ack_pending());
        assert!(h.replies.is_empty());
        assert_eq!(h.counters.get(Counter::Heartbeat), 1);
    }

    #[test]
    fn command_channel_echo_ignored() {
        let mut h = Harness::new();
        let echo = LowMessage::new(TYPE_RESPONSE, 0, MAINT, FUNCTION_NCP, vec![0x7E]);
        assert_eq!(h.route(&echo), RouteOutcome::Ignored);
    }
}
