use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ntrig_frame::{
    encode_command_frame, FrameDecoder, LowMessageDecoder, RequestKind, FRAME_SIZE_STANDARD,
    MAX_TRANSFER_SIZE, PADDING,
};
use ntrig_transport::{BusTransport, DeviceGate, InterruptLine};
use tracing::{debug, error, info, warn};

use crate::config::{SessionConfig, Settings};
use crate::counters::{Counter, CounterEntry, CounterTable};
use crate::error::{Result, SessionError};
use crate::event::EventSink;
use crate::fifo::{ReplyFifo, ReplyReader};
use crate::heartbeat::HeartbeatState;
use crate::lock::{BusLock, CancelToken};
use crate::ncp;
use crate::router::{route, LinkState, RouteContext};

/// How long the interrupt loop waits before re-checking its stop token.
const IRQ_POLL: Duration = Duration::from_millis(50);

/// Everything only touched while the bus is held.
struct BusState<B> {
    transport: B,
    decoder: Box<dyn FrameDecoder>,
    link: LinkState,
    tx: [u8; MAX_TRANSFER_SIZE],
    rx: [u8; MAX_TRANSFER_SIZE],
}

/// Summary of one interrupt service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Bus exchanges performed.
    pub cycles: usize,
    /// The output-enable line was low; nothing was exchanged.
    pub output_disabled: bool,
    /// Servicing stopped at the drain-cycle cap with data still pending.
    pub capped: bool,
}

/// One attached sensor.
///
/// Two paths compete for the bus: [`service_interrupt`](Self::service_interrupt)
/// drains whatever the sensor has queued, and [`write`](Self::write) pushes
/// commands. Replies to commands surface through [`read`](Self::read) or a
/// detached [`ReplyReader`]; touch and pen reports go to the event sink.
pub struct Session<B, G, E> {
    bus: BusLock<BusState<B>>,
    gate: G,
    sink: E,
    counters: Arc<CounterTable>,
    heartbeat: HeartbeatState,
    replies: Arc<ReplyFifo>,
    settings: Settings,
    frame_size: AtomicUsize,
    config: SessionConfig,
}

impl<B, G, E> Session<B, G, E>
where
    B: BusTransport,
    G: DeviceGate,
    E: EventSink,
{
    pub fn new(transport: B, gate: G, sink: E, config: SessionConfig) -> Self {
        Self {
            bus: BusLock::new(BusState {
                transport,
                decoder: Box::new(LowMessageDecoder::new()),
                link: LinkState::new(),
                tx: [PADDING; MAX_TRANSFER_SIZE],
                rx: [PADDING; MAX_TRANSFER_SIZE],
            }),
            gate,
            sink,
            counters: Arc::new(CounterTable::new()),
            heartbeat: HeartbeatState::new(),
            replies: Arc::new(ReplyFifo::new(config.reply_queue_capacity)),
            settings: Settings::new(&config),
            frame_size: AtomicUsize::new(FRAME_SIZE_STANDARD),
            config,
        }
    }

    /// Replace the frame decoder.
    pub fn with_decoder(mut self, decoder: Box<dyn FrameDecoder>) -> Self {
        self.bus.get_mut().decoder = decoder;
        self
    }

    /// Count into a shared table instead of a private one.
    pub fn with_counters(mut self, counters: Arc<CounterTable>) -> Self {
        self.counters = counters;
        self
    }

    /// Perform one exchange of `frame_size` bytes and route what it carried.
    pub fn drain(&self, frame_size: usize) -> Result<()> {
        let mut bus = self.bus.acquire();
        self.drain_cycle(&mut bus, frame_size)
    }

    /// Handle one interrupt: drain until the sensor has nothing more to say.
    ///
    /// The bus is released between exchanges so writers can get in. A bus
    /// failure ends the service and is returned; any ACK owed to the sensor is
    /// sent first.
    pub fn service_interrupt(&self) -> Result<DrainReport> {
        self.counters.increment(Counter::Irq);
        if !self.gate.output_enabled() {
            debug!(backoff = ?self.config.output_disabled_backoff, "output disabled, skipping exchange");
            thread::sleep(self.config.output_disabled_backoff);
            return Ok(DrainReport {
                output_disabled: true,
                ..DrainReport::default()
            });
        }

        let mut report = DrainReport::default();
        let outcome = loop {
            let idle = {
                let mut bus = self.bus.acquire();
                if let Err(err) = self.drain_cycle(&mut bus, self.frame_size()) {
                    break Err(err);
                }
                bus.decoder.is_idle()
            };
            report.cycles += 1;

            let pending = self.gate.data_pending();
            if pending {
                self.counters.increment(Counter::Irq);
            }
            debug!(idle, pending, cycles = report.cycles, "drain cycle done");
            if idle && !pending {
                break Ok(());
            }
            if report.cycles >= self.config.max_drain_cycles {
                warn!(cycles = report.cycles, "drain cycle limit reached, ending service");
                report.capped = true;
                break Ok(());
            }
        };

        self.flush_pending_ack();
        outcome.map(|()| report)
    }

    /// Service interrupts as they are asserted until `stop` is cancelled.
    ///
    /// Returns the first bus failure.
    pub fn run_interrupt_loop<I>(&self, irq: &I, stop: &CancelToken) -> Result<()>
    where
        I: InterruptLine + ?Sized,
    {
        info!("interrupt loop started");
        while !stop.is_cancelled() {
            if !irq.wait_asserted(IRQ_POLL) {
                continue;
            }
            if let Err(err) = self.service_interrupt() {
                error!(error = %err, "interrupt service failed, stopping loop");
                return Err(err);
            }
        }
        info!("interrupt loop stopped");
        Ok(())
    }

    /// Send a raw command. Returns the number of command bytes written.
    ///
    /// Replies are not awaited; they arrive through [`read`](Self::read).
    pub fn write(&self, command: &[u8]) -> Result<usize> {
        self.write_with_cancel(command, &CancelToken::new())
    }

    /// Like [`write`](Self::write), giving up with
    /// [`SessionError::Interrupted`] if `cancel` fires while waiting for the
    /// bus. Nothing is sent and no state changes in that case.
    pub fn write_with_cancel(&self, command: &[u8], cancel: &CancelToken) -> Result<usize> {
        let written = self.write_command(command, cancel)?;
        self.flush_pending_ack();
        Ok(written)
    }

    fn write_command(&self, command: &[u8], cancel: &CancelToken) -> Result<usize> {
        let mut frame = [PADDING; MAX_TRANSFER_SIZE];
        let kind = encode_command_frame(command, &mut frame).inspect_err(|err| {
            warn!(error = %err, "rejecting command");
        })?;

        let mut bus = self
            .bus
            .acquire_cancellable(cancel)
            .map_err(|_| SessionError::Interrupted)?;

        debug!(?kind, size = command.len(), "sending command");
        match kind {
            RequestKind::NcpDfu => self.counters.increment(Counter::Maint),
            RequestKind::DebugAgent => self.counters.increment(Counter::Debug),
            RequestKind::BusControl => {}
        }

        bus.tx = frame;
        let result = self.drain_cycle(&mut bus, MAX_TRANSFER_SIZE);
        if result.is_ok() && kind == RequestKind::NcpDfu && ncp::is_bootloader_entry(command) {
            info!(hold = ?self.config.bootloader_hold, "bootloader entry, holding output low");
            self.gate.set_output_enabled(false);
            thread::sleep(self.config.bootloader_hold);
            self.gate.set_output_enabled(true);
        }
        bus.tx.fill(PADDING);

        result.map(|()| command.len())
    }

    /// Read the oldest reply into `buf`, waiting up to the configured timeout.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.replies.read_into(buf, self.config.reply_timeout)
    }

    /// A reader for the reply queue that may outlive the session.
    pub fn reply_reader(&self) -> ReplyReader {
        ReplyReader::new(Arc::clone(&self.replies), self.config.reply_timeout)
    }

    /// Send a heartbeat request carrying the current auto-heartbeat setting.
    ///
    /// With auto-heartbeat off the sensor answers, and that answer is
    /// swallowed.
    pub fn send_heartbeat_request(&self) -> Result<()> {
        let auto = self.settings.auto_heartbeat();
        self.heartbeat.expect_reply(!auto);
        if let Err(err) = self.write_command(&ncp::heartbeat_request(auto), &CancelToken::new()) {
            self.heartbeat.expect_reply(false);
            error!(error = %err, "failed to send heartbeat request");
            return Err(SessionError::HeartbeatFailed(err.to_string()));
        }
        Ok(())
    }

    /// Change the auto-heartbeat setting and tell the sensor.
    pub fn set_auto_heartbeat(&self, enabled: bool) -> Result<()> {
        self.settings.set_auto_heartbeat(enabled);
        self.send_heartbeat_request()?;
        self.flush_pending_ack();
        Ok(())
    }

    pub fn auto_heartbeat(&self) -> bool {
        self.settings.auto_heartbeat()
    }

    /// Turn report checksum verification on or off.
    pub fn set_verify_checksum(&self, enabled: bool) {
        self.settings.set_verify_checksum(enabled);
    }

    pub fn verify_checksum(&self) -> bool {
        self.settings.verify_checksum()
    }

    pub fn counters(&self) -> &Arc<CounterTable> {
        &self.counters
    }

    /// Every counter with its name.
    pub fn counter_snapshot(&self) -> Vec<CounterEntry> {
        self.counters.snapshot()
    }

    pub fn reset_counters(&self) {
        self.counters.reset();
    }

    /// Size of the next interrupt-driven exchange.
    pub fn frame_size(&self) -> usize {
        self.frame_size.load(Ordering::Acquire)
    }

    pub fn heartbeat(&self) -> &HeartbeatState {
        &self.heartbeat
    }

    /// Whether the decoder sits between messages.
    pub fn is_decoder_idle(&self) -> bool {
        self.bus.acquire().decoder.is_idle()
    }

    pub fn gate(&self) -> &G {
        &self.gate
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Send the ACK an unsolicited heartbeat asked for. Must be called with the
    /// bus released; on failure the ACK stays owed.
    fn flush_pending_ack(&self) {
        if self.heartbeat.take_pending_ack() && self.send_heartbeat_request().is_err() {
            self.heartbeat.restore_pending_ack();
        }
    }

    fn route_context(&self) -> RouteContext<'_> {
        RouteContext {
            counters: self.counters.as_ref(),
            heartbeat: &self.heartbeat,
            replies: self.replies.as_ref(),
            sink: &self.sink,
            settings: &self.settings,
            frame_size: &self.frame_size,
            sensor_id: self.config.sensor_id,
        }
    }

    fn drain_cycle(&self, state: &mut BusState<B>, frame_size: usize) -> Result<()> {
        let len = frame_size.min(MAX_TRANSFER_SIZE);
        let BusState {
            transport,
            decoder,
            link,
            tx,
            rx,
        } = state;

        transport
            .exchange(&tx[..len], &mut rx[..len])
            .inspect_err(|err| error!(error = %err, len, "bus exchange failed"))?;

        decoder.load_frame(&rx[..len]);
        let ctx = self.route_context();
        loop {
            let more = decoder.process();
            if let Some(msg) = decoder.take_message() {
                route(&msg, link, &ctx);
            }
            if !more {
                break;
            }
        }
        Ok(())
    }
}
