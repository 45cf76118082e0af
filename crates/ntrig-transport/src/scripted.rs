use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::{BusTransport, DeviceGate, InterruptLine};

/// Byte value the bus reads back when nobody drives it.
pub const IDLE_FILL: u8 = 0xFF;

#[derive(Debug, Default)]
struct Script {
    frames: VecDeque<Bytes>,
    sent: Vec<Bytes>,
    fail_next: Option<std::io::ErrorKind>,
    shut_down: bool,
}

/// In-memory bus that answers exchanges from a queue of prepared frames.
///
/// Every exchange pops the next queued frame into `rx` (padded with
/// [`IDLE_FILL`]); once the queue is empty the bus reads back idle fill.
/// Transmitted buffers are recorded for inspection. Clones share state, so a
/// test can keep a handle while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBus {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBus {
    /// Create an empty scripted bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scripted bus preloaded with frames.
    pub fn with_frames<I, B>(frames: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let bus = Self::new();
        for frame in frames {
            bus.push_frame(frame);
        }
        bus
    }

    /// Queue one frame to be returned by a later exchange.
    pub fn push_frame(&self, frame: impl Into<Bytes>) {
        self.lock().frames.push_back(frame.into());
    }

    /// Number of frames not yet clocked in.
    pub fn pending_frames(&self) -> usize {
        self.lock().frames.len()
    }

    /// Every buffer transmitted so far, in order.
    pub fn sent(&self) -> Vec<Bytes> {
        self.lock().sent.clone()
    }

    /// Make the next exchange fail with the given I/O error kind.
    pub fn fail_next_exchange(&self, kind: std::io::ErrorKind) {
        self.lock().fail_next = Some(kind);
    }

    /// Make every later exchange fail with [`TransportError::Shutdown`].
    pub fn shutdown(&self) {
        self.lock().shut_down = true;
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BusTransport for ScriptedBus {
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        let mut script = self.lock();
        if script.shut_down {
            return Err(TransportError::Shutdown);
        }
        if let Some(kind) = script.fail_next.take() {
            debug!(?kind, "injected exchange failure");
            return Err(TransportError::Io(std::io::Error::from(kind)));
        }

        script.sent.push(Bytes::copy_from_slice(tx));
        rx.fill(IDLE_FILL);
        if let Some(frame) = script.frames.pop_front() {
            let len = frame.len().min(rx.len());
            rx[..len].copy_from_slice(&frame[..len]);
            trace!(len, remaining = script.frames.len(), "scripted frame clocked in");
        }
        Ok(())
    }
}

/// Device lines paired with a [`ScriptedBus`].
///
/// The data-pending line reads high while the bus still has queued frames.
/// Every write to the output-enable line is recorded.
#[derive(Debug)]
pub struct ScriptedGate {
    bus: ScriptedBus,
    output_enabled: AtomicBool,
    output_history: Mutex<Vec<bool>>,
}

impl ScriptedGate {
    /// Create a gate with the output-enable line raised.
    pub fn new(bus: &ScriptedBus) -> Self {
        Self {
            bus: bus.clone(),
            output_enabled: AtomicBool::new(true),
            output_history: Mutex::new(Vec::new()),
        }
    }

    /// Every value written to the output-enable line, in order.
    pub fn output_history(&self) -> Vec<bool> {
        self.output_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DeviceGate for ScriptedGate {
    fn output_enabled(&self) -> bool {
        self.output_enabled.load(Ordering::SeqCst)
    }

    fn set_output_enabled(&self, enabled: bool) {
        self.output_enabled.store(enabled, Ordering::SeqCst);
        self.output_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(enabled);
    }

    fn data_pending(&self) -> bool {
        self.bus.pending_frames() > 0
    }
}

impl InterruptLine for ScriptedGate {
    fn wait_asserted(&self, timeout: Duration) -> bool {
        if self.data_pending() {
            return true;
        }
        std::thread::sleep(timeout);
        self.data_pending()
    }
}
