use std::time::Duration;

use crate::error::Result;

/// One fixed-size, full-duplex, synchronous exchange on the bus.
///
/// `tx` and `rx` always have the same length: the bus clocks out every byte of
/// `tx` while clocking in the same number of bytes into `rx`. The sensor has no
/// way to send data on its own; it only answers exchanges the host drives.
pub trait BusTransport: Send {
    /// Perform one exchange (blocking).
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()>;
}

impl<T: BusTransport + ?Sized> BusTransport for Box<T> {
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        (**self).exchange(tx, rx)
    }
}

/// The sensor's control lines, as seen by the host.
///
/// Implementations take `&self`: the lines are read from the interrupt path and
/// driven from the command path concurrently.
pub trait DeviceGate: Send + Sync {
    /// Whether the sensor is currently allowed to drive the bus.
    ///
    /// When the output-enable line is low the sensor cannot answer, so any
    /// exchange would only clock in noise.
    fn output_enabled(&self) -> bool;

    /// Raise or lower the output-enable line.
    fn set_output_enabled(&self, enabled: bool);

    /// Whether the sensor still signals queued data (interrupt line level).
    fn data_pending(&self) -> bool;
}

impl<T: DeviceGate + ?Sized> DeviceGate for std::sync::Arc<T> {
    fn output_enabled(&self) -> bool {
        (**self).output_enabled()
    }

    fn set_output_enabled(&self, enabled: bool) {
        (**self).set_output_enabled(enabled)
    }

    fn data_pending(&self) -> bool {
        (**self).data_pending()
    }
}

/// Edge/level interrupt source raised by the sensor when it has data.
pub trait InterruptLine: Send + Sync {
    /// Block until the line is asserted or `timeout` elapses.
    ///
    /// Returns `true` if the line was asserted.
    fn wait_asserted(&self, timeout: Duration) -> bool;
}
