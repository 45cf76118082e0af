//! Bus exchange and device-line abstraction for N-Trig SPI sensors.
//!
//! The physical side of the link is reduced to three narrow contracts:
//! - [`BusTransport`]: one fixed-size, full-duplex, synchronous exchange
//! - [`DeviceGate`]: the output-enable line and the data-pending line
//! - [`InterruptLine`]: blocking wait for the sensor's interrupt
//!
//! This is the lowest layer. Everything else builds on these traits.
//! [`ScriptedBus`] and [`ScriptedGate`] replay captured traffic in memory.

pub mod error;
pub mod scripted;
pub mod traits;

pub use error::{Result, TransportError};
pub use scripted::{ScriptedBus, ScriptedGate, IDLE_FILL};
pub use traits::{BusTransport, DeviceGate, InterruptLine};
