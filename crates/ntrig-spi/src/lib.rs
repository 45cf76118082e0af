//! Host-side link layer for N-Trig SPI touch and pen sensors.
//!
//! # Crate Structure
//!
//! - [`transport`]: bus exchange, device lines and the scripted replay bus
//! - [`frame`]: bus frame preamble, low-message header and command framing
//! - [`session`]: validation, reassembly, routing, heartbeat and the
//!   command/response bridge

/// Re-export transport types.
pub mod transport {
    pub use ntrig_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ntrig_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use ntrig_session::*;
}
