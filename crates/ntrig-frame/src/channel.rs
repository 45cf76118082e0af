//! Channel identifiers.
//!
//! Channels below 0x10 carry host-to-sensor traffic. Everything above is
//! produced by the sensor.

/// Bus control commands (host to sensor).
pub const CONTROL: u8 = 0x00;

/// Maintenance commands: NCP and firmware update (host to sensor).
pub const MAINT: u8 = 0x01;

/// Debug agent commands (host to sensor).
pub const DEBUG: u8 = 0x02;

/// Replies to maintenance commands, including heartbeats.
pub const MAINT_REPLY: u8 = 0x11;

/// Replies to debug agent commands.
pub const DEBUG_REPLY: u8 = 0x12;

/// Spontaneous multi-touch reports.
pub const MULTITOUCH: u8 = 0x20;

/// Spontaneous multi-touch reports with sensor-side tracking.
pub const MULTITOUCH_TRACKED: u8 = 0x21;

/// Spontaneous pen reports.
pub const PEN: u8 = 0x30;

/// Returns a human-readable name for a channel ID.
pub fn channel_name(id: u8) -> &'static str {
    match id {
        CONTROL => "CONTROL",
        MAINT => "MAINT",
        DEBUG => "DEBUG",
        MAINT_REPLY => "MAINT_REPLY",
        DEBUG_REPLY => "DEBUG_REPLY",
        MULTITOUCH => "MULTITOUCH",
        MULTITOUCH_TRACKED => "MULTITOUCH_TRACKED",
        PEN => "PEN",
        _ => "UNKNOWN",
    }
}

/// Returns true if the channel carries touch or pen reports.
pub fn is_report_channel(id: u8) -> bool {
    matches!(id, MULTITOUCH | MULTITOUCH_TRACKED | PEN)
}

/// Returns true if the channel carries command replies.
pub fn is_reply_channel(id: u8) -> bool {
    matches!(id, MAINT_REPLY | DEBUG_REPLY)
}
