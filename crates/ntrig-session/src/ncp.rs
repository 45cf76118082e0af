//! NCP (maintenance protocol) payload fields used by the session.
//!
//! ```text
//! ┌───────┬──────┬──────────┬──────────────┬───────┬──────┬──────┐
//! │ 0x7E  │ Kind │ Len (2B) │ Reserved(2B) │ Group │ Code │ Body │
//! └───────┴──────┴──────────┴──────────────┴───────┴──────┴──────┘
//! ```

use ntrig_frame::REQUEST_NCP_DFU;

/// First byte of every NCP message.
pub const NCP_START: u8 = REQUEST_NCP_DFU;

/// Kind byte: host request.
pub const KIND_REQUEST: u8 = 0x01;
/// Kind byte: reply to a host request.
pub const KIND_SOLICITED: u8 = 0x81;
/// Kind byte: message pushed by the sensor.
pub const KIND_UNSOLICITED: u8 = 0x82;

const OFFSET_KIND: usize = 1;
const OFFSET_GROUP: usize = 6;
const OFFSET_CODE: usize = 7;

pub const GROUP_HEARTBEAT: u8 = 0x0A;
pub const CODE_HEARTBEAT: u8 = 0x01;

pub const GROUP_BOOTLOADER: u8 = 0x07;
pub const CODE_GO_TO_BOOTLOADER: u8 = 0x01;

/// Size of the heartbeat request.
pub const HEARTBEAT_REQUEST_SIZE: usize = 12;

/// Largest reply payload accepted from the sensor.
pub const MAX_REPLY_SIZE: usize = 256;

/// Whether an NCP payload carries the heartbeat signature.
pub fn is_heartbeat(data: &[u8]) -> bool {
    data.first() == Some(&NCP_START)
        && data.get(OFFSET_GROUP) == Some(&GROUP_HEARTBEAT)
        && data.get(OFFSET_CODE) == Some(&CODE_HEARTBEAT)
}

/// Whether an NCP payload was pushed by the sensor rather than solicited.
pub fn is_unsolicited(data: &[u8]) -> bool {
    data.get(OFFSET_KIND) == Some(&KIND_UNSOLICITED)
}

/// Build the heartbeat request, telling the sensor whether to send
/// heartbeats on its own.
pub fn heartbeat_request(enable_auto_heartbeat: bool) -> [u8; HEARTBEAT_REQUEST_SIZE] {
    [
        NCP_START,
        KIND_REQUEST,
        HEARTBEAT_REQUEST_SIZE as u8,
        0x00,
        0x00,
        0x00,
        GROUP_HEARTBEAT,
        CODE_HEARTBEAT,
        u8::from(enable_auto_heartbeat),
        0x00,
        0x00,
        0x00,
    ]
}

/// Whether a raw command asks the sensor to reboot into its bootloader.
pub fn is_bootloader_entry(command: &[u8]) -> bool {
    command.first() == Some(&NCP_START)
        && command.get(OFFSET_GROUP) == Some(&GROUP_BOOTLOADER)
        && command.get(OFFSET_CODE) == Some(&CODE_GO_TO_BOOTLOADER)
}
