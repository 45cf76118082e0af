//! Bus frame layout and low-message framing for N-Trig SPI sensors.
//!
//! Every bus exchange carries one fixed-size frame:
//! - An 8-byte preamble (`FF FF FF FF A5 5A E7 7E`) for synchronization
//! - A data region (128 or 256 bytes) holding packed low messages
//!
//! Each low message has a 6-byte header (type, length, flags, channel,
//! function) followed by its payload. Messages may straddle data regions;
//! [`LowMessageDecoder`] reassembles them across exchanges.

pub mod channel;
pub mod codec;
pub mod command;
pub mod decoder;
pub mod error;

pub use channel::{
    channel_name, is_reply_channel, is_report_channel, CONTROL, DEBUG, DEBUG_REPLY, MAINT, MAINT_REPLY, MULTITOUCH,
    MULTITOUCH_TRACKED, PEN,
};
pub use codec::{
    decode_low_message, encode_low_message, pack_bus_frames, LowMessage, FLAG_FRAGMENTS_MASK,
    FLAG_LARGE_FRAME, FRAME_SIZE_LARGE, FRAME_SIZE_STANDARD, FUNCTION_BUS_CONTROL,
    FUNCTION_DEBUG_AGENT, FUNCTION_MT_REPORT, FUNCTION_NCP, FUNCTION_PEN_REPORT, HEADER_SIZE,
    MAX_LOGICAL_MESSAGE_SIZE, MAX_TRANSFER_SIZE, PADDING, PREAMBLE, PREAMBLE_SIZE, TYPE_COMMAND,
    TYPE_RESPONSE, TYPE_SPONTANEOUS_REPORT,
};
pub use command::{
    encode_command_frame, RequestKind, MAX_COMMAND_SIZE, REQUEST_BUS_CONTROL,
    REQUEST_DEBUG_AGENT, REQUEST_NCP_DFU,
};
pub use decoder::{DecoderStats, FrameDecoder, LowMessageDecoder};
pub use error::{FrameError, Result};
