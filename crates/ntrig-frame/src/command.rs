use bytes::BufMut;

use crate::channel::{CONTROL, DEBUG, MAINT};
use crate::codec::{
    FUNCTION_BUS_CONTROL, FUNCTION_DEBUG_AGENT, FUNCTION_NCP, HEADER_SIZE, MAX_TRANSFER_SIZE,
    PADDING, PREAMBLE, PREAMBLE_SIZE, TYPE_COMMAND,
};
use crate::error::{FrameError, Result};

/// First command byte of NCP and firmware-update commands.
pub const REQUEST_NCP_DFU: u8 = 0x7E;

/// First command byte of debug agent commands.
pub const REQUEST_DEBUG_AGENT: u8 = 0x60;

/// First command byte of bus control commands.
pub const REQUEST_BUS_CONTROL: u8 = 0x0B;

/// Largest command that fits in one transfer after preamble and header.
pub const MAX_COMMAND_SIZE: usize = MAX_TRANSFER_SIZE - PREAMBLE_SIZE - HEADER_SIZE;

/// Outbound command kinds, keyed by the first command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// NCP maintenance or firmware update.
    NcpDfu,
    /// Debug agent.
    DebugAgent,
    /// Bus control.
    BusControl,
}

impl RequestKind {
    /// Classify a command by its first byte.
    pub fn from_request_byte(byte: u8) -> Option<Self> {
        match byte {
            REQUEST_NCP_DFU => Some(Self::NcpDfu),
            REQUEST_DEBUG_AGENT => Some(Self::DebugAgent),
            REQUEST_BUS_CONTROL => Some(Self::BusControl),
            _ => None,
        }
    }

    /// Channel the command travels on.
    pub fn channel(self) -> u8 {
        match self {
            Self::NcpDfu => MAINT,
            Self::DebugAgent => DEBUG,
            Self::BusControl => CONTROL,
        }
    }

    /// Function field of the command header.
    pub fn function(self) -> u8 {
        match self {
            Self::NcpDfu => FUNCTION_NCP,
            Self::DebugAgent => FUNCTION_DEBUG_AGENT,
            Self::BusControl => FUNCTION_BUS_CONTROL,
        }
    }
}

/// Encode a raw command into a transfer buffer.
///
/// Layout:
/// ```text
/// ┌──────────────┬──────┬──────────┬───────┬─────────┬──────────┬─────────┬─────────┐
/// │ Preamble (8) │ Type │ Len (2B) │ Flags │ Channel │ Function │ Command │ 0xFF .. │
/// └──────────────┴──────┴──────────┴───────┴─────────┴──────────┴─────────┴─────────┘
/// ```
///
/// Nothing is written when the command is rejected.
pub fn encode_command_frame(command: &[u8], dst: &mut [u8]) -> Result<RequestKind> {
    let request = *command.first().ok_or(FrameError::EmptyCommand)?;
    let kind = RequestKind::from_request_byte(request).ok_or(FrameError::UnsupportedRequest(request))?;

    let max = dst
        .len()
        .saturating_sub(PREAMBLE_SIZE + HEADER_SIZE)
        .min(MAX_COMMAND_SIZE);
    if command.len() > max {
        return Err(FrameError::CommandTooLarge {
            size: command.len(),
            max,
        });
    }

    let used = PREAMBLE_SIZE + HEADER_SIZE + command.len();
    {
        let mut out = &mut dst[..used];
        out.put_slice(&PREAMBLE);
        out.put_u8(TYPE_COMMAND);
        out.put_u16_le((HEADER_SIZE + command.len()) as u16);
        out.put_u8(0);
        out.put_u8(kind.channel());
        out.put_u8(kind.function());
        out.put_slice(command);
    }
    dst[used..].fill(PADDING);

    Ok(kind)
}
