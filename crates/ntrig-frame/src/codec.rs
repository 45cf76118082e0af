use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Bus preamble preceding every data region.
pub const PREAMBLE: [u8; 8] = [0xFF, 0xFF, 0xFF, 0xFF, 0xA5, 0x5A, 0xE7, 0x7E];

/// Preamble size in bytes.
pub const PREAMBLE_SIZE: usize = PREAMBLE.len();

/// Low-message header: type (1) + length (2) + flags (1) + channel (1) + function (1).
pub const HEADER_SIZE: usize = 6;

/// Standard bus frame: preamble + 128-byte data region.
pub const FRAME_SIZE_STANDARD: usize = 136;

/// Large-frame mode bus frame: preamble + 256-byte data region.
pub const FRAME_SIZE_LARGE: usize = 264;

/// Transfer buffers are always sized for the largest frame.
pub const MAX_TRANSFER_SIZE: usize = FRAME_SIZE_LARGE;

/// Largest logical message, header included.
pub const MAX_LOGICAL_MESSAGE_SIZE: usize = 4 * 1024;

/// Region filler; a type byte with this value ends the useful part of a region.
pub const PADDING: u8 = 0xFF;

/// Message type: report the sensor sends on its own.
pub const TYPE_SPONTANEOUS_REPORT: u8 = 1;
/// Message type: reply to a host command.
pub const TYPE_RESPONSE: u8 = 2;
/// Message type: host command.
pub const TYPE_COMMAND: u8 = 3;

/// Function: multi-touch report.
pub const FUNCTION_MT_REPORT: u8 = 0x01;
/// Function: pen report.
pub const FUNCTION_PEN_REPORT: u8 = 0x02;
/// Function: NCP (maintenance protocol) traffic.
pub const FUNCTION_NCP: u8 = 0x03;
/// Function: debug agent traffic.
pub const FUNCTION_DEBUG_AGENT: u8 = 0x04;
/// Function: bus control.
pub const FUNCTION_BUS_CONTROL: u8 = 0x05;

/// Flags bit set when the sensor runs in large-frame mode.
pub const FLAG_LARGE_FRAME: u8 = 0x80;

/// Flags bits holding the number of fragments still to come.
pub const FLAG_FRAGMENTS_MASK: u8 = 0x7F;

/// One low message taken off the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowMessage {
    /// Message type (`TYPE_*`).
    pub msg_type: u8,
    /// Declared length, header included.
    pub length: u16,
    /// Fragment count and mode bits.
    pub flags: u8,
    /// Routing channel.
    pub channel: u8,
    /// Function within the channel.
    pub function: u8,
    /// Payload bytes following the header.
    pub payload: Bytes,
}

impl LowMessage {
    /// Create a message whose declared length matches its payload.
    ///
    /// The length field saturates at `u16::MAX`; anything past
    /// [`MAX_LOGICAL_MESSAGE_SIZE`] is rejected by [`decode_low_message`].
    pub fn new(msg_type: u8, flags: u8, channel: u8, function: u8, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            msg_type,
            length: u16::try_from(HEADER_SIZE + payload.len()).unwrap_or(u16::MAX),
            flags,
            channel,
            function,
            payload,
        }
    }

    /// The 6 header bytes as they appear on the wire.
    pub fn header_bytes(&self) -> [u8; HEADER_SIZE] {
        let [lo, hi] = self.length.to_le_bytes();
        [self.msg_type, lo, hi, self.flags, self.channel, self.function]
    }

    /// Header and payload bytes in wire order.
    pub fn wire_bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.header_bytes()
            .into_iter()
            .chain(self.payload.iter().copied())
    }

    /// Whether the sensor marked this message as sent in large-frame mode.
    pub fn is_large_frame(&self) -> bool {
        self.flags & FLAG_LARGE_FRAME != 0
    }

    /// Number of fragments of the logical message still to come.
    pub fn fragments_remaining(&self) -> u8 {
        self.flags & FLAG_FRAGMENTS_MASK
    }

    /// Read a little-endian u16 at a payload offset.
    pub fn payload_u16(&self, offset: usize) -> Option<u16> {
        let bytes = self.payload.get(offset..offset.checked_add(2)?)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a little-endian u32 at a payload offset.
    pub fn payload_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.payload.get(offset..offset.checked_add(4)?)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Encode a low message (header + payload) into `dst`.
pub fn encode_low_message(msg: &LowMessage, dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE + msg.payload.len());
    dst.put_slice(&msg.header_bytes());
    dst.put_slice(&msg.payload);
}

/// Decode one complete low message from the start of `src`.
///
/// Bytes past the declared length are ignored.
pub fn decode_low_message(src: &[u8]) -> Result<LowMessage> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            needed: HEADER_SIZE,
            available: src.len(),
        });
    }

    let length = u16::from_le_bytes([src[1], src[2]]);
    let total = length as usize;
    if total < HEADER_SIZE || total > MAX_LOGICAL_MESSAGE_SIZE {
        return Err(FrameError::InvalidLength(length));
    }
    if src.len() < total {
        return Err(FrameError::Truncated {
            needed: total,
            available: src.len(),
        });
    }

    Ok(LowMessage {
        msg_type: src[0],
        length,
        flags: src[3],
        channel: src[4],
        function: src[5],
        payload: Bytes::copy_from_slice(&src[HEADER_SIZE..total]),
    })
}

/// Split a stream of encoded low messages into bus frames of `frame_size`.
///
/// Each frame gets the preamble followed by the next slice of the stream;
/// the tail of the last frame is padded.
pub fn pack_bus_frames(stream: &[u8], frame_size: usize) -> Vec<Bytes> {
    let region = frame_size.saturating_sub(PREAMBLE_SIZE);
    if region == 0 {
        return Vec::new();
    }

    stream
        .chunks(region)
        .map(|chunk| {
            let mut frame = BytesMut::with_capacity(frame_size);
            frame.put_slice(&PREAMBLE);
            frame.put_slice(chunk);
            frame.resize(frame_size, PADDING);
            frame.freeze()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{MAINT_REPLY, PEN};

    #[test]
    fn oversized_payload_saturates_length() {
        let msg = LowMessage::new(TYPE_RESPONSE, 0, MAINT_REPLY, FUNCTION_NCP, vec![0u8; 70_000]);
        assert_eq!(msg.length, u16::MAX);

        let wire: Vec<u8> = msg.wire_bytes().collect();
        assert!(matches!(
            decode_low_message(&wire),
            Err(FrameError::InvalidLength(u16::MAX))
        ));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let msg = LowMessage::new(TYPE_RESPONSE, 0x02, MAINT_REPLY, FUNCTION_NCP, vec![0x7E, 1, 2]);
        let mut buf = BytesMut::new();
        encode_low_message(&msg, &mut buf);

        assert_eq!(buf.len(), HEADER_SIZE + 3);
        assert_eq!(&buf[..3], &[TYPE_RESPONSE, 9, 0]);

        let decoded = decode_low_message(&buf).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.fragments_remaining(), 2);
        assert!(!decoded.is_large_frame());
    }

    #[test]
    fn decode_rejects_short_header() {
        let result = decode_low_message(&[1, 6]);
        assert!(matches!(result, Err(FrameError::Truncated { needed: 6, .. })));
    }

    #[test]
    fn decode_rejects_length_below_header() {
        let result = decode_low_message(&[1, 3, 0, 0, 0, 0]);
        assert!(matches!(result, Err(FrameError::InvalidLength(3))));
    }

    #[test]
    fn decode_rejects_missing_payload() {
        let result = decode_low_message(&[1, 10, 0, 0, PEN, 2, 0xAA]);
        assert!(matches!(
            result,
            Err(FrameError::Truncated {
                needed: 10,
                available: 7
            })
        ));
    }

    #[test]
    fn flags_split_into_mode_and_fragments() {
        let msg = LowMessage::new(TYPE_RESPONSE, 0x83, MAINT_REPLY, FUNCTION_NCP, Bytes::new());
        assert!(msg.is_large_frame());
        assert_eq!(msg.fragments_remaining(), 3);
    }

    #[test]
    fn payload_accessors_are_bounds_checked() {
        let msg = LowMessage::new(TYPE_SPONTANEOUS_REPORT, 0, PEN, 2, vec![0x34, 0x12, 0x78, 0x56]);
        assert_eq!(msg.payload_u16(0), Some(0x1234));
        assert_eq!(msg.payload_u32(0), Some(0x5678_1234));
        assert_eq!(msg.payload_u16(3), None);
        assert_eq!(msg.payload_u32(usize::MAX), None);
    }

    #[test]
    fn pack_bus_frames_prefixes_and_pads() {
        let stream = vec![0x11u8; 200];
        let frames = pack_bus_frames(&stream, FRAME_SIZE_STANDARD);

        assert_eq!(frames.len(), 2);
        for frame in &frames {
            assert_eq!(frame.len(), FRAME_SIZE_STANDARD);
            assert_eq!(&frame[..PREAMBLE_SIZE], &PREAMBLE);
        }
        assert_eq!(frames[1][PREAMBLE_SIZE + 72 - 1], 0x11);
        assert_eq!(frames[1][PREAMBLE_SIZE + 72], PADDING);
    }
}
