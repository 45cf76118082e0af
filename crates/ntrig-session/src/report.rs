//! Decoding of multi-touch and pen report payloads.

use bytes::Buf;
use ntrig_frame::LowMessage;

use crate::event::{Finger, FingerLayout, PenEvent, TouchFrame};

/// Size of one finger record.
pub const FINGER_RECORD_SIZE: usize = 14;

/// Size of the pen record.
pub const PEN_RECORD_SIZE: usize = 8;

const FINGER_TIP_SWITCH: u8 = 0x01;
const FINGER_TOUCH_VALID: u8 = 0x04;

/// Errors that stop a report from being turned into an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    /// The declared contact count exceeds what the layout can hold.
    #[error("{layout:?} report declares {count} fingers, at most {max} allowed")]
    TooManyFingers {
        layout: FingerLayout,
        count: u8,
        max: usize,
    },

    /// The payload is shorter than its layout requires.
    #[error("report payload too short: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
}

fn require(payload: &[u8], needed: usize) -> Result<(), ReportError> {
    if payload.len() < needed {
        return Err(ReportError::Truncated {
            needed,
            available: payload.len(),
        });
    }
    Ok(())
}

/// Decode the finger table of a multi-touch report.
///
/// Standard layout: `report_count:u16, contact_count:u8, fingers[6]`.
/// Large layout: `report_count:u16, fingers[10], contact_count:u8`.
pub fn parse_touch_report(msg: &LowMessage, sensor_id: u32) -> Result<TouchFrame, ReportError> {
    let layout = FingerLayout::from_large_frame(msg.is_large_frame());
    let payload = msg.payload.as_ref();
    let max = layout.max_fingers();

    let (count_offset, fingers_offset) = match layout {
        FingerLayout::Standard => (2, 3),
        FingerLayout::Large => (2 + max * FINGER_RECORD_SIZE, 2),
    };
    require(payload, count_offset + 1)?;

    let mut head = payload;
    let frame_index = head.get_u16_le();
    let count = payload[count_offset];
    if count as usize > max {
        return Err(ReportError::TooManyFingers { layout, count, max });
    }
    require(payload, fingers_offset + count as usize * FINGER_RECORD_SIZE)?;

    let mut records = &payload[fingers_offset..];
    let fingers = (0..count)
        .map(|_| {
            let flags = records.get_u8();
            let track_id = records.get_u8();
            let x = records.get_u16_le();
            let y = records.get_u16_le();
            let dx = records.get_u16_le();
            let dy = records.get_u16_le();
            let vendor = records.get_u32_le();
            let tip = flags & FINGER_TIP_SWITCH != 0;
            Finger {
                x,
                y,
                dx,
                dy,
                track_id,
                removed: !tip,
                out_of_range: !tip,
                palm: flags & FINGER_TOUCH_VALID == 0,
                vendor,
            }
        })
        .collect();

    Ok(TouchFrame {
        sensor_id,
        frame_index,
        layout,
        fingers,
    })
}

/// Decode a pen report: `x:u16, y:u16, pressure:u16, buttons:u8, battery:u8`.
pub fn parse_pen_report(msg: &LowMessage, sensor_id: u32) -> Result<PenEvent, ReportError> {
    let mut payload = msg.payload.as_ref();
    require(payload, PEN_RECORD_SIZE)?;
    Ok(PenEvent {
        sensor_id,
        x: payload.get_u16_le(),
        y: payload.get_u16_le(),
        pressure: payload.get_u16_le(),
        buttons: payload.get_u8(),
        battery: payload.get_u8(),
    })
}
