use std::sync::{Mutex, PoisonError};

use serde::Serialize;

/// Finger table layout, selected by the large-frame flag of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerLayout {
    /// 128-byte report, up to 6 fingers.
    Standard,
    /// 256-byte report, up to 10 fingers.
    Large,
}

impl FingerLayout {
    pub fn from_large_frame(large: bool) -> Self {
        if large {
            Self::Large
        } else {
            Self::Standard
        }
    }

    /// Most fingers one report of this layout can carry.
    pub fn max_fingers(self) -> usize {
        match self {
            Self::Standard => 6,
            Self::Large => 10,
        }
    }
}

/// One contact in a touch frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Finger {
    pub x: u16,
    pub y: u16,
    pub dx: u16,
    pub dy: u16,
    pub track_id: u8,
    /// The finger left the surface (tip switch released).
    pub removed: bool,
    /// The finger is no longer in range.
    pub out_of_range: bool,
    /// The sensor classified the contact as a palm.
    pub palm: bool,
    pub vendor: u32,
}

/// All contacts of one multi-touch report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TouchFrame {
    pub sensor_id: u32,
    pub frame_index: u16,
    pub layout: FingerLayout,
    pub fingers: Vec<Finger>,
}

/// One pen report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PenEvent {
    pub sensor_id: u32,
    pub x: u16,
    pub y: u16,
    pub pressure: u16,
    pub buttons: u8,
    pub battery: u8,
}

/// Event handed to the downstream input stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorEvent {
    Touch(TouchFrame),
    Pen(PenEvent),
}

/// Downstream consumer of sensor events. Fire and forget.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: SensorEvent);
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn deliver(&self, event: SensorEvent) {
        (**self).deliver(event)
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<SensorEvent>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events delivered so far.
    pub fn events(&self) -> Vec<SensorEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return every recorded event.
    pub fn take(&self) -> Vec<SensorEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for EventRecorder {
    fn deliver(&self, event: SensorEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = SensorEvent::Pen(PenEvent {
            sensor_id: 1,
            x: 10,
            y: 20,
            pressure: 300,
            buttons: 2,
            battery: 90,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "pen");
        assert_eq!(json["pressure"], 300);
    }

    #[test]
    fn recorder_keeps_order_and_drains() {
        let recorder = EventRecorder::new();
        let frame = TouchFrame {
            sensor_id: 0,
            frame_index: 4,
            layout: FingerLayout::Standard,
            fingers: Vec::new(),
        };
        recorder.deliver(SensorEvent::Touch(frame.clone()));
        recorder.deliver(SensorEvent::Touch(TouchFrame {
            frame_index: 5,
            ..frame
        }));

        let events = recorder.take();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], SensorEvent::Touch(f) if f.frame_index == 5));
        assert!(recorder.events().is_empty());
    }
}
