use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Session tuning. Every field has a default, so a partial JSON document
/// deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Identifier stamped on every emitted event.
    pub sensor_id: u32,
    /// Whether the sensor sends heartbeats on its own.
    pub enable_auto_heartbeat: bool,
    /// Whether report checksums are verified.
    pub verify_checksum: bool,
    /// How long [`read`](crate::Session::read) waits for a reply.
    #[serde(with = "duration_ms")]
    pub reply_timeout: Duration,
    /// Replies held before new ones are dropped.
    pub reply_queue_capacity: usize,
    /// Pause taken by an interrupt that finds the output line low.
    #[serde(with = "duration_ms")]
    pub output_disabled_backoff: Duration,
    /// How long the output line stays low after a bootloader entry command.
    #[serde(with = "duration_ms")]
    pub bootloader_hold: Duration,
    /// Upper bound on drain cycles within one interrupt service.
    pub max_drain_cycles: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sensor_id: 0,
            enable_auto_heartbeat: false,
            verify_checksum: true,
            reply_timeout: Duration::from_secs(1),
            reply_queue_capacity: 64,
            output_disabled_backoff: Duration::from_millis(100),
            bootloader_hold: Duration::from_millis(500),
            max_drain_cycles: 1024,
        }
    }
}

/// Toggles that may change while the session runs.
#[derive(Debug)]
pub struct Settings {
    auto_heartbeat: AtomicBool,
    verify_checksum: AtomicBool,
}

impl Settings {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            auto_heartbeat: AtomicBool::new(config.enable_auto_heartbeat),
            verify_checksum: AtomicBool::new(config.verify_checksum),
        }
    }

    pub fn auto_heartbeat(&self) -> bool {
        self.auto_heartbeat.load(Ordering::Acquire)
    }

    pub fn set_auto_heartbeat(&self, enabled: bool) {
        self.auto_heartbeat.store(enabled, Ordering::Release);
    }

    pub fn verify_checksum(&self) -> bool {
        self.verify_checksum.load(Ordering::Acquire)
    }

    pub fn set_verify_checksum(&self, enabled: bool) {
        self.verify_checksum.store(enabled, Ordering::Release);
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
