use super::Lookup;
use crate::application::jobs::tracker::DEFAULT_HEARTBEAT;
use crate::infrastructure::progress_bus::DEFAULT_QUEUE_CAPACITY;
use std::time::Duration;

/// Progress stream sizing and heartbeat cadence.
#[derive(Debug, Clone)]
pub struct ProgressEnvConfig {
    pub queue_capacity: usize,
    pub heartbeat: Duration,
}

impl Default for ProgressEnvConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }
}

impl ProgressEnvConfig {
    pub(super) fn from_lookup(get: &Lookup) -> Self {
        let d = Self::default();
        Self {
            queue_capacity: super::parse_or(get, "PROGRESS_QUEUE_CAPACITY", d.queue_capacity).max(1),
            heartbeat: Duration::from_secs(
                super::parse_or(get, "PROGRESS_HEARTBEAT_SECS", d.heartbeat.as_secs()).max(1),
            ),
        }
    }
}
