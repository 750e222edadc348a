use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the heart-beat thread. `interval` matches the scenario
/// text's "≈750ms" stall-detection window; `stall_beats` is how many
/// consecutive missed-progress ticks a submission tolerates before the
/// thread signals termination — one, by default, since the scenario shows
/// termination firing on the very next tick after the interval elapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(with = "duration_millis")]
    pub interval: Duration,
    pub stall_beats: u32,
    /// Capacity of the per-submission termination flag buffer
    /// (`kMaxTrackedSubmissions`); also the `SubmissionTracker`'s slot
    /// count.
    pub max_tracked_submissions: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(750),
            stall_beats: 1,
            max_tracked_submissions: 64,
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (value.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
