//! Host-side scheduling for the loop-termination feature: a heart-beat
//! thread watches tracked submissions for stalled progress and stages the
//! per-submission termination flag write when one goes unresponsive.

mod config;
mod heartbeat;
mod tracker;

pub use config::HeartbeatConfig;
pub use heartbeat::HeartbeatScheduler;
pub use tracker::SubmissionTracker;
