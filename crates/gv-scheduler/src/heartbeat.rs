use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use gv_core::{GraphicsApi, Shared};

use crate::config::HeartbeatConfig;
use crate::tracker::SubmissionTracker;

/// Wakes every `config.interval`, ticks the shared `SubmissionTracker`, and
/// signals GPU-side termination for any submission that missed
/// `config.stall_beats` consecutive ticks. Stopped by dropping — the stop
/// channel closing wakes the thread out of its `recv_timeout` immediately
/// rather than waiting out the rest of the current interval.
pub struct HeartbeatScheduler {
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl HeartbeatScheduler {
    pub fn start<G: GraphicsApi>(graphics_api: Shared<G>, tracker: Shared<SubmissionTracker>, config: HeartbeatConfig) -> Self {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let worker = std::thread::spawn(move || run(graphics_api, tracker, config, stop_rx));
        Self {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        }
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        self.stop_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run<G: GraphicsApi>(graphics_api: Shared<G>, tracker: Shared<SubmissionTracker>, config: HeartbeatConfig, stop_rx: Receiver<()>) {
    loop {
        match stop_rx.recv_timeout(config.interval) {
            Ok(()) => return,
            Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {
                for slot in tracker.tick(config.stall_beats) {
                    graphics_api.signal_submission_termination(slot);
                    tracing::warn!(event = "TerminationSignalled", slot, "heart-beat thread signaled a stalled submission");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use gv_core::NullGraphicsApi;

    use super::*;

    #[test]
    fn signals_termination_for_a_submission_that_never_progresses() {
        let graphics_api = Shared::new(NullGraphicsApi::new());
        let tracker = Shared::new(SubmissionTracker::new(4));
        let (slot, _progress) = tracker.begin().unwrap();

        let config = HeartbeatConfig {
            interval: Duration::from_millis(5),
            stall_beats: 1,
            max_tracked_submissions: 4,
        };
        let scheduler = HeartbeatScheduler::start(graphics_api.clone(), tracker.clone(), config);

        let deadline = std::time::Instant::now() + Duration::from_millis(500);
        while graphics_api.signalled_slots().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        drop(scheduler);

        assert_eq!(graphics_api.signalled_slots(), vec![slot]);
    }

    #[test]
    fn does_not_signal_a_submission_that_keeps_progressing() {
        let graphics_api = Shared::new(NullGraphicsApi::new());
        let tracker = Shared::new(SubmissionTracker::new(4));
        let (_slot, progress) = tracker.begin().unwrap();

        let config = HeartbeatConfig {
            interval: Duration::from_millis(5),
            stall_beats: 1,
            max_tracked_submissions: 4,
        };
        let scheduler = HeartbeatScheduler::start(graphics_api.clone(), tracker, config);

        for i in 0..10 {
            std::thread::sleep(Duration::from_millis(5));
            progress.fetch_add(i + 1, Ordering::AcqRel);
        }
        drop(scheduler);

        assert!(graphics_api.signalled_slots().is_empty());
    }
}
