use std::sync::atomic::{AtomicU64, Ordering};

use gv_core::Shared;
use parking_lot::Mutex;

struct TrackedSubmission {
    progress: Shared<AtomicU64>,
    last_seen: u64,
    stalled_beats: u32,
}

/// Fixed-capacity table of in-flight submissions the heart-beat thread
/// watches, indexed by slot `0..capacity` — the same slot space as the
/// per-submission termination flag buffer.
pub struct SubmissionTracker {
    slots: Mutex<Vec<Option<TrackedSubmission>>>,
}

impl SubmissionTracker {
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: Mutex::new((0..capacity).map(|_| None).collect()),
        }
    }

    /// Claims a free slot for a new submission and returns it along with a
    /// shared progress counter the host bumps as the GPU makes forward
    /// progress on it. `None` if every slot is already tracking one.
    pub fn begin(&self) -> Option<(u32, Shared<AtomicU64>)> {
        let mut slots = self.slots.lock();
        let index = slots.iter().position(Option::is_none)?;
        let progress = Shared::new(AtomicU64::new(0));
        slots[index] = Some(TrackedSubmission {
            progress: progress.clone(),
            last_seen: 0,
            stalled_beats: 0,
        });
        Some((index as u32, progress))
    }

    /// Releases `slot` once its submission has completed, whether or not
    /// termination was ever signalled for it.
    pub fn end(&self, slot: u32) {
        if let Some(entry) = self.slots.lock().get_mut(slot as usize) {
            *entry = None;
        }
    }

    /// One heart-beat tick. Compares every tracked slot's progress counter
    /// against the value seen at the previous tick; a slot whose counter
    /// hasn't moved for `stall_beats_threshold` consecutive ticks is
    /// returned for the caller to signal termination on.
    pub fn tick(&self, stall_beats_threshold: u32) -> Vec<u32> {
        let mut stalled = Vec::new();
        for (index, slot) in self.slots.lock().iter_mut().enumerate() {
            let Some(entry) = slot else { continue };
            let current = entry.progress.load(Ordering::Acquire);
            if current == entry.last_seen {
                entry.stalled_beats += 1;
                if entry.stalled_beats >= stall_beats_threshold {
                    stalled.push(index as u32);
                }
            } else {
                entry.stalled_beats = 0;
            }
            entry.last_seen = current;
        }
        stalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_fails_once_capacity_is_exhausted() {
        let tracker = SubmissionTracker::new(1);
        assert!(tracker.begin().is_some());
        assert!(tracker.begin().is_none());
    }

    #[test]
    fn end_frees_the_slot_for_reuse() {
        let tracker = SubmissionTracker::new(1);
        let (slot, _progress) = tracker.begin().unwrap();
        tracker.end(slot);
        assert!(tracker.begin().is_some());
    }

    #[test]
    fn tick_reports_a_slot_once_it_misses_the_threshold() {
        let tracker = SubmissionTracker::new(2);
        let (slot, progress) = tracker.begin().unwrap();

        assert!(tracker.tick(2).is_empty());
        assert_eq!(tracker.tick(2), vec![slot]);

        progress.store(1, Ordering::Release);
        assert!(tracker.tick(2).is_empty());
    }
}
