use std::sync::atomic::{AtomicUsize, Ordering};

use gv_core::Shared;
use parking_lot::Mutex;

/// Anything storable in a [`SlotTable`] carries its own position so a
/// swap-with-back removal can fix up whichever entry gets moved.
pub trait Slotted {
    fn slot_index(&self) -> &AtomicUsize;
}

/// A process-wide, reference-counted table: every application-visible
/// shader-module or pipeline handle is a slot index into one of these plus
/// the `Shared<T>` the table itself hands back on insert. Removing an entry
/// never shifts every later entry down (an O(n) cost this table doesn't
/// pay): it swaps the removed slot with the last one and fixes up the moved
/// entry's own recorded index.
///
/// Holding a `Shared<T>` clone (e.g. from an in-flight compile job) keeps
/// the state object alive after `remove` drops the table's own reference;
/// teardown of the underlying graphics-API object is left to `T`'s own
/// `Drop`, not to the table.
pub struct SlotTable<T: Slotted> {
    slots: Mutex<Vec<Shared<T>>>,
}

impl<T: Slotted> Default for SlotTable<T> {
    fn default() -> Self {
        Self { slots: Mutex::new(Vec::new()) }
    }
}

impl<T: Slotted> SlotTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new entry, handing `make` the slot index it will occupy
    /// so the constructed state can record its own position up front.
    pub fn insert(&self, make: impl FnOnce(usize) -> T) -> Shared<T> {
        let mut slots = self.slots.lock();
        let index = slots.len();
        let state = Shared::new(make(index));
        slots.push(state.clone());
        state
    }

    pub fn get(&self, index: usize) -> Option<Shared<T>> {
        self.slots.lock().get(index).cloned()
    }

    /// Removes the entry at `index`. Whatever was previously last now
    /// lives at `index`; its `slot_index` is updated before this returns,
    /// so any reference to it obtained afterward sees the new position.
    pub fn remove(&self, index: usize) -> Option<Shared<T>> {
        let mut slots = self.slots.lock();
        if index >= slots.len() {
            tracing::warn!(index, len = slots.len(), "slot table remove called with out-of-range index");
            return None;
        }
        let removed = slots.swap_remove(index);
        if let Some(moved) = slots.get(index) {
            moved.slot_index().store(index, Ordering::Release);
        }
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Entry {
        slot_index: AtomicUsize,
        tag: u32,
    }

    impl Slotted for Entry {
        fn slot_index(&self) -> &AtomicUsize {
            &self.slot_index
        }
    }

    #[test]
    fn remove_fixes_up_the_moved_entry() {
        let table: SlotTable<Entry> = SlotTable::new();
        let a = table.insert(|index| Entry { slot_index: AtomicUsize::new(index), tag: 1 });
        let _b = table.insert(|index| Entry { slot_index: AtomicUsize::new(index), tag: 2 });
        let c = table.insert(|index| Entry { slot_index: AtomicUsize::new(index), tag: 3 });

        assert_eq!(c.slot_index.load(Ordering::Acquire), 2);

        table.remove(0);
        assert_eq!(table.len(), 2);
        // `c` was last, so it moved into `a`'s old slot 0.
        assert_eq!(c.slot_index.load(Ordering::Acquire), 0);
        assert_eq!(table.get(0).unwrap().tag, 3);
        assert_eq!(a.tag, 1);
    }

    #[test]
    fn dropping_the_tables_handle_does_not_drop_a_held_clone() {
        let table: SlotTable<Entry> = SlotTable::new();
        let held = table.insert(|index| Entry { slot_index: AtomicUsize::new(index), tag: 7 });
        let held = held.clone();
        table.remove(0);
        assert_eq!(held.tag, 7);
    }
}
