use std::sync::atomic::{AtomicU32, Ordering};

/// An SSA value, type, or block identity within one module. Stable for the
/// lifetime of the module; never reused even across removed instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(pub u32);

/// Hands out fresh IDs above the module's original bound, so instrumentation
/// never collides with an ID the source module already used.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU32,
}

impl Clone for IdAllocator {
    /// Clones the current counter value, not the atomic cell itself: the
    /// clone continues handing out IDs from wherever the original had
    /// reached, independently of it from that point on.
    fn clone(&self) -> Self {
        Self {
            next: AtomicU32::new(self.next.load(Ordering::Acquire)),
        }
    }
}

impl IdAllocator {
    pub fn starting_after(bound: u32) -> Self {
        Self {
            next: AtomicU32::new(bound),
        }
    }

    pub fn fresh(&self) -> Id {
        Id(self.next.fetch_add(1, Ordering::AcqRel))
    }

    /// The bound a module header should report after allocation: one past
    /// the highest ID handed out.
    pub fn bound(&self) -> u32 {
        self.next.load(Ordering::Acquire)
    }
}
