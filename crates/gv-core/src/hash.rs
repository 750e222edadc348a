use fnv::FnvHasher;
use std::{
    hash::{Hash, Hasher},
    sync::atomic::{AtomicU64, Ordering},
};

/// 64-bit hash of a shader module's raw source bytecode, used to deduplicate
/// instrumentation jobs by `(source-hash, feature-mask)` (see C6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct SourceHash(pub u64);

impl SourceHash {
    pub fn of_bytecode(bytecode: &[u8]) -> Self {
        let mut hasher = FnvHasher::default();
        bytecode.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// An opaque, stable identifier for "this source module compiled under this
/// feature mask". Two keys compare equal iff the resulting instrumented
/// modules must behave identically for validation purposes — in this
/// implementation that reduces to `(source hash, feature mask)` equality,
/// since the rewriter is a pure function of those two inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ShaderInstrumentationKey {
    source: SourceHash,
    features: crate::FeatureMask,
}

impl ShaderInstrumentationKey {
    pub fn new(source: SourceHash, features: crate::FeatureMask) -> Self {
        Self { source, features }
    }

    pub fn source_hash(&self) -> SourceHash {
        self.source
    }

    pub fn feature_mask(&self) -> crate::FeatureMask {
        self.features
    }
}

/// Distinguishes which batching queue a pipeline-compile job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
    RayTracing,
}

/// The key that selects which instrumented pipeline variant backs a source
/// pipeline: the hash of the tuple of per-stage `ShaderInstrumentationKey`s
/// plus any pipeline-library keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CombinedHash(pub u64);

impl CombinedHash {
    pub fn compute(stage_keys: &[ShaderInstrumentationKey], library_keys: &[CombinedHash]) -> Self {
        let mut hasher = FnvHasher::default();
        for key in stage_keys {
            key.hash(&mut hasher);
        }
        for lib in library_keys {
            lib.0.hash(&mut hasher);
        }
        Self(hasher.finish())
    }
}

/// Monotonic per-compiler counter pair.
///
/// `enqueue` is called once per job submitted; `complete` once per job
/// published. Since `complete` can never outrun `enqueue`, a snapshot of
/// `enqueue` taken right after submitting a batch is "reached" exactly once
/// every job submitted up to that point — including ones submitted by other
/// callers racing the same compiler — has been published. This is the
/// future-free stand-in for polling a completion flag.
#[derive(Debug, Default)]
pub struct CommitSequence {
    enqueued: AtomicU64,
    completed: AtomicU64,
}

impl CommitSequence {
    pub fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        }
    }

    /// Called when a job is submitted to the thread pool.
    pub fn enqueue(&self) -> u64 {
        self.enqueued.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Called by a worker immediately after publishing a job's result
    /// (success or recorded failure — both count as "committed").
    pub fn complete(&self) -> u64 {
        self.completed.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// The current enqueued count, to be compared later via `is_reached`.
    pub fn capture(&self) -> CommitSequenceSnapshot {
        CommitSequenceSnapshot(self.enqueued.load(Ordering::Acquire))
    }

    pub fn is_reached(&self, snapshot: CommitSequenceSnapshot) -> bool {
        self.completed.load(Ordering::Acquire) >= snapshot.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CommitSequenceSnapshot(u64);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeatureMask;

    #[test]
    fn source_hash_is_stable() {
        let a = SourceHash::of_bytecode(&[1, 2, 3, 4]);
        let b = SourceHash::of_bytecode(&[1, 2, 3, 4]);
        assert_eq!(a, b);
    }

    #[test]
    fn instrumentation_key_distinguishes_feature_mask() {
        let source = SourceHash::of_bytecode(&[0xde, 0xad, 0xbe, 0xef]);
        let a = ShaderInstrumentationKey::new(source, FeatureMask::RESOURCE_BOUNDS);
        let b = ShaderInstrumentationKey::new(source, FeatureMask::LOOP_TERMINATION);
        assert_ne!(a, b);

        let c = ShaderInstrumentationKey::new(source, FeatureMask::RESOURCE_BOUNDS);
        assert_eq!(a, c);
    }

    #[test]
    fn commit_sequence_is_reached_after_matching_completions() {
        let seq = CommitSequence::new();
        seq.enqueue();
        seq.enqueue();
        let snapshot = seq.capture();
        assert!(!seq.is_reached(snapshot));

        seq.complete();
        assert!(!seq.is_reached(snapshot));

        seq.complete();
        assert!(seq.is_reached(snapshot));
    }

    #[test]
    fn combined_hash_is_order_sensitive_free_but_content_sensitive() {
        let source = SourceHash::of_bytecode(b"vs_main");
        let key = ShaderInstrumentationKey::new(source, FeatureMask::empty());
        let a = CombinedHash::compute(&[key], &[]);
        let b = CombinedHash::compute(&[key], &[]);
        assert_eq!(a, b);

        let other_key = ShaderInstrumentationKey::new(source, FeatureMask::EXPORT_STABILITY);
        let c = CombinedHash::compute(&[other_key], &[]);
        assert_ne!(a, c);
    }
}
