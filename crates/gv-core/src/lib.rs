//! Shared types used across every crate of the GPU validation layer:
//! reference-counted handles, the validation feature mask, content/commit
//! hashing, host-facing configuration, and the bridge from internal
//! `tracing` events to the host's `log_callback`.

mod config;
mod feature_mask;
mod graphics_api;
mod hash;
mod logging;

pub use config::{LoopConfig, ValidationConfig};
pub use feature_mask::FeatureMask;
pub use graphics_api::{
    DirtyDescriptors, GraphicsApi, NullCommandBuffer, NullGraphicsApi, NullPipeline, NullPostCommandBuffer, NullShaderModule,
};
pub use hash::{CombinedHash, CommitSequence, CommitSequenceSnapshot, PipelineKind, ShaderInstrumentationKey, SourceHash};
pub use logging::{HostLogLayer, LogCallback, LogSeverity, LogSeverityMask};

use std::sync::Arc;

/// Every long-lived, cross-thread-shared object in this workspace (shader
/// module state, pipeline state, registry entries) is reference-counted the
/// same way: an atomically counted `Arc`. Named here so call sites read as
/// domain types rather than raw `Arc<T>`.
pub type Shared<T> = Arc<T>;

/// A 16-bit tag assigned by the diagnostic registry, shared by message UIDs,
/// descriptor UIDs, and push-constant-member UIDs (each from its own space).
pub type Uid = u16;
