use crate::{FeatureMask, LogSeverityMask};
use serde::{Deserialize, Serialize};

/// Runtime tunables for the loop-termination feature pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Whether the pass enforces `iteration_limit` in addition to the
    /// heart-beat termination flag.
    pub use_iteration_limits: bool,
    /// Iteration ceiling past which a loop is considered stuck even without
    /// a heart-beat signal.
    pub iteration_limit: u32,
    /// How many loop iterations elapse between atomic reads of the
    /// per-submission termination flag.
    pub atomic_iteration_interval: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            use_iteration_limits: true,
            iteration_limit: 1_000_000,
            atomic_iteration_interval: 1024,
        }
    }
}

/// Host entry-point options, constructible from defaults and
/// overridable field-by-field before `install`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub feature_mask: FeatureMask,
    pub log_severity_mask: LogSeverityMask,
    pub strip_folders: bool,
    pub shader_connection_object_threshold: usize,
    pub export_buffer_capacity: u32,
    pub loop_config: LoopConfig,
    /// Whether `UninitializedResource` messages carry the packed resource
    /// token (PUID) as an extra chunk.
    pub initialization_detail: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            feature_mask: FeatureMask::empty(),
            log_severity_mask: LogSeverityMask::ERROR | LogSeverityMask::WARNING,
            strip_folders: false,
            shader_connection_object_threshold: 4096,
            export_buffer_capacity: 1 << 20,
            loop_config: LoopConfig::default(),
            initialization_detail: false,
        }
    }
}
