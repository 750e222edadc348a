use serde::{Deserialize, Serialize};

/// Which feature pass a message came from, named the way `VkGPUValidationFeature`
/// names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorType {
    ResourceBounds,
    DescriptorArrayBounds,
    ExportStability,
    LoopTermination,
    ResourceInitialization,
}

/// Object info resolved from whatever descriptor the offending extract was
/// bound to, decorated via the debug-utils object naming the host feeds
/// into `DescriptorSetTable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub name: Option<String>,
    pub handle: u64,
}

/// Where in the original shader source the flagged operation lives,
/// resolved from the location registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub function: Option<String>,
    pub line: u32,
    pub column: u32,
    pub text: String,
}

/// One `VkGPUValidationMessage`-shaped report entry: a feature id, its
/// error type, human-readable text, the resolved source extract (absent if
/// the GPU message carried no extract GUID or the registry ran out of
/// extract space), the resolved bound-resource object info (absent if none
/// was bound, or if the per-`Report()` object threshold was hit), and how
/// many occurrences this entry merges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMessage {
    pub feature_id: u16,
    pub error_type: ValidationErrorType,
    pub message: String,
    pub source: Option<SourceLocation>,
    pub object: Option<ObjectInfo>,
    pub merge_count: u32,
}

/// The full `VkGPUValidationReport`-shaped document a `Report()` call
/// produces: every feature's outbound queue concatenated together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VkGpuValidationReport {
    pub messages: Vec<ReportMessage>,
}
