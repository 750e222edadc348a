//! Bridges the location registry, the descriptor-set object table, and the
//! diagnostic registry's dispatched messages into the host-facing
//! validation report: groups each drained run of messages, merges repeats,
//! resolves their source extract and bound object, and hands back a
//! `VkGPUValidationReport`-shaped document on `Report()`.

mod aggregator;
mod handlers;
mod object_table;
mod types;

pub use aggregator::{GroupKey, ReportAggregator};
pub use handlers::install_handlers;
pub use object_table::DescriptorSetTable;
pub use types::{ObjectInfo, ReportMessage, SourceLocation, ValidationErrorType, VkGpuValidationReport};
