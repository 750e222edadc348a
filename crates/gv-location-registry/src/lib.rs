//! The location registry: owns the mapping
//! `extract-GUID <-> (file, line span, function name, source text,
//! descriptor binding)`, and is serializable so a separate host process can
//! render extracts from a previously-run instrumentation.

mod error;
mod parse;
mod registry;
mod serialize;
mod types;

pub use error::LocationRegistryError;
pub use registry::LocationRegistry;
pub use types::{
    DescriptorLocation, ExtractGuid, ExtractInfo, FileInfo, FileUid, VirtualFile, EXTRACT_GUID_BITS,
    NO_SOURCE,
};
