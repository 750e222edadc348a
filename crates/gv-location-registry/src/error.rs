use crate::{ExtractGuid, FileUid};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocationRegistryError {
    /// The extract table would exceed `2^kShaderLocationGUIDBits`
    /// Callers should register `NO_SOURCE` instead of
    /// failing the instrumentation job entirely
    #[error("location registry is out of extract space (limit is 2^{} entries)", crate::types::EXTRACT_GUID_BITS)]
    ExtractSpaceExhausted,

    #[error("unknown file UID {0}")]
    UnknownFile(FileUid),

    #[error("unknown extract GUID {0}")]
    UnknownExtract(ExtractGuid),

    #[error("file {0} has no recorded line offsets")]
    MalformedFile(FileUid),

    #[error("serialization error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupted location registry stream: {0}")]
    Corrupt(String),
}
