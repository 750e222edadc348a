use gv_core::Uid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiagnosticRegistryError {
    #[error("message UID {0} already has a handler registered")]
    DuplicateHandler(Uid),

    #[error("message UID space exhausted (16-bit space holds at most {} UIDs)", u16::MAX as u32 + 1)]
    MessageUidSpaceExhausted,
}
