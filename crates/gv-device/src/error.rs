use thiserror::Error;

/// The only two failures that abort installation rather than degrading
/// validation coverage: the export buffer and the PRMT are allocated once,
/// up front, and nothing downstream has a fallback for either being
/// missing.
#[derive(Debug, Error)]
pub enum FatalInstallError<E: std::error::Error + 'static> {
    #[error("failed to allocate the export buffer or PRMT")]
    ResourceAllocation(#[source] E),
    #[error(transparent)]
    DiagnosticRegistry(#[from] gv_diagnostic_registry::DiagnosticRegistryError),
}
