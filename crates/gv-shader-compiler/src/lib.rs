//! Thread-pool-backed compiler that rewrites a shader module's mid-level
//! IR into one instrumented variant per active `FeatureMask`, lowers it
//! through a dialect-specific [`ModuleEncoder`], and hands the resulting
//! bytecode to a [`GraphicsApi`] implementation. Deduplicates by
//! `(source hash, feature mask)` so the same module is never rewritten
//! twice for the same active feature set.

mod compiler;
mod encoder;
mod error;
mod features;
mod source_module;

pub use compiler::ShaderCompiler;
pub use encoder::{ModuleEncoder, NullModuleEncoder};
pub use error::CompileError;
pub use features::{feature_id, FeatureSet};
pub use source_module::{InstrumentedModule, SourceModule};

pub use gv_core::GraphicsApi;
