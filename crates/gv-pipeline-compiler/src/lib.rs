//! Thread-pool-backed compiler that rebuilds a pipeline against the
//! instrumented shader module variants named by its per-stage
//! `ShaderInstrumentationKey`s, batching jobs by `PipelineKind` the same
//! way `gv-shader-compiler` batches by source module.

mod compiler;
mod job;

pub use compiler::PipelineCompiler;
pub use job::PipelineJob;
