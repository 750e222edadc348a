use gv_core::{CombinedHash, GraphicsApi, ShaderInstrumentationKey, Shared};
use gv_state::PipelineState;

/// One pipeline to rebuild against a particular combination of per-stage
/// instrumented shader modules. `stage_keys` is parallel to
/// `pipeline.stages`: `stage_keys[i]` names the `(source hash, feature
/// mask)` the compiled variant for `pipeline.stages[i]` must come from.
pub struct PipelineJob<G: GraphicsApi> {
    pub pipeline: Shared<PipelineState<G>>,
    pub combined_hash: CombinedHash,
    pub stage_keys: Vec<ShaderInstrumentationKey>,
}

impl<G: GraphicsApi> PipelineJob<G> {
    pub fn new(pipeline: Shared<PipelineState<G>>, combined_hash: CombinedHash, stage_keys: Vec<ShaderInstrumentationKey>) -> Self {
        Self { pipeline, combined_hash, stage_keys }
    }
}
