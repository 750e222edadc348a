use fnv::FnvHashMap;

use gv_core::{CombinedHash, DirtyDescriptors, FeatureMask, GraphicsApi, Shared, ShaderInstrumentationKey};
use gv_diagnostic_registry::DiagnosticRegistry;
use gv_state::PipelineState;

use crate::push_constants::merge_push_constants;

/// Computes the `combined_hash` a pipeline's stages would produce under
/// `feature_mask`, the key `BindPipeline` consults the pipeline's
/// instrumented map with.
pub fn combined_hash_for<G: GraphicsApi>(pipeline: &PipelineState<G>, feature_mask: FeatureMask) -> CombinedHash {
    let stage_keys: Vec<ShaderInstrumentationKey> = pipeline
        .stages
        .iter()
        .map(|stage| ShaderInstrumentationKey::new(stage.source.source_hash, feature_mask))
        .collect();
    CombinedHash::compute(&stage_keys, &[])
}

/// Per-command-buffer interception state. One instance is created at
/// `Begin` and consumed at `End`; command-buffer recording is
/// single-threaded per the underlying graphics API, so this holds no lock
/// of its own.
pub struct CommandBufferProxy<G: GraphicsApi> {
    command_buffer: G::CommandBuffer,
    dirty: DirtyDescriptors,
    bound_pipeline_is_instrumented: bool,
}

impl<G: GraphicsApi> CommandBufferProxy<G> {
    /// `Begin`: resets the per-command-buffer shader-export descriptor
    /// state so the first `Draw`/`Dispatch` always (re-)commits it.
    pub fn begin(command_buffer: G::CommandBuffer) -> Self {
        Self {
            command_buffer,
            dirty: DirtyDescriptors::all(),
            bound_pipeline_is_instrumented: false,
        }
    }

    /// `BindPipeline`: looks up the pipeline's instrumented variant for the
    /// currently active feature mask; binds it in place of the source
    /// pipeline when present, falling back to the source pipeline
    /// otherwise (the draw proceeds unvalidated for this bind, never
    /// blocked). Always (re-)pushes the merged push-constant block, since
    /// a bind can switch between an instrumented and a source variant with
    /// different layouts.
    pub fn bind_pipeline(
        &mut self,
        graphics_api: &G,
        pipeline: &Shared<PipelineState<G>>,
        active_feature_mask: FeatureMask,
        diagnostics: &DiagnosticRegistry,
        host_push_constants: &[u8],
        feature_push_constant_values: &FnvHashMap<u16, u32>,
    ) {
        let combined_hash = combined_hash_for(pipeline.as_ref(), active_feature_mask);

        self.bound_pipeline_is_instrumented = match pipeline.get_instrument(combined_hash) {
            Some(instrumented) => {
                graphics_api.bind_pipeline(&self.command_buffer, &instrumented.handle);
                true
            }
            None => {
                graphics_api.bind_pipeline(&self.command_buffer, &pipeline.source_pipeline);
                false
            }
        };

        let merged = merge_push_constants(host_push_constants, diagnostics, feature_push_constant_values);
        graphics_api.push_constants(&self.command_buffer, &merged);

        self.dirty = DirtyDescriptors::all();
    }

    /// `Draw`/`Dispatch`: commits any pending descriptor updates backing
    /// the export buffer, the per-feature resources, and the PRMT. A no-op
    /// once a bind's updates have already been committed for this
    /// command-buffer recording.
    pub fn draw_or_dispatch(&mut self, graphics_api: &G) {
        if !self.dirty.is_empty() {
            graphics_api.commit_descriptor_updates(&self.command_buffer, self.dirty);
            self.dirty = DirtyDescriptors::empty();
        }
    }

    pub fn bound_pipeline_is_instrumented(&self) -> bool {
        self.bound_pipeline_is_instrumented
    }

    /// `End`: records the follow-up "post" command buffer that reads the
    /// export counter back into host memory once its own submission has
    /// been fenced.
    pub fn end(self, graphics_api: &G) -> PostCommandBuffer<G> {
        let post = graphics_api.record_post_command_buffer(&self.command_buffer);
        PostCommandBuffer { post }
    }
}

/// The command buffer recorded at `End`. Its export-counter readback must
/// not be consulted until the submission it belongs to has fenced — see
/// `read_export_counter`.
pub struct PostCommandBuffer<G: GraphicsApi> {
    post: G::PostCommandBuffer,
}

impl<G: GraphicsApi> PostCommandBuffer<G> {
    /// Reads the export counter back. Caller is responsible for waiting on
    /// this command buffer's submission fence first; this never blocks.
    pub fn read_export_counter(&self, graphics_api: &G) -> u32 {
        graphics_api.read_export_counter(&self.post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use fnv::FnvHashMap;
    use gv_core::{NullCommandBuffer, NullGraphicsApi, PipelineKind, SourceHash};
    use gv_diagnostic_registry::DiagnosticRegistry;
    use gv_export::ExportBufferLayout;
    use gv_ir::{Id, Module};
    use gv_location_registry::LocationRegistry;
    use gv_shader_compiler::{InstrumentedModule, SourceModule};
    use gv_state::{PipelineState, ShaderModuleState, SlotTable};

    fn build_pipeline(source_hash: u64) -> (Shared<PipelineState<NullGraphicsApi>>, Shared<SourceModule<NullGraphicsApi>>) {
        let registry = LocationRegistry::new(false);
        let source = SourceModule::new(SourceHash(source_hash), Module::new(Id(1), 10), 0, 0, &registry, "test", "test.hlsl", "");
        let shader_modules: SlotTable<ShaderModuleState<NullGraphicsApi>> = SlotTable::new();
        let stage = shader_modules.insert(|index| ShaderModuleState::new(index, vec![], source.clone()));

        let pipelines: SlotTable<PipelineState<NullGraphicsApi>> = SlotTable::new();
        let pipeline = pipelines.insert(|index| {
            PipelineState::new(index, PipelineKind::Graphics, Vec::new(), vec![stage], gv_core::NullPipeline(0))
        });
        (pipeline, source)
    }

    #[test]
    fn binds_source_pipeline_when_no_instrument_is_published() {
        let api = NullGraphicsApi::new();
        let diagnostics = DiagnosticRegistry::new();
        let (pipeline, _source) = build_pipeline(1);

        let mut proxy = CommandBufferProxy::begin(NullCommandBuffer::new());
        proxy.bind_pipeline(&api, &pipeline, FeatureMask::RESOURCE_BOUNDS, &diagnostics, &[], &FnvHashMap::default());

        assert!(!proxy.bound_pipeline_is_instrumented());
        assert_eq!(pipeline.source_pipeline, gv_core::NullPipeline(0));
    }

    #[test]
    fn binds_instrumented_pipeline_when_published_for_the_active_mask() {
        let api = NullGraphicsApi::new();
        let diagnostics = DiagnosticRegistry::new();
        let (pipeline, source) = build_pipeline(2);

        source.publish(
            FeatureMask::RESOURCE_BOUNDS,
            Shared::new(InstrumentedModule {
                export_buffer_layout: ExportBufferLayout::new(0, 1024),
                handle: gv_core::NullShaderModule(9),
            }),
        );

        let combined_hash = combined_hash_for(pipeline.as_ref(), FeatureMask::RESOURCE_BOUNDS);
        pipeline.add_instrument(
            combined_hash,
            Shared::new(gv_state::InstrumentedPipeline { handle: gv_core::NullPipeline(9) }),
        );

        let mut proxy = CommandBufferProxy::begin(NullCommandBuffer::new());
        proxy.bind_pipeline(&api, &pipeline, FeatureMask::RESOURCE_BOUNDS, &diagnostics, &[], &FnvHashMap::default());

        assert!(proxy.bound_pipeline_is_instrumented());
    }

    #[test]
    fn draw_commits_pending_descriptors_once_per_bind() {
        let api = NullGraphicsApi::new();
        let diagnostics = DiagnosticRegistry::new();
        let (pipeline, _source) = build_pipeline(3);

        let command_buffer = NullCommandBuffer::new();
        let mut proxy = CommandBufferProxy::begin(command_buffer);
        proxy.bind_pipeline(&api, &pipeline, FeatureMask::empty(), &diagnostics, &[], &FnvHashMap::default());

        proxy.draw_or_dispatch(&api);
        proxy.draw_or_dispatch(&api);

        let post = proxy.end(&api);
        assert_eq!(post.read_export_counter(&api), 0);
    }

    #[test]
    fn end_reads_back_the_export_counter_recorded_at_post() {
        let api = NullGraphicsApi::new();
        let diagnostics = DiagnosticRegistry::new();
        let (pipeline, _source) = build_pipeline(4);

        let command_buffer = NullCommandBuffer::new();
        command_buffer.set_export_counter(3);
        let mut proxy = CommandBufferProxy::begin(command_buffer);
        proxy.bind_pipeline(&api, &pipeline, FeatureMask::empty(), &diagnostics, &[], &FnvHashMap::default());
        proxy.draw_or_dispatch(&api);

        let post = proxy.end(&api);
        assert_eq!(post.read_export_counter(&api), 3);
    }
}
