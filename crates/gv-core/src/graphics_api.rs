use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use parking_lot::Mutex;

use crate::PipelineKind;

bitflags! {
    /// Which groups of per-command-buffer descriptor state the proxy has
    /// pending writes for, accumulated between `BindPipeline`/`Draw`/
    /// `Dispatch` calls and flushed in one `commit_descriptor_updates` call.
    #[derive(Default)]
    pub struct DirtyDescriptors: u8 {
        const EXPORT_BUFFER      = 1 << 0;
        const FEATURE_RESOURCES  = 1 << 1;
        const PRMT               = 1 << 2;
    }
}

/// The graphics-API surface the compilers and command-buffer proxy drive.
/// Raw entry-point interception is out of scope for this core, so every
/// consumer is generic over (or holds a boxed) implementation of this trait
/// instead of calling a concrete backend directly. A `vulkan` feature on
/// `gv-state` gates a concrete `ash`-backed implementation; `NullGraphicsApi`
/// here is the test double used everywhere else.
pub trait GraphicsApi: Send + Sync + 'static {
    type ShaderModule: Send + Sync;
    type Pipeline: Send + Sync;
    /// The host's own pipeline/stream creation-descriptor type. Cloned once
    /// per pipeline-compile job (`gv-pipeline-compiler`'s deep-copy step)
    /// before any stage substitution, so the stored source descriptor is
    /// never mutated.
    type CreationDescriptor: Clone + Send + Sync;
    /// The host's own command-buffer handle, as passed into the command
    /// proxy's `begin`/`bind_pipeline`/`end` calls.
    type CommandBuffer: Send + Sync;
    /// The follow-up command buffer `end` records to read the export
    /// counter back into host memory once its fence has signaled.
    type PostCommandBuffer: Send + Sync;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Allocates the export buffer (sized `export_buffer_capacity` dwords)
    /// and the PRMT, once, at install time. The only two failures this
    /// trait's caller ever turns into a hard abort: every other method here
    /// degrades validation coverage on error instead.
    fn allocate_validation_resources(&self, export_buffer_capacity: u32) -> Result<(), Self::Error>;

    /// Creates a dialect-native shader module object from instrumented
    /// bytecode. Called once per successfully rewritten `(source, feature
    /// mask)` pair.
    fn create_shader_module(&self, bytecode: &[u8]) -> Result<Self::ShaderModule, Self::Error>;

    /// Builds a pipeline object from a (possibly stage-substituted)
    /// creation descriptor. Called both for the initial source pipeline and
    /// for every instrumented variant `gv-pipeline-compiler` builds.
    fn create_pipeline(&self, kind: PipelineKind, descriptor: &Self::CreationDescriptor) -> Result<Self::Pipeline, Self::Error>;

    /// Overrides stage `stage_index`'s shader-module handle on a deep copy
    /// of a creation descriptor, in place. On pipeline-library-using
    /// dialects (DX12 stream objects) this is also where the sub-object
    /// stream gets rewritten; this core has no structural knowledge of any
    /// dialect's descriptor layout, so every dialect backend implements
    /// this itself.
    fn substitute_stage(&self, descriptor: &mut Self::CreationDescriptor, stage_index: usize, shader_module: &Self::ShaderModule);

    /// Binds `pipeline` on `command_buffer` in place of whatever the
    /// application itself bound, called once per `BindPipeline` the proxy
    /// intercepts.
    fn bind_pipeline(&self, command_buffer: &Self::CommandBuffer, pipeline: &Self::Pipeline);

    /// (Re-)pushes the merged push-constant block the IR rewriter laid out,
    /// called immediately after `bind_pipeline` when the bound variant
    /// changed.
    fn push_constants(&self, command_buffer: &Self::CommandBuffer, data: &[u8]);

    /// Flushes whichever descriptor groups `dirty` names — the export
    /// buffer, per-feature resources, and/or the PRMT — onto
    /// `command_buffer`. Called at each `Draw`/`Dispatch`; a host backend
    /// with nothing dirty for a given group is expected to no-op it.
    fn commit_descriptor_updates(&self, command_buffer: &Self::CommandBuffer, dirty: DirtyDescriptors);

    /// Records the "post" command buffer at `End` that reads the export
    /// counter back into host memory once submitted and fenced.
    fn record_post_command_buffer(&self, command_buffer: &Self::CommandBuffer) -> Self::PostCommandBuffer;

    /// Reads back the export counter recorded by a prior
    /// `record_post_command_buffer` call, after its queue submission fence
    /// has signaled.
    fn read_export_counter(&self, post: &Self::PostCommandBuffer) -> u32;

    /// Stages, through whatever dedicated compute program the dialect
    /// backend uses, a write of the per-submission termination flag at
    /// `slot`. Called by the heart-beat thread when it decides a tracked
    /// submission has stalled.
    fn signal_submission_termination(&self, slot: u32);
}

/// A `GraphicsApi` that never touches a real device: shader modules and
/// pipelines are just sequence numbers, and its creation descriptor is an
/// opaque byte blob. Lets the compilers and proxy be exercised in tests
/// without a GPU/driver. Its state lives behind an `Arc` so the handle
/// itself is cheap to clone, matching a real backend's device handle.
#[derive(Debug, Default, Clone)]
pub struct NullGraphicsApi(crate::Shared<NullGraphicsApiInner>);

#[derive(Debug, Default)]
struct NullGraphicsApiInner {
    next_module_id: AtomicU64,
    next_pipeline_id: AtomicU64,
    signalled_slots: Mutex<Vec<u32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullShaderModule(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullPipeline(pub u64);

/// Records everything a test might want to assert about what the proxy did
/// to a command buffer: the last bound pipeline, the last pushed constant
/// block, which descriptor groups were committed, and a test-settable
/// export counter `end` reads back.
#[derive(Debug, Default)]
pub struct NullCommandBuffer {
    state: Mutex<NullCommandBufferState>,
}

#[derive(Debug, Default)]
struct NullCommandBufferState {
    bound_pipeline: Option<NullPipeline>,
    push_constants: Vec<u8>,
    committed: DirtyDescriptors,
    export_counter: u32,
}

impl NullCommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bound_pipeline(&self) -> Option<NullPipeline> {
        self.state.lock().bound_pipeline
    }

    pub fn pushed_constants(&self) -> Vec<u8> {
        self.state.lock().push_constants.clone()
    }

    pub fn committed_descriptors(&self) -> DirtyDescriptors {
        self.state.lock().committed
    }

    /// Lets a test simulate the GPU having written `value` export messages
    /// before the proxy's `End` reads the counter back.
    pub fn set_export_counter(&self, value: u32) {
        self.state.lock().export_counter = value;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullPostCommandBuffer(pub u32);

impl NullGraphicsApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signalled_slots(&self) -> Vec<u32> {
        self.0.signalled_slots.lock().clone()
    }
}

impl GraphicsApi for NullGraphicsApi {
    type ShaderModule = NullShaderModule;
    type Pipeline = NullPipeline;
    type CreationDescriptor = Vec<u8>;
    type CommandBuffer = NullCommandBuffer;
    type PostCommandBuffer = NullPostCommandBuffer;
    type Error = std::convert::Infallible;

    fn allocate_validation_resources(&self, _export_buffer_capacity: u32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn create_shader_module(&self, _bytecode: &[u8]) -> Result<Self::ShaderModule, Self::Error> {
        Ok(NullShaderModule(self.0.next_module_id.fetch_add(1, Ordering::Relaxed)))
    }

    fn create_pipeline(&self, _kind: PipelineKind, _descriptor: &Self::CreationDescriptor) -> Result<Self::Pipeline, Self::Error> {
        Ok(NullPipeline(self.0.next_pipeline_id.fetch_add(1, Ordering::Relaxed)))
    }

    /// Stores each stage's module id as an 8-byte little-endian run at
    /// `stage_index * 8`, growing the descriptor as needed. Lets tests
    /// assert substitution actually happened without a real descriptor
    /// layout to reason about.
    fn substitute_stage(&self, descriptor: &mut Self::CreationDescriptor, stage_index: usize, shader_module: &Self::ShaderModule) {
        let offset = stage_index * 8;
        if descriptor.len() < offset + 8 {
            descriptor.resize(offset + 8, 0);
        }
        descriptor[offset..offset + 8].copy_from_slice(&shader_module.0.to_le_bytes());
    }

    fn bind_pipeline(&self, command_buffer: &Self::CommandBuffer, pipeline: &Self::Pipeline) {
        command_buffer.state.lock().bound_pipeline = Some(*pipeline);
    }

    fn push_constants(&self, command_buffer: &Self::CommandBuffer, data: &[u8]) {
        command_buffer.state.lock().push_constants = data.to_vec();
    }

    fn commit_descriptor_updates(&self, command_buffer: &Self::CommandBuffer, dirty: DirtyDescriptors) {
        command_buffer.state.lock().committed |= dirty;
    }

    fn record_post_command_buffer(&self, command_buffer: &Self::CommandBuffer) -> Self::PostCommandBuffer {
        NullPostCommandBuffer(command_buffer.state.lock().export_counter)
    }

    fn read_export_counter(&self, post: &Self::PostCommandBuffer) -> u32 {
        post.0
    }

    fn signal_submission_termination(&self, slot: u32) {
        self.0.signalled_slots.lock().push(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_graphics_api_allocates_validation_resources_without_error() {
        let api = NullGraphicsApi::new();
        assert!(api.allocate_validation_resources(1 << 20).is_ok());
    }

    #[test]
    fn null_graphics_api_hands_out_distinct_module_ids() {
        let api = NullGraphicsApi::new();
        let a = api.create_shader_module(&[1, 2, 3]).unwrap();
        let b = api.create_shader_module(&[4, 5, 6]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn null_graphics_api_hands_out_distinct_pipeline_ids() {
        let api = NullGraphicsApi::new();
        let a = api.create_pipeline(PipelineKind::Graphics, &vec![1, 2, 3]).unwrap();
        let b = api.create_pipeline(PipelineKind::Graphics, &vec![1, 2, 3]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn substitute_stage_writes_module_id_at_its_own_offset() {
        let api = NullGraphicsApi::new();
        let mut descriptor = Vec::new();
        let module = NullShaderModule(0xdead_beef);
        api.substitute_stage(&mut descriptor, 1, &module);
        assert_eq!(descriptor.len(), 16);
        assert_eq!(&descriptor[8..16], &0xdead_beef_u64.to_le_bytes());
    }

    #[test]
    fn command_buffer_records_bind_push_and_commit_calls() {
        let api = NullGraphicsApi::new();
        let command_buffer = NullCommandBuffer::new();
        let pipeline = api.create_pipeline(PipelineKind::Graphics, &vec![]).unwrap();

        api.bind_pipeline(&command_buffer, &pipeline);
        api.push_constants(&command_buffer, &[1, 2, 3, 4]);
        api.commit_descriptor_updates(&command_buffer, DirtyDescriptors::EXPORT_BUFFER | DirtyDescriptors::PRMT);

        assert_eq!(command_buffer.bound_pipeline(), Some(pipeline));
        assert_eq!(command_buffer.pushed_constants(), vec![1, 2, 3, 4]);
        assert_eq!(
            command_buffer.committed_descriptors(),
            DirtyDescriptors::EXPORT_BUFFER | DirtyDescriptors::PRMT
        );
    }

    #[test]
    fn post_command_buffer_reads_back_the_export_counter_set_before_end() {
        let api = NullGraphicsApi::new();
        let command_buffer = NullCommandBuffer::new();
        command_buffer.set_export_counter(7);

        let post = api.record_post_command_buffer(&command_buffer);
        assert_eq!(api.read_export_counter(&post), 7);
    }

    #[test]
    fn signal_submission_termination_records_the_slot() {
        let api = NullGraphicsApi::new();
        api.signal_submission_termination(3);
        api.signal_submission_termination(1);
        assert_eq!(api.signalled_slots(), vec![3, 1]);
    }

    #[test]
    fn cloned_handles_share_the_same_underlying_state() {
        let api = NullGraphicsApi::new();
        let cloned = api.clone();
        cloned.signal_submission_termination(9);
        assert_eq!(api.signalled_slots(), vec![9]);
    }
}
