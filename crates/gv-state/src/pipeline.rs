use std::sync::atomic::AtomicUsize;

use fnv::FnvHashMap;
use gv_core::{CombinedHash, GraphicsApi, PipelineKind, Shared};
use parking_lot::Mutex;

use crate::shader_module::ShaderModuleState;
use crate::slot_table::Slotted;

/// One pipeline variant `gv-pipeline-compiler` has successfully built
/// against a particular `CombinedHash` of stage keys.
pub struct InstrumentedPipeline<G: GraphicsApi> {
    pub handle: G::Pipeline,
}

/// The application-visible pipeline handle's backing state: its type, the
/// deep-copied creation descriptor (so it survives the application freeing
/// its own copy), the constituent shader-module states it was built from,
/// the uninstrumented source pipeline object, and a `{ combined-hash ->
/// instrumented-pipeline }` cache.
pub struct PipelineState<G: GraphicsApi> {
    slot_index: AtomicUsize,
    pub kind: PipelineKind,
    pub creation_descriptor: G::CreationDescriptor,
    pub stages: Vec<Shared<ShaderModuleState<G>>>,
    pub source_pipeline: G::Pipeline,
    instrumented: Mutex<FnvHashMap<CombinedHash, Shared<InstrumentedPipeline<G>>>>,
}

impl<G: GraphicsApi> PipelineState<G> {
    pub fn new(
        slot_index: usize,
        kind: PipelineKind,
        creation_descriptor: G::CreationDescriptor,
        stages: Vec<Shared<ShaderModuleState<G>>>,
        source_pipeline: G::Pipeline,
    ) -> Self {
        Self {
            slot_index: AtomicUsize::new(slot_index),
            kind,
            creation_descriptor,
            stages,
            source_pipeline,
            instrumented: Mutex::new(FnvHashMap::default()),
        }
    }

    /// `GetInstrument(combined_hash)`.
    pub fn get_instrument(&self, combined_hash: CombinedHash) -> Option<Shared<InstrumentedPipeline<G>>> {
        self.instrumented.lock().get(&combined_hash).cloned()
    }

    /// `AddInstrument(combined_hash, pipeline)`.
    pub fn add_instrument(&self, combined_hash: CombinedHash, pipeline: Shared<InstrumentedPipeline<G>>) {
        self.instrumented.lock().insert(combined_hash, pipeline);
    }
}

impl<G: GraphicsApi> Slotted for PipelineState<G> {
    fn slot_index(&self) -> &AtomicUsize {
        &self.slot_index
    }
}
