//! Process-wide state tables for application-visible shader-module and
//! pipeline handles. Each table is a [`SlotTable`], reference-counted so a
//! state object outlives both the application's release of its handle and
//! any in-flight compilation job still holding a clone.

mod pipeline;
mod shader_module;
mod slot_table;

pub use pipeline::{InstrumentedPipeline, PipelineState};
pub use shader_module::ShaderModuleState;
pub use slot_table::{SlotTable, Slotted};

use gv_core::GraphicsApi;

/// The two process-wide tables, bundled for convenience: most call sites
/// (install, `CreateShaderModule`, `CreatePipeline`) need both.
pub struct StateTables<G: GraphicsApi> {
    pub shader_modules: SlotTable<ShaderModuleState<G>>,
    pub pipelines: SlotTable<PipelineState<G>>,
}

impl<G: GraphicsApi> Default for StateTables<G> {
    fn default() -> Self {
        Self {
            shader_modules: SlotTable::new(),
            pipelines: SlotTable::new(),
        }
    }
}

impl<G: GraphicsApi> StateTables<G> {
    pub fn new() -> Self {
        Self::default()
    }
}
