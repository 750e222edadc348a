use std::sync::atomic::AtomicUsize;

use gv_core::{GraphicsApi, Shared};
use gv_shader_compiler::SourceModule;
use parking_lot::Mutex;

use crate::slot_table::Slotted;

/// The application-visible shader-module handle's backing state: the raw
/// bytecode as submitted, an optional debug name, this entry's own
/// [`SlotTable`](crate::SlotTable) position, and the lazily populated
/// `{ feature-mask -> instrumented-module }` cache (`source`, owned by
/// `gv-shader-compiler` since building it is that crate's job).
pub struct ShaderModuleState<G: GraphicsApi> {
    slot_index: AtomicUsize,
    pub bytecode: Vec<u8>,
    pub debug_name: Mutex<Option<String>>,
    pub source: Shared<SourceModule<G>>,
}

impl<G: GraphicsApi> ShaderModuleState<G> {
    pub fn new(slot_index: usize, bytecode: Vec<u8>, source: Shared<SourceModule<G>>) -> Self {
        Self {
            slot_index: AtomicUsize::new(slot_index),
            bytecode,
            debug_name: Mutex::new(None),
            source,
        }
    }

    pub fn debug_name(&self) -> Option<String> {
        self.debug_name.lock().clone()
    }

    pub fn set_debug_name(&self, name: String) {
        *self.debug_name.lock() = Some(name);
    }
}

impl<G: GraphicsApi> Slotted for ShaderModuleState<G> {
    fn slot_index(&self) -> &AtomicUsize {
        &self.slot_index
    }
}
