use fnv::FnvHashMap;
use gv_core::{FeatureMask, GraphicsApi, Shared, SourceHash};
use gv_export::ExportBufferLayout;
use gv_ir::{Module, ReflectedSource};
use gv_location_registry::LocationRegistry;
use parking_lot::Mutex;

/// One shader-dialect's worth of handle and export-buffer placement, built
/// once per `(source, feature mask)` pair.
pub struct InstrumentedModule<G: GraphicsApi> {
    pub export_buffer_layout: ExportBufferLayout,
    pub handle: G::ShaderModule,
}

/// A shader module as originally submitted by the application, plus every
/// instrumented variant built from it so far. `pristine` is never mutated
/// after construction; each build clones it before rewriting, matching the
/// "never mutate the shared copy" discipline `gv-pipeline-compiler`'s
/// deep-copy step follows for creation descriptors.
pub struct SourceModule<G: GraphicsApi> {
    pub source_hash: SourceHash,
    pub(crate) pristine: Module,
    pub(crate) last_known_set: u32,
    pub(crate) last_known_binding: u32,
    /// Reflected once against the device's location registry at
    /// construction time, so every later `build()` can resolve a
    /// per-instruction extract-GUID without re-registering this module's
    /// source.
    pub(crate) reflected_source: ReflectedSource,
    instrumented: Mutex<FnvHashMap<FeatureMask, Shared<InstrumentedModule<G>>>>,
}

impl<G: GraphicsApi> SourceModule<G> {
    pub fn new(
        source_hash: SourceHash,
        pristine: Module,
        last_known_set: u32,
        last_known_binding: u32,
        location_registry: &LocationRegistry,
        module_name: &str,
        module_path: &str,
        preprocessed_source: &str,
    ) -> Shared<Self> {
        let reflected_source = ReflectedSource::reflect(location_registry, module_name, module_path, preprocessed_source);
        Shared::new(Self {
            source_hash,
            pristine,
            last_known_set,
            last_known_binding,
            reflected_source,
            instrumented: Mutex::new(FnvHashMap::default()),
        })
    }

    /// `GetInstrument(key)`.
    pub fn get_instrument(&self, mask: FeatureMask) -> Option<Shared<InstrumentedModule<G>>> {
        self.instrumented.lock().get(&mask).cloned()
    }

    /// `AddInstrument(key, variant)`. Overwrites a prior build for the same
    /// mask, if any — callers only ever publish the result of a fresh
    /// rewrite, never a partial one. Exposed beyond this crate so a test
    /// (or a host preloading a precompiled variant) can seed the cache
    /// without going through a real compile job.
    pub fn publish(&self, mask: FeatureMask, instrumented: Shared<InstrumentedModule<G>>) {
        self.instrumented.lock().insert(mask, instrumented);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gv_core::NullGraphicsApi;
    use gv_ir::Id;

    #[test]
    fn get_instrument_is_none_until_published() {
        let module = Module::new(Id(1), 10);
        let registry = LocationRegistry::new(false);
        let source: Shared<SourceModule<NullGraphicsApi>> =
            SourceModule::new(SourceHash(1), module, 0, 0, &registry, "test", "test.hlsl", "");
        assert!(source.get_instrument(FeatureMask::RESOURCE_BOUNDS).is_none());

        source.publish(
            FeatureMask::RESOURCE_BOUNDS,
            Shared::new(InstrumentedModule {
                export_buffer_layout: ExportBufferLayout::new(0, 1024),
                handle: gv_core::NullShaderModule(0),
            }),
        );
        assert!(source.get_instrument(FeatureMask::RESOURCE_BOUNDS).is_some());
        assert!(source.get_instrument(FeatureMask::EXPORT_STABILITY).is_none());
    }
}
