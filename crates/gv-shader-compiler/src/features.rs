use fnv::FnvHashMap;
use gv_core::{FeatureMask, LoopConfig, Uid};
use gv_diagnostic_registry::{DescriptorKind, DiagnosticRegistry, DiagnosticRegistryError, MessageShape};
use gv_features::{
    DescriptorArrayBoundsPass, ExportStabilityPass, ResourceBoundsPass, ResourceInitializationReadPass,
    ResourceInitializationWritePass, DESCRIPTOR_ARRAY_BOUNDS_SHAPE, EXPORT_STABILITY_SHAPE, LOOP_TERMINATION_SHAPE,
    RESOURCE_BOUNDS_SHAPE, RESOURCE_INITIALIZATION_SHAPE,
};
use gv_ir::{run_pass, Id, Module, ModuleSetup, ReflectedSource};
use gv_location_registry::LocationRegistry;

/// Stable identifiers this core's own feature passes register their
/// descriptors and push constants under. A host building its own feature
/// on top of this core would pick its own id past `RESOURCE_INITIALIZATION`.
pub mod feature_id {
    pub const RESOURCE_BOUNDS: u16 = 0;
    pub const DESCRIPTOR_ARRAY_BOUNDS: u16 = 1;
    pub const EXPORT_STABILITY: u16 = 2;
    pub const LOOP_TERMINATION: u16 = 3;
    pub const RESOURCE_INITIALIZATION: u16 = 4;
}

/// One-time allocation of message and descriptor UIDs against a
/// device-state's `DiagnosticRegistry`, for whichever bits of a
/// `FeatureMask` are enabled. Built once when validation is installed (or
/// when the host changes the active feature mask) and then reused for
/// every module `ShaderCompiler` instruments under that mask, which is why
/// this is a distinct type from the passes themselves: a pass's `new`
/// takes an already-allocated UID rather than allocating its own (see
/// `gv-features`'s design notes).
#[derive(Debug, Default)]
pub struct FeatureSet {
    mask: FeatureMask,
    resource_bounds_uid: Option<Uid>,
    descriptor_array_bounds_uid: Option<Uid>,
    descriptor_array_bounds_count_uid: Option<u32>,
    export_stability_uid: Option<Uid>,
    loop_termination_uid: Option<Uid>,
    loop_termination_flag_uid: Option<u32>,
    resource_initialization_uid: Option<Uid>,
    resource_initialization_mask_uid: Option<u32>,
}

impl FeatureSet {
    /// Allocates exactly one message UID per enabled feature that exports
    /// messages, and one descriptor UID per enabled feature that needs a
    /// dedicated buffer (the count buffer for array bounds, the
    /// termination flag for loop termination, the init mask for resource
    /// initialization). Bits outside `FeatureMask::KNOWN` are silently
    /// ignored: this core has no pass to register for them.
    pub fn new(diagnostics: &DiagnosticRegistry, mask: FeatureMask) -> Result<Self, DiagnosticRegistryError> {
        let mask = mask & FeatureMask::KNOWN;
        let mut set = Self { mask, ..Self::default() };

        if mask.contains(FeatureMask::RESOURCE_BOUNDS) {
            set.resource_bounds_uid = Some(diagnostics.allocate_message_uid()?);
        }
        if mask.contains(FeatureMask::DESCRIPTOR_ARRAY_BOUNDS) {
            set.descriptor_array_bounds_uid = Some(diagnostics.allocate_message_uid()?);
            set.descriptor_array_bounds_count_uid =
                Some(diagnostics.allocate_descriptor_uid(feature_id::DESCRIPTOR_ARRAY_BOUNDS, DescriptorKind::StorageBuffer));
        }
        if mask.contains(FeatureMask::EXPORT_STABILITY) {
            set.export_stability_uid = Some(diagnostics.allocate_message_uid()?);
        }
        if mask.contains(FeatureMask::LOOP_TERMINATION) {
            set.loop_termination_uid = Some(diagnostics.allocate_message_uid()?);
            set.loop_termination_flag_uid =
                Some(diagnostics.allocate_descriptor_uid(feature_id::LOOP_TERMINATION, DescriptorKind::StorageBuffer));
        }
        if mask.contains(FeatureMask::RESOURCE_INITIALIZATION) {
            set.resource_initialization_uid = Some(diagnostics.allocate_message_uid()?);
            set.resource_initialization_mask_uid =
                Some(diagnostics.allocate_descriptor_uid(feature_id::RESOURCE_INITIALIZATION, DescriptorKind::StorageBuffer));
        }

        Ok(set)
    }

    pub fn mask(&self) -> FeatureMask {
        self.mask
    }

    /// The `(feature id, message UID, wire shape)` triples a report bridge
    /// binds its handlers to, one per feature enabled in this set that
    /// exports messages. Built fresh from the allocated UIDs rather than
    /// cached, since it's only ever called once per `FeatureSet` lifetime
    /// (at handler-installation time).
    pub fn registered_messages(&self) -> Vec<(u16, Uid, MessageShape)> {
        let mut out = Vec::new();
        if let Some(uid) = self.resource_bounds_uid {
            out.push((feature_id::RESOURCE_BOUNDS, uid, RESOURCE_BOUNDS_SHAPE));
        }
        if let Some(uid) = self.descriptor_array_bounds_uid {
            out.push((feature_id::DESCRIPTOR_ARRAY_BOUNDS, uid, DESCRIPTOR_ARRAY_BOUNDS_SHAPE));
        }
        if let Some(uid) = self.export_stability_uid {
            out.push((feature_id::EXPORT_STABILITY, uid, EXPORT_STABILITY_SHAPE));
        }
        if let Some(uid) = self.loop_termination_uid {
            out.push((feature_id::LOOP_TERMINATION, uid, LOOP_TERMINATION_SHAPE));
        }
        if let Some(uid) = self.resource_initialization_uid {
            out.push((feature_id::RESOURCE_INITIALIZATION, uid, RESOURCE_INITIALIZATION_SHAPE));
        }
        out
    }

    /// Drives every enabled pass over `module`, in `gv-ir`'s own
    /// declaration order. `resource_puids` and `loop_config` are only
    /// consulted by the features that need them; an empty map or a default
    /// config is harmless when the corresponding mask bit is unset, since
    /// the pass that would read it never runs.
    pub fn instrument(
        &self,
        module: &mut Module,
        setup: &ModuleSetup,
        resource_puids: &FnvHashMap<Id, u32>,
        loop_config: &LoopConfig,
        initialization_detail: bool,
        location_registry: &LocationRegistry,
        reflected_source: &ReflectedSource,
    ) {
        let export_buffer = setup.export_buffer_variable;
        let export_capacity = setup.export_buffer_layout.capacity_dwords;

        if let Some(uid) = self.resource_bounds_uid {
            run_pass(
                module,
                &mut ResourceBoundsPass::new(uid, export_buffer, export_capacity, location_registry, reflected_source),
            );
        }

        if let Some(uid) = self.descriptor_array_bounds_uid {
            let count_uid = self.descriptor_array_bounds_count_uid.expect("count descriptor allocated alongside message uid");
            let count_buffer = setup.descriptor_variables[&count_uid].0;
            run_pass(module, &mut DescriptorArrayBoundsPass::new(uid, count_buffer, export_buffer, export_capacity));
        }

        if let Some(uid) = self.export_stability_uid {
            run_pass(module, &mut ExportStabilityPass::new(uid, export_buffer, export_capacity));
        }

        if let Some(mask_uid) = self.resource_initialization_mask_uid {
            let mask_buffer = setup.descriptor_variables[&mask_uid].0;
            run_pass(module, &mut ResourceInitializationWritePass::new(mask_buffer, resource_puids.clone()));
            let uid = self.resource_initialization_uid.expect("message uid allocated alongside mask descriptor");
            run_pass(
                module,
                &mut ResourceInitializationReadPass::new(
                    uid,
                    mask_buffer,
                    export_buffer,
                    export_capacity,
                    resource_puids.clone(),
                    initialization_detail,
                ),
            );
        }

        if let Some(uid) = self.loop_termination_uid {
            let flag_uid = self.loop_termination_flag_uid.expect("flag descriptor allocated alongside message uid");
            let flag_buffer = setup.descriptor_variables[&flag_uid].0;
            let function_ids: Vec<Id> = module.functions.iter().map(|f| f.id).collect();
            for function in function_ids {
                gv_features::instrument_loop_termination(module, function, uid, flag_buffer, export_buffer, export_capacity, loop_config);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_messages_lists_one_entry_per_enabled_feature() {
        let diagnostics = DiagnosticRegistry::new();
        let mask = FeatureMask::RESOURCE_BOUNDS | FeatureMask::LOOP_TERMINATION;
        let set = FeatureSet::new(&diagnostics, mask).unwrap();

        let mut registered: Vec<u16> = set.registered_messages().into_iter().map(|(id, _, _)| id).collect();
        registered.sort_unstable();

        assert_eq!(registered, vec![feature_id::RESOURCE_BOUNDS, feature_id::LOOP_TERMINATION]);
    }

    #[test]
    fn registered_messages_is_empty_when_mask_is_empty() {
        let diagnostics = DiagnosticRegistry::new();
        let set = FeatureSet::new(&diagnostics, FeatureMask::empty()).unwrap();
        assert!(set.registered_messages().is_empty());
    }
}
