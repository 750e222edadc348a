use fnv::FnvHashMap;

use gv_diagnostic_registry::{DescriptorKind, DiagnosticRegistry};
use gv_export::ExportBufferLayout;
use gv_location_registry::{ExtractGuid, FileUid, LocationRegistry};

use crate::ids::Id;
use crate::inst::Instruction;
use crate::module::{Capability, Module};
use crate::types::{StorageClass, TypeKind};

/// Maps the IR's own per-module file indices (the order in which its
/// source-debug instructions name files) onto the location registry's file
/// UIDs, so later extract lookups never redo the path-based dedup.
#[derive(Debug, Default)]
pub struct ReflectedSource {
    file_uids: FnvHashMap<u32, FileUid>,
}

impl ReflectedSource {
    /// Registers `preprocessed_source` with the registry and records the
    /// returned virtual files against the IR's own file indices, which are
    /// assumed to match the registry's discovery order.
    pub fn reflect(registry: &LocationRegistry, module_name: &str, module_path: &str, preprocessed_source: &str) -> Self {
        let mappings = registry.register_source_extract(module_name, module_path, preprocessed_source);
        let file_uids = mappings
            .into_iter()
            .enumerate()
            .map(|(internal_file_id, file)| (internal_file_id as u32, file.file_uid))
            .collect();
        Self { file_uids }
    }

    /// Resolves one source instruction's `(internal file id, function,
    /// line, column)` to an extract GUID, registering a new extract if this
    /// exact location hasn't been seen before.
    pub fn extract_for(
        &self,
        registry: &LocationRegistry,
        internal_file_id: u32,
        function_name: Option<&str>,
        line: u32,
        column: u32,
    ) -> Option<ExtractGuid> {
        let file_uid = *self.file_uids.get(&internal_file_id)?;
        registry.register_line_extract(file_uid, function_name, line, column).ok()
    }
}

/// Result of the module-level setup that runs once per module before any
/// feature pass visits a block.
pub struct ModuleSetup {
    pub push_constant_pointer: Id,
    /// Descriptor UID (from the diagnostic registry) to the global variable
    /// declared for it, plus its assigned binding.
    pub descriptor_variables: FnvHashMap<u32, (Id, u32)>,
    pub export_buffer_variable: Id,
    pub export_buffer_layout: ExportBufferLayout,
}

impl ModuleSetup {
    /// Runs steps 2-5 of the module-level work: capabilities, the merged
    /// push-constant block, per-feature descriptors, and the export buffer
    /// declaration. Step 1 (source-debug reflection) is driven separately
    /// through [`ReflectedSource::reflect`], since it happens per source
    /// instruction rather than once.
    pub fn run(module: &mut Module, diagnostics: &DiagnosticRegistry, last_known_set: u32, last_known_binding: u32, export_capacity_dwords: u32) -> Self {
        require_capabilities(module);
        let push_constant_pointer = merge_push_constants(module, diagnostics);
        let descriptor_variables = build_descriptors(module, diagnostics, last_known_binding);
        let export_buffer_layout = ExportBufferLayout::new(last_known_set, export_capacity_dwords);
        let export_buffer_variable = declare_export_buffer(module);

        Self {
            push_constant_pointer,
            descriptor_variables,
            export_buffer_variable,
            export_buffer_layout,
        }
    }
}

fn require_capabilities(module: &mut Module) {
    module.require_capability(Capability::ImageQuery);
    module.require_capability(Capability::ShaderAtomicCounter);
    module.require_capability(Capability::StorageBufferStorageClass);
    module.require_ext_inst_import("GLSL.std.450");
}

/// Appends one struct member per feature's declared push-constant to the
/// source module's existing push-constant block, or builds one from
/// scratch if none exists. The existing variable's id is kept stable and
/// only retyped, so every access chain rooted at it keeps working against
/// the widened layout without a module-wide use rewrite.
fn merge_push_constants(module: &mut Module, diagnostics: &DiagnosticRegistry) -> Id {
    let declared = diagnostics.enumerate_push_constants();

    let existing_pointee = module.types.declarations().iter().find_map(|(id, kind)| match kind {
        TypeKind::Pointer {
            pointee,
            storage_class: StorageClass::PushConstant,
        } => Some((*id, *pointee)),
        _ => None,
    });

    let mut members: Vec<Id> = existing_pointee
        .and_then(|(_, pointee)| {
            module
                .types
                .declarations()
                .iter()
                .find(|(id, _)| *id == pointee)
                .and_then(|(_, kind)| match kind {
                    TypeKind::Struct { members } => Some(members.clone()),
                    _ => None,
                })
        })
        .unwrap_or_default();

    let uint_ty = module.intern_type(TypeKind::Int { signed: false, width: 32 });
    for decl in &declared {
        let words = (decl.size_bytes + 3) / 4;
        members.extend(std::iter::repeat(uint_ty).take(words.max(1) as usize));
    }

    let struct_ty = module.intern_type(TypeKind::Struct { members });
    let pointer_ty = module.intern_type(TypeKind::Pointer {
        pointee: struct_ty,
        storage_class: StorageClass::PushConstant,
    });

    let existing_variable = module.global_variables.iter_mut().find(|inst| {
        matches!(
            inst,
            Instruction::Variable {
                storage_class: StorageClass::PushConstant,
                ..
            }
        )
    });

    match existing_variable {
        Some(Instruction::Variable { result_type, .. }) => {
            *result_type = pointer_ty;
        }
        _ => {
            let result = module.ids.fresh();
            module.global_variables.push(Instruction::Variable {
                result,
                result_type: pointer_ty,
                storage_class: StorageClass::PushConstant,
            });
        }
    }

    pointer_ty
}

/// One global variable per feature-declared descriptor, assigned bindings
/// starting one past the highest binding the source pipeline already uses.
fn build_descriptors(module: &mut Module, diagnostics: &DiagnosticRegistry, last_known_binding: u32) -> FnvHashMap<u32, (Id, u32)> {
    let uint_ty = module.intern_type(TypeKind::Int { signed: false, width: 32 });
    let mut next_binding = last_known_binding + 1;
    let mut variables = FnvHashMap::default();

    for decl in diagnostics.enumerate_descriptors() {
        let (pointee, storage_class) = match decl.kind {
            DescriptorKind::StorageBuffer => (TypeKind::RuntimeArray { element: uint_ty }, StorageClass::StorageBuffer),
            DescriptorKind::UniformBuffer => (TypeKind::Struct { members: vec![uint_ty] }, StorageClass::Uniform),
            DescriptorKind::StorageImage | DescriptorKind::SampledImage => (TypeKind::Image, StorageClass::UniformConstant),
        };
        let pointee_ty = module.intern_type(pointee);
        let pointer_ty = module.intern_type(TypeKind::Pointer {
            pointee: pointee_ty,
            storage_class,
        });

        let result = module.ids.fresh();
        module.global_variables.push(Instruction::Variable {
            result,
            result_type: pointer_ty,
            storage_class,
        });

        let binding = next_binding;
        next_binding += 1;
        variables.insert(decl.uid, (result, binding));
    }

    variables
}

/// Declares the shader-export buffer: a single atomic counter dword
/// followed by the runtime-sized payload array, as a storage-buffer-class
/// global.
fn declare_export_buffer(module: &mut Module) -> Id {
    let uint_ty = module.intern_type(TypeKind::Int { signed: false, width: 32 });
    let payload_ty = module.intern_type(TypeKind::RuntimeArray { element: uint_ty });
    let struct_ty = module.intern_type(TypeKind::Struct {
        members: vec![uint_ty, payload_ty],
    });
    let pointer_ty = module.intern_type(TypeKind::Pointer {
        pointee: struct_ty,
        storage_class: StorageClass::StorageBuffer,
    });

    let result = module.ids.fresh();
    module.global_variables.push(Instruction::Variable {
        result,
        result_type: pointer_ty,
        storage_class: StorageClass::StorageBuffer,
    });

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use gv_diagnostic_registry::DiagnosticRegistry;

    #[test]
    fn merging_push_constants_retypes_existing_variable_in_place() {
        let mut module = Module::new(Id(1), 10);
        let existing_member = module.intern_type(TypeKind::Int { signed: false, width: 32 });
        let existing_struct = module.intern_type(TypeKind::Struct {
            members: vec![existing_member],
        });
        let existing_pointer = module.intern_type(TypeKind::Pointer {
            pointee: existing_struct,
            storage_class: StorageClass::PushConstant,
        });
        let existing_var = module.ids.fresh();
        module.global_variables.push(Instruction::Variable {
            result: existing_var,
            result_type: existing_pointer,
            storage_class: StorageClass::PushConstant,
        });

        let diagnostics = DiagnosticRegistry::new();
        diagnostics.allocate_push_constant_uid(0, 4);

        let new_pointer = merge_push_constants(&mut module, &diagnostics);
        assert_ne!(new_pointer, existing_pointer);

        match &module.global_variables[0] {
            Instruction::Variable { result, result_type, .. } => {
                assert_eq!(*result, existing_var);
                assert_eq!(*result_type, new_pointer);
            }
            other => panic!("unexpected instruction: {other:?}"),
        }
    }

    #[test]
    fn descriptor_bindings_start_past_last_known_binding() {
        let mut module = Module::new(Id(1), 10);
        let diagnostics = DiagnosticRegistry::new();
        let uid_a = diagnostics.allocate_descriptor_uid(0, DescriptorKind::StorageBuffer);
        let uid_b = diagnostics.allocate_descriptor_uid(1, DescriptorKind::SampledImage);

        let variables = build_descriptors(&mut module, &diagnostics, 7);
        assert_eq!(variables[&uid_a].1, 8);
        assert_eq!(variables[&uid_b].1, 9);
    }

    #[test]
    fn run_declares_export_buffer_one_set_past_last_known() {
        let mut module = Module::new(Id(1), 10);
        let diagnostics = DiagnosticRegistry::new();
        let setup = ModuleSetup::run(&mut module, &diagnostics, 2, 0, 1024);
        assert_eq!(setup.export_buffer_layout.set, 3);
        assert!(module.capabilities.contains(&Capability::ImageQuery));
    }
}
