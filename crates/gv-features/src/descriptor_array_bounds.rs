use gv_core::Uid;
use gv_diagnostic_registry::MessageShape;
use gv_ir::{GuardedRewrite, Id, InnerGuard, Instruction, Module, RewritePass, RewriteShape, SourceLocation, TypeKind};

use crate::export::{self, opcode};

pub const MESSAGE_SHAPE: MessageShape = MessageShape::Simple;

/// Guards `AccessChain`s rooted at a `RuntimeArray`-typed descriptor: fetches
/// the array's registered length from its per-set count buffer, compares
/// the chain's leading index, and on a miss substitutes index `0` in a
/// shadow access chain before exporting a `DescriptorArrayBounds` message.
///
/// Instrumenting the access chain itself (rather than the `Load` that
/// consumes its result) lets the usual φ machinery carry the substitution:
/// the chain's result is a pointer, and whichever `Load` reads it downstream
/// is untouched — it just ends up reading through the φ'd pointer.
pub struct DescriptorArrayBoundsPass {
    uid: Uid,
    count_buffer: Id,
    export_buffer: Id,
    export_capacity_dwords: u32,
}

impl DescriptorArrayBoundsPass {
    pub fn new(uid: Uid, count_buffer: Id, export_buffer: Id, export_capacity_dwords: u32) -> Self {
        Self {
            uid,
            count_buffer,
            export_buffer,
            export_capacity_dwords,
        }
    }

    fn targets_runtime_array(module: &Module, base: Id) -> bool {
        let pointer_ty = module.global_variables.iter().find_map(|inst| match inst {
            Instruction::Variable { result, result_type, .. } if *result == base => Some(*result_type),
            _ => None,
        });
        let Some(pointer_ty) = pointer_ty else { return false };

        let pointee = module.types.declarations().iter().find_map(|(id, kind)| match kind {
            TypeKind::Pointer { pointee, .. } if *id == pointer_ty => Some(*pointee),
            _ => None,
        });
        let Some(pointee) = pointee else { return false };

        module
            .types
            .declarations()
            .iter()
            .any(|(id, kind)| *id == pointee && matches!(kind, TypeKind::RuntimeArray { .. }))
    }
}

impl RewritePass for DescriptorArrayBoundsPass {
    fn name(&self) -> &'static str {
        "descriptor_array_bounds"
    }

    fn interesting(&self, module: &Module, inst: &Instruction) -> bool {
        matches!(inst, Instruction::AccessChain { base, .. } if Self::targets_runtime_array(module, *base))
    }

    fn build(&mut self, module: &mut Module, inst: &Instruction, _location: Option<&SourceLocation>) -> RewriteShape {
        let Instruction::AccessChain { result_type, base, indices, .. } = inst else {
            unreachable!("interesting() only accepts access chains");
        };
        let (result_type, base, indices) = (*result_type, *base, indices.clone());
        let leading_index = indices[0];

        let uint_ty = module.intern_type(TypeKind::Int { signed: false, width: 32 });
        let bool_ty = module.intern_type(TypeKind::Bool);

        let binding_const = module.ids.fresh();
        let length = module.ids.fresh();
        let mut check = vec![
            Instruction::ConstantU32 { result: binding_const, result_type: uint_ty, value: 0 },
            Instruction::ImageFetch {
                result: length,
                result_type: uint_ty,
                image: self.count_buffer,
                coordinate: binding_const,
            },
        ];
        let check_cond = export::binary_op(module, opcode::U_GREATER_THAN_EQUAL, bool_ty, leading_index, length, &mut check);

        let zero = module.ids.fresh();
        let mut shadow_indices = indices.clone();
        shadow_indices[0] = zero;
        let neutral_ptr = module.ids.fresh();

        let word0 = module.ids.fresh();
        let error = vec![
            Instruction::ConstantU32 { result: zero, result_type: uint_ty, value: 0 },
            Instruction::AccessChain {
                result: neutral_ptr,
                result_type,
                base,
                indices: shadow_indices,
            },
            Instruction::ConstantU32 {
                result: word0,
                result_type: uint_ty,
                value: self.uid as u32,
            },
        ];
        let guarded = export::emit(module, self.export_buffer, uint_ty, self.export_capacity_dwords, &[word0]);

        RewriteShape::Guard(GuardedRewrite {
            check,
            check_cond,
            offending_extra: Vec::new(),
            error,
            neutral_result: Some(neutral_ptr),
            inner_guard: Some(InnerGuard {
                check: guarded.check,
                check_cond: guarded.check_cond,
                inner: guarded.writes,
            }),
        })
    }
}
