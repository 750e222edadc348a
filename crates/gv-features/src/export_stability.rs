use gv_core::Uid;
use gv_diagnostic_registry::MessageShape;
use gv_ir::{Id, InnerGuard, Instruction, Module, RewritePass, RewriteShape, SourceLocation, TypeKind};

use crate::export;

pub const MESSAGE_SHAPE: MessageShape = MessageShape::Simple;

/// Checks every floating-point component written by a fragment-output
/// store or storage-image write for NaN/Inf and exports an
/// `ExportStability` message on a hit. The store/write itself always
/// happens — only the diagnostic is conditional.
pub struct ExportStabilityPass {
    uid: Uid,
    export_buffer: Id,
    export_capacity_dwords: u32,
}

impl ExportStabilityPass {
    pub fn new(uid: Uid, export_buffer: Id, export_capacity_dwords: u32) -> Self {
        Self {
            uid,
            export_buffer,
            export_capacity_dwords,
        }
    }
}

impl RewritePass for ExportStabilityPass {
    fn name(&self) -> &'static str {
        "export_stability"
    }

    fn interesting(&self, _module: &Module, inst: &Instruction) -> bool {
        matches!(inst, Instruction::Store { .. } | Instruction::ImageWrite { .. })
    }

    fn build(&mut self, module: &mut Module, inst: &Instruction, _location: Option<&SourceLocation>) -> RewriteShape {
        let value = match inst {
            Instruction::Store { object, .. } => *object,
            Instruction::ImageWrite { texel, .. } => *texel,
            _ => unreachable!("interesting() only accepts stores and image writes"),
        };

        let bool_ty = module.intern_type(TypeKind::Bool);
        let uint_ty = module.intern_type(TypeKind::Int { signed: false, width: 32 });

        let is_nan = module.ids.fresh();
        let is_inf = module.ids.fresh();
        let combined = module.ids.fresh();
        let check_cond = module.ids.fresh();
        let check = vec![
            Instruction::IsNan { result: is_nan, result_type: bool_ty, operand: value },
            Instruction::IsInf { result: is_inf, result_type: bool_ty, operand: value },
            Instruction::LogicalOr { result: combined, result_type: bool_ty, a: is_nan, b: is_inf },
            Instruction::Any { result: check_cond, result_type: bool_ty, vector: combined },
        ];

        let word0 = module.ids.fresh();
        let error = vec![Instruction::ConstantU32 {
            result: word0,
            result_type: uint_ty,
            value: self.uid as u32,
        }];
        let guarded = export::emit(module, self.export_buffer, uint_ty, self.export_capacity_dwords, &[word0]);

        RewriteShape::Unconditional {
            check,
            check_cond,
            error,
            inner_guard: Some(InnerGuard {
                check: guarded.check,
                check_cond: guarded.check_cond,
                inner: guarded.writes,
            }),
        }
    }
}
