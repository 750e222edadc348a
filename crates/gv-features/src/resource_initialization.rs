use fnv::FnvHashMap;
use gv_core::Uid;
use gv_diagnostic_registry::MessageShape;
use gv_ir::{Id, InnerGuard, Instruction, Module, RewritePass, RewriteShape, SourceLocation, TypeKind};

use crate::export::{self, opcode};

pub const MESSAGE_SHAPE: MessageShape = MessageShape::Chunked { chunk_dword_counts: &[1] };

/// Marks a resource's slot in the init-mask buffer on every write. No branch,
/// no diagnostic: just an `AtomicOr` appended right after the write.
///
/// `resource_puids` maps a descriptor's global-variable id to the packed
/// token identifying its mask slot; resolving through an intervening access
/// chain (partial writes into a sub-range of a resource) isn't attempted,
/// matching this pass's whole-resource granularity.
pub struct ResourceInitializationWritePass {
    mask_buffer: Id,
    resource_puids: FnvHashMap<Id, u32>,
}

impl ResourceInitializationWritePass {
    pub fn new(mask_buffer: Id, resource_puids: FnvHashMap<Id, u32>) -> Self {
        Self { mask_buffer, resource_puids }
    }

    fn resource_of(inst: &Instruction) -> Option<Id> {
        match inst {
            Instruction::Store { pointer, .. } => Some(*pointer),
            Instruction::ImageWrite { image, .. } => Some(*image),
            _ => None,
        }
    }
}

impl RewritePass for ResourceInitializationWritePass {
    fn name(&self) -> &'static str {
        "resource_initialization_write"
    }

    fn interesting(&self, _module: &Module, inst: &Instruction) -> bool {
        Self::resource_of(inst).map_or(false, |id| self.resource_puids.contains_key(&id))
    }

    fn build(&mut self, module: &mut Module, inst: &Instruction, _location: Option<&SourceLocation>) -> RewriteShape {
        let resource = Self::resource_of(inst).expect("interesting() only accepts resources in resource_puids");
        let puid = self.resource_puids[&resource];

        let uint_ty = module.intern_type(TypeKind::Int { signed: false, width: 32 });

        let slot_const = module.ids.fresh();
        let slot_ptr = module.ids.fresh();
        let one = module.ids.fresh();
        let mark = module.ids.fresh();
        let insert = vec![
            Instruction::ConstantU32 { result: slot_const, result_type: uint_ty, value: puid },
            Instruction::AccessChain {
                result: slot_ptr,
                result_type: uint_ty,
                base: self.mask_buffer,
                indices: smallvec::smallvec![slot_const],
            },
            Instruction::ConstantU32 { result: one, result_type: uint_ty, value: 1 },
            Instruction::AtomicOr { result: mark, result_type: uint_ty, pointer: slot_ptr, value: one },
        ];

        RewriteShape::Insert(insert)
    }
}

/// Guards `Load`/`ImageRead` of a tracked resource against a missing
/// init-mask bit: `AtomicLoad`s the mask slot, compares against the
/// resource's bit, and exports `UninitializedResource` on a miss. The read
/// itself always executes.
pub struct ResourceInitializationReadPass {
    uid: Uid,
    mask_buffer: Id,
    export_buffer: Id,
    export_capacity_dwords: u32,
    resource_puids: FnvHashMap<Id, u32>,
    initialization_detail: bool,
}

impl ResourceInitializationReadPass {
    pub fn new(
        uid: Uid,
        mask_buffer: Id,
        export_buffer: Id,
        export_capacity_dwords: u32,
        resource_puids: FnvHashMap<Id, u32>,
        initialization_detail: bool,
    ) -> Self {
        Self {
            uid,
            mask_buffer,
            export_buffer,
            export_capacity_dwords,
            resource_puids,
            initialization_detail,
        }
    }

    fn resource_of(inst: &Instruction) -> Option<Id> {
        match inst {
            Instruction::Load { pointer, .. } => Some(*pointer),
            Instruction::ImageRead { image, .. } => Some(*image),
            Instruction::ImageFetch { image, .. } => Some(*image),
            _ => None,
        }
    }
}

impl RewritePass for ResourceInitializationReadPass {
    fn name(&self) -> &'static str {
        "resource_initialization_read"
    }

    fn interesting(&self, _module: &Module, inst: &Instruction) -> bool {
        Self::resource_of(inst).map_or(false, |id| self.resource_puids.contains_key(&id))
    }

    fn build(&mut self, module: &mut Module, inst: &Instruction, _location: Option<&SourceLocation>) -> RewriteShape {
        let resource = Self::resource_of(inst).expect("interesting() only accepts resources in resource_puids");
        let puid = self.resource_puids[&resource];

        let uint_ty = module.intern_type(TypeKind::Int { signed: false, width: 32 });
        let bool_ty = module.intern_type(TypeKind::Bool);

        let slot_const = module.ids.fresh();
        let slot_ptr = module.ids.fresh();
        let mask = module.ids.fresh();
        let bit_const = module.ids.fresh();
        let mut check = vec![
            Instruction::ConstantU32 { result: slot_const, result_type: uint_ty, value: puid },
            Instruction::AccessChain {
                result: slot_ptr,
                result_type: uint_ty,
                base: self.mask_buffer,
                indices: smallvec::smallvec![slot_const],
            },
            Instruction::AtomicLoad { result: mask, result_type: uint_ty, pointer: slot_ptr },
            Instruction::ConstantU32 { result: bit_const, result_type: uint_ty, value: 1 },
        ];
        let masked = export::binary_op(module, opcode::BITWISE_AND, uint_ty, mask, bit_const, &mut check);

        let zero = module.ids.fresh();
        check.push(Instruction::ConstantU32 { result: zero, result_type: uint_ty, value: 0 });
        let check_cond = export::binary_op(module, opcode::I_EQUAL, bool_ty, masked, zero, &mut check);

        // `MESSAGE_SHAPE`'s chunk presence bit must mirror `initialization_detail`
        // exactly, or the diagnostic registry's `message_dword_count` disagrees
        // with how many words this pass actually writes.
        let word0_value = if self.initialization_detail {
            export::pack_single_chunk_header(self.uid, 0)
        } else {
            self.uid as u32
        };
        let word0 = module.ids.fresh();
        let mut error = vec![Instruction::ConstantU32 { result: word0, result_type: uint_ty, value: word0_value }];

        let payload: Vec<Id> = if self.initialization_detail {
            let puid_word = module.ids.fresh();
            error.push(Instruction::ConstantU32 { result: puid_word, result_type: uint_ty, value: puid });
            vec![word0, puid_word]
        } else {
            vec![word0]
        };
        let guarded = export::emit(module, self.export_buffer, uint_ty, self.export_capacity_dwords, &payload);

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
