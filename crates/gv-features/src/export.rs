use gv_ir::{Id, Instruction, Module, TypeKind};

/// Locally-defined pseudo opcodes for plain scalar arithmetic that the IR's
/// `Instruction` enum has no structural interest in — index arithmetic for
/// export-buffer slots, component comparisons for bounds checks. A dialect
/// backend substitutes its real opcode (`OpIAdd`, `OpUGreaterThanEqual`, ...)
/// when lowering `Opaque`.
pub mod opcode {
    pub const I_ADD: u32 = 0xF000_0001;
    pub const U_GREATER_THAN_EQUAL: u32 = 0xF000_0002;
    pub const BITWISE_AND: u32 = 0xF000_0003;
    pub const I_EQUAL: u32 = 0xF000_0004;
    pub const LOGICAL_AND: u32 = 0xF000_0005;
}

/// Appends an `Opaque` binary op and returns its result id.
pub fn binary_op(module: &mut Module, opcode: u32, result_type: Id, a: Id, b: Id, out: &mut Vec<Instruction>) -> Id {
    let result = module.ids.fresh();
    out.push(Instruction::Opaque {
        opcode,
        result: Some(result),
        result_type: Some(result_type),
        operands: smallvec::smallvec![a, b],
    });
    result
}

/// The guarded-write half of [`emit`]: `check` always runs (it claims the
/// counter slot unconditionally, so overflow can still be observed
/// host-side), `check_cond` is the in-bounds condition, and `writes` is the
/// per-word access-chain/store sequence that must only run when `check_cond`
/// holds. Callers splice this into the block structure via a follow-up
/// `split_after` rather than appending `writes` unconditionally, so an
/// over-capacity claim drops its writes instead of running them out of
/// bounds.
pub struct GuardedExport {
    pub check: Vec<Instruction>,
    pub check_cond: Id,
    pub writes: Vec<Instruction>,
}

/// Builds the instruction sequences that reserve `payload.len()` dwords in
/// the export buffer's counter and, if the claimed window still fits within
/// `capacity_dwords`, write `payload` into the slot that claims. `payload[0]`
/// is expected to already combine the message UID with its body bits (both
/// known at rewrite time, so callers usually just pass a `ConstantU32`). The
/// counter always advances by `payload.len()`, even when the claim overflows
/// `capacity_dwords`, so host-side draining can tell overflow happened; only
/// the writes themselves are skipped on a miss.
pub fn emit(module: &mut Module, buffer_var: Id, uint_ty: Id, capacity_dwords: u32, payload: &[Id]) -> GuardedExport {
    let mut check = Vec::new();

    let count_const = module.ids.fresh();
    check.push(Instruction::ConstantU32 {
        result: count_const,
        result_type: uint_ty,
        value: payload.len() as u32,
    });

    let base = module.ids.fresh();
    check.push(Instruction::AtomicIAdd {
        result: base,
        result_type: uint_ty,
        pointer: buffer_var,
        value: count_const,
    });

    let end = binary_op(module, opcode::I_ADD, uint_ty, base, count_const, &mut check);

    let capacity_const = module.ids.fresh();
    check.push(Instruction::ConstantU32 {
        result: capacity_const,
        result_type: uint_ty,
        value: capacity_dwords,
    });
    let check_cond = binary_op(module, opcode::U_GREATER_THAN_EQUAL, module.intern_type(TypeKind::Bool), capacity_const, end, &mut check);

    let mut writes = Vec::new();
    for (i, word) in payload.iter().enumerate() {
        let idx_const = module.ids.fresh();
        writes.push(Instruction::ConstantU32 {
            result: idx_const,
            result_type: uint_ty,
            value: i as u32,
        });
        let offset = binary_op(module, opcode::I_ADD, uint_ty, base, idx_const, &mut writes);

        let slot_ptr = module.ids.fresh();
        writes.push(Instruction::AccessChain {
            result: slot_ptr,
            result_type: uint_ty,
            base: buffer_var,
            indices: smallvec::smallvec![offset],
        });
        writes.push(Instruction::Store {
            pointer: slot_ptr,
            object: *word,
        });
    }

    GuardedExport { check, check_cond, writes }
}

/// Packs a message UID, an always-present detail chunk's presence bit, and
/// up to 15 bits of compile-time-known flags into `word[0]`. Matches
/// `MessageShape::Chunked { chunk_dword_counts: &[N] }` with a single
/// unconditionally-present chunk.
pub fn pack_single_chunk_header(uid: u16, flags: u16) -> u32 {
    const PRESENT: u16 = 0x8000;
    (uid as u32) | (((PRESENT | (flags & 0x7FFF)) as u32) << 16)
}
