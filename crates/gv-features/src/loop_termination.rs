use gv_core::{LoopConfig, Uid};
use gv_ir::{guard_loop_back_edge, split_after, Id, Instruction, Module, StorageClass, TypeKind};

use crate::export::{self, opcode};

/// This pass's message is a bare `word[0]` carrying only the UID: there is
/// no per-iteration data worth exporting beyond "this back edge tripped".
pub const MESSAGE_SHAPE: gv_diagnostic_registry::MessageShape = gv_diagnostic_registry::MessageShape::Simple;

/// Instruments every back edge in `function` with a counter increment and,
/// every `atomic_iteration_interval` iterations, an atomic read of the
/// per-submission termination flag. Tripping either the flag or (when
/// enabled) the hard iteration ceiling exports a `LoopTermination` message,
/// atomically sets the flag so every other wave still spinning sees it on
/// its own next check, and returns from the function immediately.
///
/// Unlike the other four passes this isn't a [`gv_ir::RewritePass`]: it
/// needs to set up one counter per function before processing any of its
/// back edges, and back-edge detection is a block-graph query rather than a
/// per-instruction `interesting()` match.
pub fn instrument_function(
    module: &mut Module,
    function: Id,
    uid: Uid,
    termination_flag_buffer: Id,
    export_buffer: Id,
    export_capacity_dwords: u32,
    loop_config: &LoopConfig,
) {
    let uint_ty = module.intern_type(TypeKind::Int { signed: false, width: 32 });
    let bool_ty = module.intern_type(TypeKind::Bool);
    let counter_ptr_ty = module.intern_type(TypeKind::Pointer {
        pointee: uint_ty,
        storage_class: StorageClass::Function,
    });

    let counter_var = module.ids.fresh();
    let zero = module.ids.fresh();
    let (is_void, return_type) = {
        let func = module.function_mut(function).expect("instrument_function: unknown function");
        (func.is_void, func.return_type)
    };

    let back_edges = back_edge_block_indices(module, function);

    let func = module.function_mut(function).unwrap();
    let entry = &mut func.blocks[0];
    entry.instructions.insert(
        0,
        Instruction::Variable {
            result: counter_var,
            result_type: counter_ptr_ty,
            storage_class: StorageClass::Function,
        },
    );
    entry.instructions.insert(
        1,
        Instruction::ConstantU32 { result: zero, result_type: uint_ty, value: 0 },
    );
    entry.instructions.insert(2, Instruction::Store { pointer: counter_var, object: zero });

    for block_index in back_edges {
        let loaded = module.ids.fresh();
        let one = module.ids.fresh();
        let mut check = vec![
            Instruction::Load { result: loaded, result_type: uint_ty, pointer: counter_var },
            Instruction::ConstantU32 { result: one, result_type: uint_ty, value: 1 },
        ];
        let new_counter = export::binary_op(module, opcode::I_ADD, uint_ty, loaded, one, &mut check);
        check.push(Instruction::Store { pointer: counter_var, object: new_counter });

        let iteration_trip = if loop_config.use_iteration_limits {
            let limit = module.ids.fresh();
            check.push(Instruction::ConstantU32 { result: limit, result_type: uint_ty, value: loop_config.iteration_limit });
            export::binary_op(module, opcode::U_GREATER_THAN_EQUAL, bool_ty, new_counter, limit, &mut check)
        } else {
            let never = module.ids.fresh();
            check.push(Instruction::ConstantBool { result: never, result_type: bool_ty, value: false });
            never
        };

        let interval_mask = module.ids.fresh();
        check.push(Instruction::ConstantU32 {
            result: interval_mask,
            result_type: uint_ty,
            value: loop_config.atomic_iteration_interval.saturating_sub(1),
        });
        let masked = export::binary_op(module, opcode::BITWISE_AND, uint_ty, new_counter, interval_mask, &mut check);
        let mask_zero = module.ids.fresh();
        check.push(Instruction::ConstantU32 { result: mask_zero, result_type: uint_ty, value: 0 });
        let is_check_iteration = export::binary_op(module, opcode::I_EQUAL, bool_ty, masked, mask_zero, &mut check);

        let flag = module.ids.fresh();
        check.push(Instruction::AtomicLoad { result: flag, result_type: uint_ty, pointer: termination_flag_buffer });
        let flag_one = module.ids.fresh();
        check.push(Instruction::ConstantU32 { result: flag_one, result_type: uint_ty, value: 1 });
        let flag_set = export::binary_op(module, opcode::U_GREATER_THAN_EQUAL, bool_ty, flag, flag_one, &mut check);
        let flag_trip = export::binary_op(module, opcode::LOGICAL_AND, bool_ty, is_check_iteration, flag_set, &mut check);

        let check_cond = module.ids.fresh();
        check.push(Instruction::LogicalOr { result: check_cond, result_type: bool_ty, a: iteration_trip, b: flag_trip });

        let word0 = module.ids.fresh();
        let mut on_trip = vec![Instruction::ConstantU32 { result: word0, result_type: uint_ty, value: uid as u32 }];

        // Broadcast the trip to every other wave's periodic flag read, not just
        // this wave's own early return: a wave that never revisits this back
        // edge again would otherwise never learn the loop is being torn down.
        let broadcast = module.ids.fresh();
        on_trip.push(Instruction::AtomicOr {
            result: broadcast,
            result_type: uint_ty,
            pointer: termination_flag_buffer,
            value: flag_one,
        });

        let guarded = export::emit(module, export_buffer, uint_ty, export_capacity_dwords, &[word0]);

        let early_return = if is_void {
            Instruction::Return
        } else {
            let undef = module.ids.fresh();
            on_trip.push(Instruction::Undef { result: undef, result_type: return_type });
            Instruction::ReturnValue { value: undef }
        };

        // `on_trip`'s last instruction (word0, or the return-value `Undef`
        // when non-void) is where the tripped block ends before
        // `guard_loop_back_edge` appends `early_return`; split right after
        // it to guard the export write on the capacity check, same as
        // `gv_ir::run_pass` does for the other passes' error blocks.
        let on_trip_tail = on_trip.len() - 1;
        guard_loop_back_edge(module, function, block_index, check, check_cond, on_trip, early_return);
        let tripped_index = module.function_mut(function).unwrap().blocks.len() - 1;
        split_after(module, function, tripped_index, on_trip_tail, guarded.check, guarded.check_cond, guarded.writes);
    }
}

/// Every block whose terminator is an unconditional `Branch` to a block
/// that appears no later than itself in the function's block list. This
/// engine's front ends always emit loop continue-edges this way: the loop
/// header precedes its body in block order, so a branch back to it (or to
/// any earlier block) is exactly a back edge.
fn back_edge_block_indices(module: &Module, function: Id) -> Vec<usize> {
    let func = module.functions.iter().find(|f| f.id == function).expect("unknown function");
    func.blocks
        .iter()
        .enumerate()
        .filter_map(|(index, block)| match block.instructions.last() {
            Some(Instruction::Branch { target }) => func
                .block_index(*target)
                .filter(|&target_index| target_index <= index)
                .map(|_| index),
            _ => None,
        })
        .collect()
}
