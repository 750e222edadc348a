use crate::ids::Id;
use crate::inst::Instruction;
use crate::module::{Block, Module, SourceLocation};

/// Removes and returns the location at `index`, tolerating a `locations`
/// vec shorter than the instructions it describes (the common case today,
/// since nothing in this workspace decodes real per-instruction debug
/// info yet).
fn take_location(locations: &mut Vec<Option<SourceLocation>>, index: usize) -> Option<SourceLocation> {
    if index < locations.len() {
        locations.remove(index)
    } else {
        None
    }
}

/// Splits off and returns the locations from `index` on, same tolerance as
/// [`take_location`].
fn split_off_locations(locations: &mut Vec<Option<SourceLocation>>, index: usize) -> Vec<Option<SourceLocation>> {
    if index < locations.len() {
        locations.split_off(index)
    } else {
        Vec::new()
    }
}

/// A second guard nested inside the "error" (or "on_trip") block a
/// [`GuardedRewrite`]/[`crate::RewriteShape::Unconditional`] already
/// produces: `check` is appended right after that block's own content and
/// always runs, `check_cond` decides whether `inner` runs at all, and
/// execution rejoins exactly where the outer shape would have rejoined on
/// its own. Used when the diagnostic-export sequence itself needs a bounds
/// guard (an over-capacity claim must drop its writes rather than run them
/// unconditionally).
pub struct InnerGuard {
    pub check: Vec<Instruction>,
    pub check_cond: Id,
    pub inner: Vec<Instruction>,
}

/// What a feature pass wants inserted around one instrumented instruction.
/// The engine turns this into the four-block guard shape every pass shares.
pub struct GuardedRewrite {
    /// Appended to the original block's head, ending with the boolean this
    /// guard branches on.
    pub check: Vec<Instruction>,
    pub check_cond: Id,
    /// Appended to the "offending" block after the re-emitted original
    /// instruction (e.g. a shadow access-chain for descriptor-array
    /// bounds); empty for most passes.
    pub offending_extra: Vec<Instruction>,
    /// Builds and exports the diagnostic message; appended to the "error"
    /// block.
    pub error: Vec<Instruction>,
    /// The neutral value substituted for the instrumented instruction's
    /// result on the error path. `None` when the instruction produces no
    /// result, or when the original executes unconditionally regardless of
    /// the check (export-stability, resource-initialization emit the
    /// message but never skip the real op).
    pub neutral_result: Option<Id>,
    /// A further guard applied inside the "error" block itself, after
    /// `error`'s own instructions. `run_pass` applies this with a second
    /// `split_after` call once the outer four-block shape exists. `error`
    /// must be non-empty when this is `Some`.
    pub inner_guard: Option<InnerGuard>,
}

/// Splits `function`'s block at `inst_index`, replacing the instruction
/// there with the four-block guard shape: head (check + conditional
/// branch), offending (original op), error (message export), post (φ +
/// the rest of the original block). Returns the post block's label.
///
/// Later uses of the instrumented instruction's result are rewritten to
/// the φ's fresh id, but only within the post block's own tail and blocks
/// that appear after it in the function's block list — sufficient for the
/// forward, non-loop-carried guards every feature pass in this engine
/// emits (loop-termination's back-edge is handled separately and never
/// produces a guarded value).
pub fn split_and_guard(
    module: &mut Module,
    function: Id,
    block_index: usize,
    inst_index: usize,
    rewrite: GuardedRewrite,
) -> Id {
    let offending_label = module.ids.fresh();
    let error_label = module.ids.fresh();
    let post_label = module.ids.fresh();

    let func = module
        .function_mut(function)
        .expect("split_and_guard: unknown function");
    let original = std::mem::replace(&mut func.blocks[block_index], Block::new(Id(0)));
    let head_label = original.label;

    let mut instructions = original.instructions;
    let mut locations = original.locations;
    let inst = instructions.remove(inst_index);
    let inst_location = take_location(&mut locations, inst_index);
    let tail: Vec<Instruction> = instructions.split_off(inst_index);
    let tail_locations = split_off_locations(&mut locations, inst_index);
    let mut head_instructions = instructions;
    head_instructions.extend(rewrite.check);

    let mut head = Block::new(head_label);
    head.locations = locations;
    head.instructions = head_instructions;
    head.instructions.push(Instruction::BranchConditional {
        condition: rewrite.check_cond,
        true_target: offending_label,
        false_target: error_label,
    });

    let mut offending = Block::new(offending_label);
    offending.locations = vec![inst_location];
    offending.instructions.push(inst.clone());
    offending.instructions.extend(rewrite.offending_extra);
    offending.instructions.push(Instruction::Branch { target: post_label });

    let mut error = Block::new(error_label);
    error.instructions = rewrite.error;
    error.instructions.push(Instruction::Branch { target: post_label });

    let mut post = Block::new(post_label);
    if let (Some(original_result), Some(neutral)) = (inst.result(), rewrite.neutral_result) {
        let result_type = result_type_of(&inst);
        let phi_result = module.ids.fresh();
        post.instructions.push(Instruction::Phi {
            result: phi_result,
            result_type,
            incoming: smallvec::smallvec![(original_result, offending_label), (neutral, error_label)],
        });
        post.locations.push(None);
        post.instructions.extend(tail);
        post.locations.extend(tail_locations);
        for inst in post.instructions.iter_mut().skip(1) {
            replace_id(inst, original_result, phi_result);
        }

        let func = module.function_mut(function).unwrap();
        func.blocks.splice(block_index..=block_index, [head, offending, error, post]);
        for block in func.blocks.iter_mut().skip(block_index + 4) {
            for inst in block.instructions.iter_mut() {
                replace_id(inst, original_result, phi_result);
            }
        }
    } else {
        post.instructions = tail;
        post.locations = tail_locations;
        let func = module.function_mut(function).unwrap();
        func.blocks.splice(block_index..=block_index, [head, offending, error, post]);
    }

    post_label
}

/// Splits `function`'s block right after `inst_index`, for passes whose
/// original instruction must execute unconditionally and only the
/// diagnostic export is conditional (export-stability, and the read-side
/// guard of resource-initialization). Since the original instruction never
/// moves, no downstream id needs rewriting.
///
/// Shape: head ends with `check` + a conditional branch to `ok` (empty,
/// unconditional original already ran) or `error` (message export); both
/// rejoin at `post`, which continues with the rest of the original block.
pub fn split_after(
    module: &mut Module,
    function: Id,
    block_index: usize,
    inst_index: usize,
    check: Vec<Instruction>,
    check_cond: Id,
    error: Vec<Instruction>,
) -> Id {
    let ok_label = module.ids.fresh();
    let error_label = module.ids.fresh();
    let post_label = module.ids.fresh();

    let func = module.function_mut(function).expect("split_after: unknown function");
    let original = std::mem::replace(&mut func.blocks[block_index], Block::new(Id(0)));
    let head_label = original.label;

    let mut instructions = original.instructions;
    let mut locations = original.locations;
    let tail = instructions.split_off(inst_index + 1);
    let tail_locations = split_off_locations(&mut locations, inst_index + 1);

    let mut head = Block::new(head_label);
    head.locations = locations;
    head.instructions = instructions;
    head.instructions.extend(check);
    head.instructions.push(Instruction::BranchConditional {
        condition: check_cond,
        true_target: error_label,
        false_target: ok_label,
    });

    let mut ok = Block::new(ok_label);
    ok.instructions.push(Instruction::Branch { target: post_label });

    let mut error_block = Block::new(error_label);
    error_block.instructions = error;
    error_block.instructions.push(Instruction::Branch { target: post_label });

    let mut post = Block::new(post_label);
    post.instructions = tail;
    post.locations = tail_locations;

    let func = module.function_mut(function).unwrap();
    func.blocks.splice(block_index..=block_index, [head, ok, error_block, post]);

    post_label
}

/// Replaces a loop's back-edge `Branch { target: continue_target }` at the
/// end of `block_index` with a counter/flag check: on trip, branches into a
/// freshly appended block that runs `on_trip` then terminates the function
/// via `early_return`; otherwise branches to `continue_target` as before.
/// There is no merge block — the two paths never rejoin here.
pub fn guard_loop_back_edge(
    module: &mut Module,
    function: Id,
    block_index: usize,
    check: Vec<Instruction>,
    check_cond: Id,
    on_trip: Vec<Instruction>,
    early_return: Instruction,
) {
    let tripped_label = module.ids.fresh();

    let func = module.function_mut(function).expect("guard_loop_back_edge: unknown function");
    let block = &mut func.blocks[block_index];
    let continue_target = match block.instructions.last() {
        Some(Instruction::Branch { target }) => *target,
        other => panic!("guard_loop_back_edge: block must end in an unconditional branch, found {other:?}"),
    };
    block.instructions.pop();
    block.instructions.extend(check);
    block.instructions.push(Instruction::BranchConditional {
        condition: check_cond,
        true_target: tripped_label,
        false_target: continue_target,
    });

    let mut tripped = Block::new(tripped_label);
    tripped.instructions = on_trip;
    tripped.instructions.push(early_return);
    func.blocks.push(tripped);
}

fn result_type_of(inst: &Instruction) -> Id {
    match inst {
        Instruction::Load { result_type, .. }
        | Instruction::AccessChain { result_type, .. }
        | Instruction::ImageRead { result_type, .. }
        | Instruction::ImageFetch { result_type, .. }
        | Instruction::ImageQuerySize { result_type, .. }
        | Instruction::AtomicIAdd { result_type, .. }
        | Instruction::AtomicOr { result_type, .. }
        | Instruction::AtomicLoad { result_type, .. }
        | Instruction::Phi { result_type, .. }
        | Instruction::IsNan { result_type, .. }
        | Instruction::IsInf { result_type, .. }
        | Instruction::LogicalOr { result_type, .. }
        | Instruction::Any { result_type, .. }
        | Instruction::Select { result_type, .. }
        | Instruction::ConstantU32 { result_type, .. }
        | Instruction::ConstantBool { result_type, .. }
        | Instruction::Undef { result_type, .. }
        | Instruction::Variable { result_type, .. } => *result_type,
        Instruction::Opaque { result_type, .. } => result_type.expect("opaque instruction has no result type to φ over"),
        _ => panic!("instruction has no result to guard"),
    }
}

/// Substitutes `old` for `new` in every operand position of `inst`.
/// Result/result-type ids are never touched — only uses.
fn replace_id(inst: &mut Instruction, old: Id, new: Id) {
    let sub = |id: &mut Id| {
        if *id == old {
            *id = new;
        }
    };
    match inst {
        Instruction::Load { pointer, .. } => sub(pointer),
        Instruction::Store { pointer, object } => {
            sub(pointer);
            sub(object);
        }
        Instruction::AccessChain { base, indices, .. } => {
            sub(base);
            indices.iter_mut().for_each(sub);
        }
        Instruction::ImageRead { image, coordinate, .. } => {
            sub(image);
            sub(coordinate);
        }
        Instruction::ImageWrite { image, coordinate, texel } => {
            sub(image);
            sub(coordinate);
            sub(texel);
        }
        Instruction::ImageFetch { image, coordinate, .. } => {
            sub(image);
            sub(coordinate);
        }
        Instruction::ImageQuerySize { image, .. } => sub(image),
        Instruction::AtomicIAdd { pointer, value, .. } | Instruction::AtomicOr { pointer, value, .. } => {
            sub(pointer);
            sub(value);
        }
        Instruction::AtomicLoad { pointer, .. } => sub(pointer),
        Instruction::BranchConditional { condition, .. } => sub(condition),
        Instruction::Phi { incoming, .. } => incoming.iter_mut().for_each(|(value, _)| sub(value)),
        Instruction::ReturnValue { value } => sub(value),
        Instruction::IsNan { operand, .. } | Instruction::IsInf { operand, .. } => sub(operand),
        Instruction::LogicalOr { a, b, .. } => {
            sub(a);
            sub(b);
        }
        Instruction::Any { vector, .. } => sub(vector),
        Instruction::Select { condition, a, b, .. } => {
            sub(condition);
            sub(a);
            sub(b);
        }
        Instruction::Opaque { operands, .. } => operands.iter_mut().for_each(sub),
        Instruction::Variable { .. }
        | Instruction::Branch { .. }
        | Instruction::LoopMerge { .. }
        | Instruction::SelectionMerge { .. }
        | Instruction::Return
        | Instruction::ConstantU32 { .. }
        | Instruction::ConstantBool { .. }
        | Instruction::Undef { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Capability, Function};

    fn sample_module() -> (Module, Id) {
        let mut module = Module::new(Id(1), 10);
        let func_id = module.ids.fresh();
        let entry_label = module.ids.fresh();
        let mut block = Block::new(entry_label);
        let result_ty = module.ids.fresh();
        let image = module.ids.fresh();
        let coord = module.ids.fresh();
        let loaded = module.ids.fresh();
        block.instructions.push(Instruction::ImageRead {
            result: loaded,
            result_type: result_ty,
            image,
            coordinate: coord,
        });
        block.instructions.push(Instruction::ReturnValue { value: loaded });
        module.functions.push(Function {
            id: func_id,
            return_type: result_ty,
            is_void: false,
            blocks: vec![block],
        });
        module.require_capability(Capability::ImageQuery);
        (module, func_id)
    }

    #[test]
    fn splits_block_into_four_and_rewrites_downstream_use() {
        let (mut module, func_id) = sample_module();
        let check_cond = module.ids.fresh();
        let neutral = module.ids.fresh();

        let post = split_and_guard(
            &mut module,
            func_id,
            0,
            0,
            GuardedRewrite {
                check: vec![Instruction::ConstantBool {
                    result: check_cond,
                    result_type: Id(0),
                    value: true,
                }],
                check_cond,
                offending_extra: Vec::new(),
                error: vec![Instruction::ConstantU32 {
                    result: neutral,
                    result_type: Id(0),
                    value: 0,
                }],
                neutral_result: Some(neutral),
                inner_guard: None,
            },
        );

        let func = module.function_mut(func_id).unwrap();
        assert_eq!(func.blocks.len(), 4);
        assert_eq!(func.blocks[3].label, post);

        // The original ReturnValue must now reference the φ, not the
        // original ImageRead result.
        match &func.blocks[3].instructions[1] {
            Instruction::ReturnValue { value } => {
                if let Instruction::Phi { result, .. } = &func.blocks[3].instructions[0] {
                    assert_eq!(value, result);
                } else {
                    panic!("expected φ as post block's first instruction");
                }
            }
            other => panic!("unexpected instruction: {other:?}"),
        }
    }

    #[test]
    fn split_after_keeps_original_instruction_unconditional() {
        let (mut module, func_id) = sample_module();
        let check_cond = module.ids.fresh();

        let post = split_after(
            &mut module,
            func_id,
            0,
            0,
            vec![Instruction::ConstantBool {
                result: check_cond,
                result_type: Id(0),
                value: false,
            }],
            check_cond,
            vec![Instruction::ConstantU32 {
                result: module.ids.fresh(),
                result_type: Id(0),
                value: 1,
            }],
        );

        let func = module.function_mut(func_id).unwrap();
        assert_eq!(func.blocks.len(), 4);
        assert_eq!(func.blocks[3].label, post);
        // The original ImageRead stayed in the head block, unmoved.
        assert!(matches!(func.blocks[0].instructions[0], Instruction::ImageRead { .. }));
        assert!(matches!(func.blocks[3].instructions[0], Instruction::ReturnValue { .. }));
    }

    #[test]
    fn guard_loop_back_edge_adds_a_tripped_block_without_disturbing_continue_path() {
        let (mut module, func_id) = sample_module();
        let continue_target = module.ids.fresh();
        module.function_mut(func_id).unwrap().blocks[0].instructions.push(Instruction::Branch { target: continue_target });

        let check_cond = module.ids.fresh();
        guard_loop_back_edge(
            &mut module,
            func_id,
            0,
            vec![Instruction::ConstantBool {
                result: check_cond,
                result_type: Id(0),
                value: false,
            }],
            check_cond,
            vec![],
            Instruction::Return,
        );

        let func = module.function_mut(func_id).unwrap();
        assert_eq!(func.blocks.len(), 2);
        match func.blocks[0].instructions.last().unwrap() {
            Instruction::BranchConditional { false_target, .. } => assert_eq!(*false_target, continue_target),
            other => panic!("unexpected terminator: {other:?}"),
        }
        assert!(matches!(func.blocks[1].instructions.last().unwrap(), Instruction::Return));
    }
}
