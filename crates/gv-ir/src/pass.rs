use fnv::FnvHashSet;

use crate::ids::Id;
use crate::inst::Instruction;
use crate::module::{Module, SourceLocation};
use crate::rewrite::{split_and_guard, split_after, GuardedRewrite, InnerGuard};

/// What a pass wants done with one interesting instruction.
pub enum RewriteShape {
    /// The bounds-check shape: the original only runs on the offending
    /// path, with a φ selecting its result (or a neutral constant) for
    /// anything downstream. See [`split_and_guard`].
    Guard(GuardedRewrite),
    /// The original instruction always runs; only the diagnostic export is
    /// conditional. See [`split_after`].
    Unconditional {
        check: Vec<Instruction>,
        check_cond: Id,
        error: Vec<Instruction>,
        /// See [`GuardedRewrite::inner_guard`]; `error` must be non-empty
        /// when this is `Some`.
        inner_guard: Option<InnerGuard>,
    },
    /// No branch at all — just splice `extra` in immediately after the
    /// matched instruction (resource-initialization's write-side
    /// `AtomicOr`, which never fails and needs no diagnostic).
    Insert(Vec<Instruction>),
}

/// Applies a pending [`InnerGuard`] inside the block at `block_index`
/// (already `error_len` instructions long, not counting the trailing branch
/// `split_and_guard`/`split_after` appended), via a second `split_after`.
/// Returns how many extra blocks this inserted, so the caller's resume
/// point can skip past all of them.
fn apply_inner_guard(module: &mut Module, function: Id, block_index: usize, error_len: usize, inner_guard: Option<InnerGuard>) -> usize {
    match inner_guard {
        None => 0,
        Some(guard) => {
            assert!(error_len > 0, "inner_guard requires a non-empty error/on_trip sequence to split after");
            split_after(module, function, block_index, error_len - 1, guard.check, guard.check_cond, guard.inner);
            3
        }
    }
}

/// One feature's instrumentation logic: which instructions it cares about
/// and how to rewrite them. `run_pass` drives the block-splitting and keeps
/// the pass from ever being asked about the same logical instruction twice.
pub trait RewritePass {
    fn name(&self) -> &'static str;

    /// Whether `inst` is one this pass instruments.
    fn interesting(&self, module: &Module, inst: &Instruction) -> bool;

    /// Builds the rewrite for an instruction `interesting` accepted. May
    /// intern new types or allocate constants via `module`. `location` is
    /// `inst`'s source location, when the front end that decoded this
    /// module recorded one — most passes ignore it; a pass that exports a
    /// resolvable extract-GUID resolves it through its own
    /// `ReflectedSource`/`LocationRegistry`.
    fn build(&mut self, module: &mut Module, inst: &Instruction, location: Option<&SourceLocation>) -> RewriteShape;
}

/// Walks every block of every function once, instrumenting each interesting
/// instruction. An instruction with a result is visited at most once per
/// pass: once rewritten, its result id is marked, and the pass's own
/// re-emitted copy (living in the "offending"/head block) is skipped on the
/// next check. Instructions without a result (stores, image writes) are
/// never revisited because the scan always moves past whatever a rewrite
/// inserted rather than re-entering it.
pub fn run_pass(module: &mut Module, pass: &mut dyn RewritePass) {
    let mut instrumented: FnvHashSet<Id> = FnvHashSet::default();
    let function_ids: Vec<Id> = module.functions.iter().map(|f| f.id).collect();

    for function in function_ids {
        let mut block_index = 0;
        'blocks: while block_index < module.function_mut(function).unwrap().blocks.len() {
            let mut inst_index = 0;
            loop {
                let block_len = module.function_mut(function).unwrap().blocks[block_index].instructions.len();
                if inst_index >= block_len {
                    break;
                }

                let block = &module.function_mut(function).unwrap().blocks[block_index];
                let candidate = block.instructions[inst_index].clone();
                let location = block.location_at(inst_index).cloned();
                let already_done = candidate.result().map_or(false, |id| instrumented.contains(&id));

                if !already_done && pass.interesting(module, &candidate) {
                    if let Some(result) = candidate.result() {
                        instrumented.insert(result);
                    }

                    match pass.build(module, &candidate, location.as_ref()) {
                        RewriteShape::Guard(mut rewrite) => {
                            let inner_guard = rewrite.inner_guard.take();
                            let error_len = rewrite.error.len();
                            split_and_guard(module, function, block_index, inst_index, rewrite);
                            // [head, offending, error, post] land at block_index..+3; resume on
                            // post so later instructions in the original block still get
                            // scanned, instead of skipping past it. An inner_guard further
                            // splits the error block into four, pushing post out by 3 more.
                            block_index += 3 + apply_inner_guard(module, function, block_index + 2, error_len, inner_guard);
                            continue 'blocks;
                        }
                        RewriteShape::Unconditional { check, check_cond, error, inner_guard } => {
                            let error_len = error.len();
                            split_after(module, function, block_index, inst_index, check, check_cond, error);
                            block_index += 3 + apply_inner_guard(module, function, block_index + 2, error_len, inner_guard);
                            continue 'blocks;
                        }
                        RewriteShape::Insert(extra) => {
                            let inserted = extra.len();
                            let func = module.function_mut(function).unwrap();
                            func.blocks[block_index]
                                .instructions
                                .splice(inst_index + 1..inst_index + 1, extra);
                            inst_index += 1 + inserted;
                            continue;
                        }
                    }
                }

                inst_index += 1;
            }
            block_index += 1;
        }
    }

    tracing::debug!(pass = pass.name(), instrumented = instrumented.len(), "rewrite pass complete");
}
