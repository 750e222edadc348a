//! The dialect-agnostic mid-level IR every supported binary shader format
//! lowers into before instrumentation, and the block-splitting rewrite
//! engine that feature passes drive to insert guarded diagnostic checks.

mod ids;
mod inst;
mod module;
mod pass;
mod rewrite;
mod setup;
mod types;

pub use ids::{Id, IdAllocator};
pub use inst::Instruction;
pub use module::{Block, Capability, Function, Module, SourceLocation};
pub use pass::{run_pass, RewritePass, RewriteShape};
pub use rewrite::{guard_loop_back_edge, split_after, split_and_guard, GuardedRewrite, InnerGuard};
pub use setup::{ModuleSetup, ReflectedSource};
pub use types::{StorageClass, TypeKind, TypeTable};
