//! Per-command-buffer interception: swaps in a pipeline's instrumented
//! variant at `BindPipeline`, commits pending export/resource/PRMT
//! descriptor writes at `Draw`/`Dispatch`, and records the post-submission
//! export-counter readback at `End`.

mod command_buffer;
mod push_constants;

pub use command_buffer::{combined_hash_for, CommandBufferProxy, PostCommandBuffer};
pub use push_constants::merge_push_constants;
