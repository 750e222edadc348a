//! The five GPU-side validation feature passes: resource bounds,
//! descriptor-array bounds, export stability, loop termination, and
//! resource initialization. Each pass drives `gv-ir`'s rewrite engine to
//! splice guarded diagnostic checks around the instructions it targets.

mod descriptor_array_bounds;
mod export;
mod export_stability;
mod loop_termination;
mod resource_bounds;
mod resource_initialization;

pub use descriptor_array_bounds::{DescriptorArrayBoundsPass, MESSAGE_SHAPE as DESCRIPTOR_ARRAY_BOUNDS_SHAPE};
pub use export_stability::{ExportStabilityPass, MESSAGE_SHAPE as EXPORT_STABILITY_SHAPE};
pub use loop_termination::{instrument_function as instrument_loop_termination, MESSAGE_SHAPE as LOOP_TERMINATION_SHAPE};
pub use resource_bounds::{ResourceBoundsPass, MESSAGE_SHAPE as RESOURCE_BOUNDS_SHAPE};
pub use resource_initialization::{
    ResourceInitializationReadPass, ResourceInitializationWritePass, MESSAGE_SHAPE as RESOURCE_INITIALIZATION_SHAPE,
};
