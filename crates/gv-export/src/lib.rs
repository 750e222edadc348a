//! The export buffer every instrumented shader module writes diagnostic
//! messages into, and the host-side logic that drains it each sync point.

mod drain;
mod layout;

pub use drain::{drain, DrainReport};
pub use layout::{ExportBufferLayout, EXPORT_BUFFER_BINDING, EXPORT_COUNTER_WORDS};
