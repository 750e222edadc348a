//! Allocates the three UID spaces (message, descriptor, push-constant) a
//! feature pass draws from, and dispatches a drained batch of GPU-exported
//! messages to the handler each UID was bound to.

mod error;
mod message;
mod registry;

pub use error::DiagnosticRegistryError;
pub use message::{decode_header, Message, MessageHeader, MessageShape, MESSAGE_BODY_BITS};
pub use registry::{DescriptorDecl, DescriptorKind, DiagnosticRegistry, MessageHandler, PushConstantDecl};
