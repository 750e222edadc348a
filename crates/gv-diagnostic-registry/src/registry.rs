use fnv::FnvHashMap;
use gv_core::{Shared, Uid};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::message::{decode_header, Message, MessageShape};
use crate::DiagnosticRegistryError;

/// Kind of GPU resource a feature-declared descriptor binds to, used by the
/// IR rewriter to emit the right variable/type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    StorageBuffer,
    StorageImage,
    SampledImage,
    UniformBuffer,
}

#[derive(Debug, Clone)]
pub struct DescriptorDecl {
    pub uid: u32,
    pub feature_id: u16,
    pub kind: DescriptorKind,
}

#[derive(Debug, Clone)]
pub struct PushConstantDecl {
    pub uid: u32,
    pub feature_id: u16,
    /// Size in bytes of this feature's appended push-constant member,
    /// before 4-byte alignment padding.
    pub size_bytes: u32,
}

/// A feature's message handler. Receives one contiguous run of messages
/// sharing a UID, per `dispatch`.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, messages: &[Message<'_>]);
}

struct HandlerEntry {
    shape: MessageShape,
    handler: Shared<dyn MessageHandler>,
}

#[derive(Default)]
struct Data {
    handlers: FnvHashMap<Uid, HandlerEntry>,
    descriptors: Vec<DescriptorDecl>,
    push_constants: Vec<PushConstantDecl>,
}

/// Owns allocation of message UIDs, descriptor UIDs, and push-constant
/// UIDs; dispatches incoming GPU messages to registered handlers.
#[derive(Default)]
pub struct DiagnosticRegistry {
    next_message_uid: AtomicU32,
    next_descriptor_uid: AtomicU32,
    next_push_constant_uid: AtomicU32,
    data: Mutex<Data>,
}

impl DiagnosticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonically increasing, 16-bit.
    pub fn allocate_message_uid(&self) -> Result<Uid, DiagnosticRegistryError> {
        let uid = self.next_message_uid.fetch_add(1, Ordering::AcqRel);
        if uid > u16::MAX as u32 {
            return Err(DiagnosticRegistryError::MessageUidSpaceExhausted);
        }
        Ok(uid as Uid)
    }

    /// Allocates a descriptor UID and records its declaration in the
    /// ordered list [`Self::enumerate_descriptors`] returns. Allocation and
    /// declaration are combined into one call because nothing in this
    /// design ever wants an undeclared descriptor UID.
    pub fn allocate_descriptor_uid(&self, feature_id: u16, kind: DescriptorKind) -> u32 {
        let uid = self.next_descriptor_uid.fetch_add(1, Ordering::AcqRel);
        self.data.lock().descriptors.push(DescriptorDecl {
            uid,
            feature_id,
            kind,
        });
        uid
    }

    /// Allocates a push-constant UID and records its declaration (see
    /// [`Self::allocate_descriptor_uid`] for why allocation and declaration
    /// are combined).
    pub fn allocate_push_constant_uid(&self, feature_id: u16, size_bytes: u32) -> u32 {
        let uid = self.next_push_constant_uid.fetch_add(1, Ordering::AcqRel);
        self.data.lock().push_constants.push(PushConstantDecl {
            uid,
            feature_id,
            size_bytes,
        });
        uid
    }

    /// 1:1 binding from UID to a feature's handler.
    pub fn set_message_handler(
        &self,
        uid: Uid,
        shape: MessageShape,
        handler: Shared<dyn MessageHandler>,
    ) -> Result<(), DiagnosticRegistryError> {
        let mut data = self.data.lock();
        if data.handlers.contains_key(&uid) {
            return Err(DiagnosticRegistryError::DuplicateHandler(uid));
        }
        data.handlers.insert(uid, HandlerEntry { shape, handler });
        Ok(())
    }

    pub fn enumerate_push_constants(&self) -> Vec<PushConstantDecl> {
        self.data.lock().push_constants.clone()
    }

    pub fn enumerate_descriptors(&self) -> Vec<DescriptorDecl> {
        self.data.lock().descriptors.clone()
    }

    /// Looks up how many dwords (including `word[0]`) the message starting
    /// with `word0` occupies, consulting the shape registered for its UID.
    /// Used by the export-buffer drain to slice the raw stream.
    pub fn message_dword_count(&self, word0: u32) -> Option<usize> {
        let header = decode_header(word0);
        let data = self.data.lock();
        data.handlers
            .get(&header.uid)
            .map(|entry| entry.shape.dword_count(header.body))
    }

    /// Sorts `messages` by UID, then calls the registered handler once per
    /// contiguous UID-run. Messages whose UID has no registered handler are
    /// dropped with a warning — this can only happen if the export buffer's
    /// content outlives the feature pass that produced it, which should
    /// never occur within one device-state's lifetime.
    pub fn dispatch(&self, messages: &mut [Message<'_>]) {
        messages.sort_by_key(|m| m.uid);

        let data = self.data.lock();
        let mut start = 0;
        while start < messages.len() {
            let uid = messages[start].uid;
            let mut end = start + 1;
            while end < messages.len() && messages[end].uid == uid {
                end += 1;
            }

            match data.handlers.get(&uid) {
                Some(entry) => entry.handler.handle(&messages[start..end]),
                None => tracing::warn!(uid, "no message handler registered, dropping {} message(s)", end - start),
            }

            start = end;
        }
    }
}
