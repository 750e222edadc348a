use gv_diagnostic_registry::{decode_header, DiagnosticRegistry, Message};

/// Outcome of one drain pass over a device-state's export buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DrainReport {
    pub messages_dispatched: usize,
    pub dwords_consumed: u32,
    /// The GPU-side counter requested more dwords than the buffer holds;
    /// the excess was written past the end of the backing allocation on
    /// the device and is simply absent here, not recoverable.
    pub truncated: bool,
}

/// Reads the counter word, clamps it to the payload's capacity, walks the
/// message stream dispatching each to its registered handler, and resets
/// the counter to zero. `raw` is `[counter, payload...]` as written by the
/// GPU-side export protocol.
pub fn drain(raw: &mut [u32], registry: &DiagnosticRegistry) -> DrainReport {
    assert!(!raw.is_empty(), "export buffer must reserve at least the counter word");
    let (counter, payload) = raw.split_at_mut(1);

    let capacity = payload.len() as u32;
    let requested = counter[0];
    let truncated = requested > capacity;
    if truncated {
        tracing::warn!(requested, capacity, "export buffer overflowed, dropping excess GPU messages");
    }
    let available = requested.min(capacity) as usize;
    let payload = &payload[..available];

    let mut messages = Vec::new();
    let mut offset = 0usize;
    while offset < payload.len() {
        let word0 = payload[offset];
        let header = decode_header(word0);
        let count = match registry.message_dword_count(word0) {
            Some(count) => count,
            None => {
                tracing::warn!(uid = header.uid, "export buffer message has unknown UID, stopping drain early");
                break;
            }
        };
        if offset + count > payload.len() {
            tracing::warn!(uid = header.uid, "export buffer message is truncated, dropping partial tail");
            break;
        }
        messages.push(Message {
            uid: header.uid,
            body: header.body,
            words: &payload[offset..offset + count],
        });
        offset += count;
    }

    let messages_dispatched = messages.len();
    registry.dispatch(&mut messages);

    counter[0] = 0;

    DrainReport {
        messages_dispatched,
        dwords_consumed: offset as u32,
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gv_core::Shared;
    use gv_diagnostic_registry::{MessageHandler, MessageShape};
    use std::sync::{Arc, Mutex};

    struct RecordingHandler(Arc<Mutex<Vec<u32>>>);

    impl MessageHandler for RecordingHandler {
        fn handle(&self, messages: &[Message<'_>]) {
            self.0.lock().unwrap().extend(messages.iter().map(|m| m.words[0]));
        }
    }

    #[test]
    fn drains_simple_messages_and_resets_counter() {
        let registry = DiagnosticRegistry::new();
        let uid = registry.allocate_message_uid().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        registry
            .set_message_handler(
                uid,
                MessageShape::Simple,
                Arc::new(RecordingHandler(seen.clone())) as Shared<dyn MessageHandler>,
            )
            .unwrap();

        let word0 = uid as u32;
        let mut raw = vec![2, word0, word0];
        let report = drain(&mut raw, &registry);

        assert_eq!(report.messages_dispatched, 2);
        assert_eq!(report.dwords_consumed, 2);
        assert!(!report.truncated);
        assert_eq!(raw[0], 0);
        assert_eq!(*seen.lock().unwrap(), vec![word0, word0]);
    }

    #[test]
    fn clamps_an_overflowed_counter_to_capacity() {
        let registry = DiagnosticRegistry::new();
        let uid = registry.allocate_message_uid().unwrap();
        registry
            .set_message_handler(
                uid,
                MessageShape::Simple,
                Arc::new(RecordingHandler(Arc::new(Mutex::new(Vec::new())))) as Shared<dyn MessageHandler>,
            )
            .unwrap();

        let word0 = uid as u32;
        let mut raw = vec![5, word0]; // counter claims 5 dwords but only 1 slot exists
        let report = drain(&mut raw, &registry);

        assert!(report.truncated);
        assert_eq!(report.messages_dispatched, 1);
        assert_eq!(raw[0], 0);
    }

    #[test]
    fn stops_at_an_unregistered_uid() {
        let registry = DiagnosticRegistry::new();
        let mut raw = vec![1, 0xFFFF];
        let report = drain(&mut raw, &registry);
        assert_eq!(report.messages_dispatched, 0);
        assert_eq!(report.dwords_consumed, 0);
    }
}
