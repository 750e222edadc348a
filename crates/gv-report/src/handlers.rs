use gv_core::Shared;
use gv_diagnostic_registry::{DiagnosticRegistry, DiagnosticRegistryError, Message, MessageHandler};
use gv_location_registry::NO_SOURCE;
use gv_shader_compiler::{feature_id, FeatureSet};

use crate::aggregator::{GroupKey, ReportAggregator};
use crate::types::ValidationErrorType;

/// One `MessageHandler` per feature, each decoding its own wire format and
/// forwarding a grouping key and human-readable text to the shared
/// aggregator. Kept as free-standing structs rather than one handler
/// parametrized by a closure: every feature's decode step reads different
/// words out of the message, so the type itself documents the format.
struct ResourceBoundsHandler(Shared<ReportAggregator>);

impl MessageHandler for ResourceBoundsHandler {
    fn handle(&self, messages: &[Message<'_>]) {
        for message in messages {
            let is_buffer_access = message.body;
            let extract_guid = message.words.get(1).copied().unwrap_or(NO_SOURCE);
            let key = GroupKey::new(extract_guid, is_buffer_access as u32);
            let resource_kind = if is_buffer_access != 0 { "buffer" } else { "image" };
            self.0.record(feature_id::RESOURCE_BOUNDS, ValidationErrorType::ResourceBounds, key, || {
                format!("{resource_kind} access out of bounds")
            });
        }
    }
}

struct DescriptorArrayBoundsHandler(Shared<ReportAggregator>);

impl MessageHandler for DescriptorArrayBoundsHandler {
    fn handle(&self, messages: &[Message<'_>]) {
        for _message in messages {
            let key = GroupKey::new(NO_SOURCE, 0);
            self.0.record(feature_id::DESCRIPTOR_ARRAY_BOUNDS, ValidationErrorType::DescriptorArrayBounds, key, || {
                "descriptor array index out of bounds".to_string()
            });
        }
    }
}

struct ExportStabilityHandler(Shared<ReportAggregator>);

impl MessageHandler for ExportStabilityHandler {
    fn handle(&self, messages: &[Message<'_>]) {
        for _message in messages {
            let key = GroupKey::new(NO_SOURCE, 0);
            self.0.record(feature_id::EXPORT_STABILITY, ValidationErrorType::ExportStability, key, || {
                "shader output produced NaN or Inf".to_string()
            });
        }
    }
}

struct LoopTerminationHandler(Shared<ReportAggregator>);

impl MessageHandler for LoopTerminationHandler {
    fn handle(&self, messages: &[Message<'_>]) {
        for _message in messages {
            let key = GroupKey::new(NO_SOURCE, 0);
            self.0.record(feature_id::LOOP_TERMINATION, ValidationErrorType::LoopTermination, key, || {
                "loop terminated by the heart-beat thread or its iteration limit".to_string()
            });
        }
    }
}

struct ResourceInitializationHandler(Shared<ReportAggregator>);

impl MessageHandler for ResourceInitializationHandler {
    fn handle(&self, messages: &[Message<'_>]) {
        for message in messages {
            let puid = message.words.get(1).copied();
            let key = GroupKey::new(NO_SOURCE, puid.unwrap_or(0));
            self.0.record(feature_id::RESOURCE_INITIALIZATION, ValidationErrorType::ResourceInitialization, key, || match puid {
                Some(puid) => format!("read from uninitialized resource (token {puid})"),
                None => "read from uninitialized resource".to_string(),
            });
        }
    }
}

/// Binds one `MessageHandler` per feature `feature_set` allocated a message
/// UID for, all sharing `aggregator`. Called once, right after
/// `FeatureSet::new`, before any module is compiled against it.
pub fn install_handlers(
    diagnostics: &DiagnosticRegistry,
    feature_set: &FeatureSet,
    aggregator: Shared<ReportAggregator>,
) -> Result<(), DiagnosticRegistryError> {
    for (id, uid, shape) in feature_set.registered_messages() {
        let handler: Shared<dyn MessageHandler> = match id {
            feature_id::RESOURCE_BOUNDS => Shared::new(ResourceBoundsHandler(aggregator.clone())),
            feature_id::DESCRIPTOR_ARRAY_BOUNDS => Shared::new(DescriptorArrayBoundsHandler(aggregator.clone())),
            feature_id::EXPORT_STABILITY => Shared::new(ExportStabilityHandler(aggregator.clone())),
            feature_id::LOOP_TERMINATION => Shared::new(LoopTerminationHandler(aggregator.clone())),
            feature_id::RESOURCE_INITIALIZATION => Shared::new(ResourceInitializationHandler(aggregator.clone())),
            other => {
                tracing::warn!(feature_id = other, "no report handler defined for this feature id, messages will be dropped");
                continue;
            }
        };
        diagnostics.set_message_handler(uid, shape, handler)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gv_core::{FeatureMask, Shared};
    use gv_export::drain;
    use gv_location_registry::LocationRegistry;

    use crate::object_table::DescriptorSetTable;

    #[test]
    fn installs_one_handler_per_enabled_feature() {
        let diagnostics = DiagnosticRegistry::new();
        let feature_set = FeatureSet::new(&diagnostics, FeatureMask::RESOURCE_BOUNDS | FeatureMask::EXPORT_STABILITY).unwrap();
        let aggregator = Shared::new(ReportAggregator::new(
            Shared::new(LocationRegistry::default()),
            Shared::new(DescriptorSetTable::new()),
            4096,
        ));

        assert_eq!(feature_set.registered_messages().len(), 2);
        install_handlers(&diagnostics, &feature_set, aggregator.clone()).unwrap();

        // Installing a second time against the very same UIDs must fail:
        // `DiagnosticRegistry::set_message_handler` rejects a duplicate
        // handler for one UID.
        assert!(install_handlers(&diagnostics, &feature_set, aggregator).is_err());
    }

    #[test]
    fn drained_resource_bounds_message_reaches_the_report() {
        let diagnostics = DiagnosticRegistry::new();
        let feature_set = FeatureSet::new(&diagnostics, FeatureMask::RESOURCE_BOUNDS).unwrap();
        let aggregator = Shared::new(ReportAggregator::new(
            Shared::new(LocationRegistry::default()),
            Shared::new(DescriptorSetTable::new()),
            4096,
        ));
        install_handlers(&diagnostics, &feature_set, aggregator.clone()).unwrap();

        let (_, uid, _) = feature_set.registered_messages()[0];
        // `resource_bounds`'s chunk is always present: top bit of the body set.
        let word0 = (uid as u32) | (0x8000u32 << 16);
        let mut raw = vec![2, word0, 0];
        drain(&mut raw, &diagnostics);

        let report = aggregator.report();
        assert_eq!(report.messages.len(), 1);
        assert_eq!(report.messages[0].feature_id, feature_id::RESOURCE_BOUNDS);
        assert_eq!(report.messages[0].merge_count, 1);
    }
}
