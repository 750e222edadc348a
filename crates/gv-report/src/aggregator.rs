use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicUsize, Ordering};

use fnv::FnvHashMap;
use gv_core::Shared;
use gv_location_registry::{ExtractGuid, LocationRegistry, NO_SOURCE};
use parking_lot::Mutex;

use crate::types::{ObjectInfo, ReportMessage, SourceLocation, ValidationErrorType, VkGpuValidationReport};

/// A feature-chosen grouping key: the resolved extract GUID plus whatever
/// extra discriminator the feature needs (resource-bounds' buffer-vs-image
/// tag; unused, left `0`, by every other feature).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub extract_guid: ExtractGuid,
    pub sub_key: u32,
}

impl GroupKey {
    pub fn new(extract_guid: ExtractGuid, sub_key: u32) -> Self {
        Self { extract_guid, sub_key }
    }
}

/// Merges dispatched GPU messages from every feature handler into the
/// report `Report()` hands back, implementing §4.8's group/merge/resolve/
/// append/report steps. One instance is shared by every feature's
/// `MessageHandler`.
pub struct ReportAggregator {
    location_registry: Shared<LocationRegistry>,
    object_table: Shared<crate::object_table::DescriptorSetTable>,
    shader_connection_object_threshold: usize,
    resolved_objects_this_report: AtomicUsize,
    queues: Mutex<FnvHashMap<u16, FnvHashMap<GroupKey, ReportMessage>>>,
}

impl ReportAggregator {
    pub fn new(
        location_registry: Shared<LocationRegistry>,
        object_table: Shared<crate::object_table::DescriptorSetTable>,
        shader_connection_object_threshold: usize,
    ) -> Self {
        Self {
            location_registry,
            object_table,
            shader_connection_object_threshold,
            resolved_objects_this_report: AtomicUsize::new(0),
            queues: Mutex::new(FnvHashMap::default()),
        }
    }

    /// Groups by `(feature_id, key)`, merging into an existing entry if one
    /// exists, or building a fresh one (resolving the extract and its bound
    /// object) otherwise. `text` is only called on first insert.
    pub fn record(
        &self,
        feature_id: u16,
        error_type: ValidationErrorType,
        key: GroupKey,
        text: impl FnOnce() -> String,
    ) {
        let mut queues = self.queues.lock();
        let feature_queue = queues.entry(feature_id).or_default();

        match feature_queue.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().merge_count += 1,
            Entry::Vacant(entry) => {
                let source = self.resolve_source(key.extract_guid);
                let object = source
                    .as_ref()
                    .and_then(|_| self.location_registry.first_binding(key.extract_guid, feature_id))
                    .and_then(|location| self.resolve_object(location.set, location.binding));

                entry.insert(ReportMessage {
                    feature_id,
                    error_type,
                    message: text(),
                    source,
                    object,
                    merge_count: 1,
                });
            }
        }
    }

    fn resolve_source(&self, extract_guid: ExtractGuid) -> Option<SourceLocation> {
        if extract_guid == NO_SOURCE {
            return None;
        }
        let extract = self.location_registry.extract(extract_guid)?;
        let file = self.location_registry.file(extract.file_uid)?;
        Some(SourceLocation {
            file: file.canonical_path,
            function: extract.function_name,
            line: extract.line,
            column: extract.column,
            text: extract.text,
        })
    }

    /// Stops resolving once `shader_connection_object_threshold` distinct
    /// objects have been resolved in the current `Report()` call, rather
    /// than blocking or erroring: the caller just gets `None` back, same as
    /// if nothing were bound. The counter only advances on an actual
    /// resolution, not on every lookup attempt.
    fn resolve_object(&self, set: u32, binding: u32) -> Option<ObjectInfo> {
        if self.resolved_objects_this_report.load(Ordering::Acquire) >= self.shader_connection_object_threshold {
            return None;
        }
        let object = self.object_table.resolve(set, binding)?;
        self.resolved_objects_this_report.fetch_add(1, Ordering::AcqRel);
        Some(object)
    }

    /// Concatenates every feature's outbound queue into one report and
    /// resets both the queues and the per-`Report()` object-resolution
    /// counter.
    pub fn report(&self) -> VkGpuValidationReport {
        let mut queues = self.queues.lock();
        self.resolved_objects_this_report.store(0, Ordering::Release);

        let mut messages = Vec::new();
        for (_, entries) in queues.drain() {
            messages.extend(entries.into_values());
        }
        VkGpuValidationReport { messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_table::DescriptorSetTable;

    fn aggregator(threshold: usize) -> ReportAggregator {
        ReportAggregator::new(Shared::new(LocationRegistry::default()), Shared::new(DescriptorSetTable::new()), threshold)
    }

    #[test]
    fn repeated_records_for_the_same_key_merge() {
        let aggregator = aggregator(4096);
        let key = GroupKey::new(NO_SOURCE, 0);
        aggregator.record(0, ValidationErrorType::ExportStability, key, || "nan/inf".into());
        aggregator.record(0, ValidationErrorType::ExportStability, key, || "nan/inf".into());
        aggregator.record(0, ValidationErrorType::ExportStability, key, || "nan/inf".into());

        let report = aggregator.report();
        assert_eq!(report.messages.len(), 1);
        assert_eq!(report.messages[0].merge_count, 3);
    }

    #[test]
    fn distinct_keys_produce_distinct_entries() {
        let aggregator = aggregator(4096);
        aggregator.record(0, ValidationErrorType::ResourceBounds, GroupKey::new(NO_SOURCE, 0), || "a".into());
        aggregator.record(0, ValidationErrorType::ResourceBounds, GroupKey::new(NO_SOURCE, 1), || "b".into());

        let report = aggregator.report();
        assert_eq!(report.messages.len(), 2);
    }

    #[test]
    fn report_drains_the_queues() {
        let aggregator = aggregator(4096);
        aggregator.record(0, ValidationErrorType::LoopTermination, GroupKey::new(NO_SOURCE, 0), || "stuck".into());
        assert_eq!(aggregator.report().messages.len(), 1);
        assert_eq!(aggregator.report().messages.len(), 0);
    }

    #[test]
    fn resolving_a_missing_extract_leaves_source_and_object_unset() {
        let aggregator = aggregator(4096);
        aggregator.record(0, ValidationErrorType::ResourceBounds, GroupKey::new(123, 0), || "oob".into());
        let report = aggregator.report();
        assert!(report.messages[0].source.is_none());
        assert!(report.messages[0].object.is_none());
    }
}
