use fnv::{FnvHashMap, FnvHasher};
use parking_lot::Mutex;
use std::hash::{Hash, Hasher};

use crate::{
    parse::{clean_dxc_path, clean_path, parse_line_directive, strip_folders},
    types::{
        DescriptorLocation, ExtractInfo, ExtractRecord, FileInfo, FileRecord, LineOffset,
        SourceExtractCacheEntry, VirtualFile, EXTRACT_GUID_BITS, NO_SOURCE,
    },
    ExtractGuid, FileUid, LocationRegistryError,
};

#[derive(Default)]
pub(crate) struct Data {
    pub(crate) source_extracts: FnvHashMap<String, Vec<SourceExtractCacheEntry>>,
    pub(crate) files: Vec<FileRecord>,
    pub(crate) extracts: Vec<ExtractRecord>,
    pub(crate) extract_lut: FnvHashMap<u64, ExtractGuid>,
}

/// Owns the mapping `extract-GUID <-> (file, line span, function name,
/// source text, descriptor binding)`. Every public method acquires a
/// single mutex for its duration and returns results by copy — there is
/// no long-lived borrow for callers to hold across a lock.
pub struct LocationRegistry {
    data: Mutex<Data>,
    strip_folders: bool,
}

impl Default for LocationRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}

impl LocationRegistry {
    pub fn new(strip_folders: bool) -> Self {
        Self {
            data: Mutex::new(Data::default()),
            strip_folders,
        }
    }

    /// Registers the preprocessed source of a shader module, walking
    /// `#line N "path"` directives to recover the set of virtual files it
    /// was assembled from. Deduplicates on a hash of `preprocessed_source`
    /// scoped to `module_name`.
    pub fn register_source_extract(
        &self,
        module_name: &str,
        module_path: &str,
        preprocessed_source: &str,
    ) -> Vec<VirtualFile> {
        let mut data = self.data.lock();

        let hash = fnv_hash_bytes(preprocessed_source.as_bytes());
        if let Some(entries) = data.source_extracts.get(module_name) {
            if let Some(entry) = entries.iter().find(|e| e.source_hash == hash) {
                return entry.mappings.clone();
            }
        }

        let mappings = ingest_source(
            &mut data,
            module_name,
            module_path,
            preprocessed_source,
            self.strip_folders,
        );

        data.source_extracts
            .entry(module_name.to_string())
            .or_default()
            .push(SourceExtractCacheEntry {
                source_hash: hash,
                mappings: mappings.clone(),
            });

        mappings
    }

    /// Returns a previously-assigned GUID if `(file, function, line,
    /// column)` was seen before; otherwise appends a new extract record.
    ///
    /// Handles the DXC quirk where the line operand points one past the end
    /// of a preprocessed line: if `column >= line_length`, advances to the
    /// next line and subtracts its length from `column`.
    pub fn register_line_extract(
        &self,
        file_uid: FileUid,
        function_name: Option<&str>,
        line: u32,
        column: u32,
    ) -> Result<ExtractGuid, LocationRegistryError> {
        let mut data = self.data.lock();

        let cache_key = extract_cache_key(file_uid, function_name, line, column);
        if let Some(&guid) = data.extract_lut.get(&cache_key) {
            return Ok(guid);
        }

        let guid = data.extracts.len() as u64;
        if guid >= (1u64 << EXTRACT_GUID_BITS) {
            tracing::error!(
                "location registry is out of extract space, consider increasing EXTRACT_GUID_BITS"
            );
            return Err(LocationRegistryError::ExtractSpaceExhausted);
        }
        let guid = guid as ExtractGuid;

        let file = data
            .files
            .get(file_uid as usize)
            .ok_or(LocationRegistryError::UnknownFile(file_uid))?
            .clone();

        if file.line_offsets.len() < 2 {
            return Err(LocationRegistryError::MalformedFile(file_uid));
        }

        let mut line = line;
        let mut column = column;
        let mut line_offset = ((file.line_offsets.len() - 2) as u32).min(line.saturating_sub(1)) as usize;

        let mut begin = file.line_offsets[line_offset].offset;
        if line_offset < file.line_offsets.len() - 1 {
            let next = file.line_offsets[line_offset + 1].offset;
            let line_characters = next - begin;
            if line_characters <= column {
                column -= line_characters;
                line += 1;
                line_offset += 1;
                begin = file.line_offsets[line_offset].offset;
            }
        }

        let end = if line_offset == file.line_offsets.len() - 1 {
            file.preprocessed_source.len() as u32
        } else {
            file.line_offsets[line_offset + 1].offset
        };

        let mut text = file.preprocessed_source[begin as usize..end as usize]
            .replace('\n', "");
        let trimmed = text.trim_matches(' ');
        if trimmed.len() != text.len() {
            text = trimmed.to_string();
        }

        data.extracts.push(ExtractRecord {
            file_uid,
            function_name: function_name.map(str::to_string),
            begin_offset: begin,
            end_offset: end,
            line,
            column,
            text,
            bindings: Vec::new(),
        });
        data.extract_lut.insert(cache_key, guid);

        Ok(guid)
    }

    /// Associates a descriptor location with an extract for a given
    /// feature. Multiple bindings per `(extract, feature)` are permitted;
    /// [`Self::first_binding`] returns the first match.
    pub fn register_extract_binding(
        &self,
        extract_guid: ExtractGuid,
        feature_id: u16,
        set: u32,
        binding: u32,
    ) -> Result<(), LocationRegistryError> {
        let mut data = self.data.lock();
        let extract = data
            .extracts
            .get_mut(extract_guid as usize)
            .ok_or(LocationRegistryError::UnknownExtract(extract_guid))?;
        extract.bindings.push(DescriptorLocation {
            feature_id,
            set,
            binding,
        });
        Ok(())
    }

    pub fn file(&self, file_uid: FileUid) -> Option<FileInfo> {
        let data = self.data.lock();
        data.files.get(file_uid as usize).map(|f| FileInfo {
            module_name: f.module_name.clone(),
            module_path: f.module_path.clone(),
            canonical_path: f.canonical_path.clone(),
            preprocessed_source: f.preprocessed_source.clone(),
        })
    }

    pub fn extract(&self, guid: ExtractGuid) -> Option<ExtractInfo> {
        if guid == NO_SOURCE {
            return None;
        }
        let data = self.data.lock();
        data.extracts.get(guid as usize).map(|e| ExtractInfo {
            file_uid: e.file_uid,
            function_name: e.function_name.clone(),
            begin_offset: e.begin_offset,
            end_offset: e.end_offset,
            line: e.line,
            column: e.column,
            text: e.text.clone(),
            bindings: e.bindings.clone(),
        })
    }

    pub fn first_binding(&self, guid: ExtractGuid, feature_id: u16) -> Option<DescriptorLocation> {
        let data = self.data.lock();
        data.extracts
            .get(guid as usize)?
            .bindings
            .iter()
            .find(|b| b.feature_id == feature_id)
            .copied()
    }

    pub(crate) fn with_data<R>(&self, f: impl FnOnce(&Data) -> R) -> R {
        f(&self.data.lock())
    }

    pub(crate) fn replace_data(&self, data: Data) {
        *self.data.lock() = data;
    }
}

pub(crate) fn extract_cache_key(file_uid: FileUid, function_name: Option<&str>, line: u32, column: u32) -> u64 {
    let mut hasher = FnvHasher::default();
    file_uid.hash(&mut hasher);
    function_name.unwrap_or("").hash(&mut hasher);
    line.hash(&mut hasher);
    column.hash(&mut hasher);
    hasher.finish()
}

fn fnv_hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    bytes.hash(&mut hasher);
    hasher.finish()
}

/// Walks `source` tracking `#line` directives, appending a virtual
/// [`FileRecord`] (or resuming an existing one) each time a new one is
/// found, and recording per-line byte offsets for [`LocationRegistry::register_line_extract`].
fn ingest_source(
    data: &mut Data,
    module_name: &str,
    module_path: &str,
    source: &str,
    strip: bool,
) -> Vec<VirtualFile> {
    let mut mappings = Vec::new();
    let mut local_mapping: FnvHashMap<String, FileUid> = FnvHashMap::default();
    let mut current: Option<FileUid> = None;
    let mut preprocessed_begin = 0usize;

    let bytes = source.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'#' => {
                if let Some((line, path, directive_len)) = parse_line_directive(&source[i..]) {
                    if let Some(uid) = current {
                        let text = &source[preprocessed_begin..i];
                        data.files[uid as usize].preprocessed_source.push_str(text);
                    }
                    preprocessed_begin = i;

                    if let Some(&existing) = local_mapping.get(&path) {
                        current = Some(existing);
                        if line > 0 {
                            let file = &mut data.files[existing as usize];
                            file.line_offsets
                                .resize((line as usize).saturating_sub(1), LineOffset::default());
                        }
                    } else {
                        let uid = data.files.len() as FileUid;

                        let mut canonical_path = clean_dxc_path(&path);
                        let mut mod_path = clean_path(module_path);
                        if strip {
                            canonical_path = strip_folders(&canonical_path);
                            mod_path = strip_folders(&mod_path);
                        }

                        data.files.push(FileRecord {
                            module_name: module_name.to_string(),
                            module_path: mod_path,
                            canonical_path,
                            preprocessed_source: String::new(),
                            line_offsets: Vec::new(),
                        });

                        local_mapping.insert(path.clone(), uid);
                        mappings.push(VirtualFile {
                            virtual_path: path,
                            file_uid: uid,
                        });
                        current = Some(uid);
                    }

                    i += directive_len;
                    continue;
                }
            }
            b'\n' => {
                if let Some(uid) = current {
                    let file = &mut data.files[uid as usize];
                    let offset = file.preprocessed_source.len() as u32 + (i - preprocessed_begin) as u32;
                    file.line_offsets.push(LineOffset { offset });
                }
            }
            _ => {}
        }
        i += 1;
    }

    if let Some(uid) = current {
        data.files[uid as usize]
            .preprocessed_source
            .push_str(&source[preprocessed_begin..]);
    }

    mappings
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "#line 1 \"a.hlsl\"\nfloat4 main {\n    return 0;\n}\n";

    #[test]
    fn registers_and_dedups_source_extract() {
        let registry = LocationRegistry::new(false);
        let a = registry.register_source_extract("mod", "path/mod.hlsl", SOURCE);
        let b = registry.register_source_extract("mod", "path/mod.hlsl", SOURCE);
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].virtual_path, "a.hlsl");
    }

    #[test]
    fn line_extract_is_cached_and_trimmed() {
        let registry = LocationRegistry::new(false);
        let mapping = registry.register_source_extract("mod", "path/mod.hlsl", SOURCE);
        let file_uid = mapping[0].file_uid;

        let guid_a = registry
            .register_line_extract(file_uid, Some("main"), 3, 4)
            .unwrap();
        let guid_b = registry
            .register_line_extract(file_uid, Some("main"), 3, 4)
            .unwrap();
        assert_eq!(guid_a, guid_b);

        let extract = registry.extract(guid_a).unwrap();
        assert_eq!(extract.text, "return 0;");
    }

    #[test]
    fn distinct_extracts_get_distinct_guids() {
        let registry = LocationRegistry::new(false);
        let mapping = registry.register_source_extract("mod", "path/mod.hlsl", SOURCE);
        let file_uid = mapping[0].file_uid;

        let guid_a = registry
            .register_line_extract(file_uid, Some("main"), 2, 0)
            .unwrap();
        let guid_b = registry
            .register_line_extract(file_uid, Some("main"), 3, 4)
            .unwrap();
        assert_ne!(guid_a, guid_b);
    }

    #[test]
    fn strip_folders_shortens_reported_paths() {
        let registry = LocationRegistry::new(true);
        let mapping = registry.register_source_extract("mod", "dir/sub/mod.hlsl", SOURCE);
        let file = registry.file(mapping[0].file_uid).unwrap();
        assert_eq!(file.canonical_path, "a.hlsl");
    }

    #[test]
    fn binding_lookup_returns_first_match() {
        let registry = LocationRegistry::new(false);
        let mapping = registry.register_source_extract("mod", "path/mod.hlsl", SOURCE);
        let file_uid = mapping[0].file_uid;
        let guid = registry
            .register_line_extract(file_uid, Some("main"), 2, 0)
            .unwrap();

        registry.register_extract_binding(guid, 0, 1, 2).unwrap();
        registry.register_extract_binding(guid, 0, 3, 4).unwrap();

        let binding = registry.first_binding(guid, 0).unwrap();
        assert_eq!((binding.set, binding.binding), (1, 2));
    }
}
