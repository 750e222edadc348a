//! Binary (de)serialization of a [`LocationRegistry`], so a separate host
//! process can render extracts fetched from a previously-run instrumentation.
//! Little-endian, fixed integer widths. The format is
//! internal and versioned by this crate (`FORMAT_VERSION`).
//!
//! Layout: `FORMAT_VERSION(u32)`, source-extract table, file table, extract
//! table, binding-mapping table (bindings are stored inline per extract
//! rather than as a separate top-level table, since they are never looked
//! up except through an extract).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use fnv::FnvHashMap;
use std::io::{Read, Write};

use crate::{
    registry::Data,
    types::{DescriptorLocation, ExtractRecord, FileRecord, LineOffset, SourceExtractCacheEntry, VirtualFile},
    LocationRegistry, LocationRegistryError,
};

const FORMAT_VERSION: u32 = 1;

fn write_string(w: &mut impl Write, s: &str) -> std::io::Result<()> {
    w.write_u32::<LittleEndian>(s.len() as u32)?;
    w.write_all(s.as_bytes())
}

fn read_string(r: &mut impl Read) -> std::io::Result<String> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn write_option_string(w: &mut impl Write, s: &Option<String>) -> std::io::Result<()> {
    match s {
        Some(s) => {
            w.write_u8(1)?;
            write_string(w, s)
        }
        None => w.write_u8(0),
    }
}

fn read_option_string(r: &mut impl Read) -> std::io::Result<Option<String>> {
    Ok(match r.read_u8()? {
        0 => None,
        _ => Some(read_string(r)?),
    })
}

impl LocationRegistry {
    /// Serializes this registry's contents to `w`.
    pub fn write_to(&self, w: &mut impl Write) -> Result<(), LocationRegistryError> {
        self.with_data(|data| write_data(w, data)).map_err(Into::into)
    }

    /// Rebuilds a registry from a stream produced by [`Self::write_to`],
    /// repopulating the `(file, fn, line, col) -> guid` lookup cache.
    pub fn read_from(r: &mut impl Read) -> Result<Self, LocationRegistryError> {
        let data = read_data(r)?;
        let registry = Self::new(false);
        registry.replace_data(data);
        Ok(registry)
    }
}

fn write_data(w: &mut impl Write, data: &Data) -> std::io::Result<()> {
    w.write_u32::<LittleEndian>(FORMAT_VERSION)?;

    // Source-extract table.
    w.write_u32::<LittleEndian>(data.source_extracts.len() as u32)?;
    for (module_name, entries) in &data.source_extracts {
        write_string(w, module_name)?;
        w.write_u32::<LittleEndian>(entries.len() as u32)?;
        for entry in entries {
            w.write_u64::<LittleEndian>(entry.source_hash)?;
            w.write_u32::<LittleEndian>(entry.mappings.len() as u32)?;
            for mapping in &entry.mappings {
                write_string(w, &mapping.virtual_path)?;
                w.write_u16::<LittleEndian>(mapping.file_uid)?;
            }
        }
    }

    // File table.
    w.write_u32::<LittleEndian>(data.files.len() as u32)?;
    for file in &data.files {
        write_string(w, &file.module_name)?;
        write_string(w, &file.module_path)?;
        write_string(w, &file.canonical_path)?;
        write_string(w, &file.preprocessed_source)?;
        w.write_u32::<LittleEndian>(file.line_offsets.len() as u32)?;
        for line in &file.line_offsets {
            w.write_u32::<LittleEndian>(line.offset)?;
        }
    }

    // Extract table (bindings carried inline).
    w.write_u32::<LittleEndian>(data.extracts.len() as u32)?;
    for extract in &data.extracts {
        w.write_u16::<LittleEndian>(extract.file_uid)?;
        write_option_string(w, &extract.function_name)?;
        w.write_u32::<LittleEndian>(extract.begin_offset)?;
        w.write_u32::<LittleEndian>(extract.end_offset)?;
        w.write_u32::<LittleEndian>(extract.line)?;
        w.write_u32::<LittleEndian>(extract.column)?;
        write_string(w, &extract.text)?;
        w.write_u32::<LittleEndian>(extract.bindings.len() as u32)?;
        for binding in &extract.bindings {
            w.write_u16::<LittleEndian>(binding.feature_id)?;
            w.write_u32::<LittleEndian>(binding.set)?;
            w.write_u32::<LittleEndian>(binding.binding)?;
        }
    }

    Ok(())
}

fn read_data(r: &mut impl Read) -> Result<Data, LocationRegistryError> {
    let version = r.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(LocationRegistryError::Corrupt(format!(
            "unsupported location-registry format version {version}"
        )));
    }

    let mut source_extracts = FnvHashMap::default();
    let module_count = r.read_u32::<LittleEndian>()?;
    for _ in 0..module_count {
        let module_name = read_string(r)?;
        let entry_count = r.read_u32::<LittleEndian>()?;
        let mut entries = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let source_hash = r.read_u64::<LittleEndian>()?;
            let mapping_count = r.read_u32::<LittleEndian>()?;
            let mut mappings = Vec::with_capacity(mapping_count as usize);
            for _ in 0..mapping_count {
                let virtual_path = read_string(r)?;
                let file_uid = r.read_u16::<LittleEndian>()?;
                mappings.push(VirtualFile { virtual_path, file_uid });
            }
            entries.push(SourceExtractCacheEntry { source_hash, mappings });
        }
        source_extracts.insert(module_name, entries);
    }

    let file_count = r.read_u32::<LittleEndian>()?;
    let mut files = Vec::with_capacity(file_count as usize);
    for _ in 0..file_count {
        let module_name = read_string(r)?;
        let module_path = read_string(r)?;
        let canonical_path = read_string(r)?;
        let preprocessed_source = read_string(r)?;
        let line_count = r.read_u32::<LittleEndian>()?;
        let mut line_offsets = Vec::with_capacity(line_count as usize);
        for _ in 0..line_count {
            line_offsets.push(LineOffset {
                offset: r.read_u32::<LittleEndian>()?,
            });
        }
        files.push(FileRecord {
            module_name,
            module_path,
            canonical_path,
            preprocessed_source,
            line_offsets,
        });
    }

    let extract_count = r.read_u32::<LittleEndian>()?;
    let mut extracts = Vec::with_capacity(extract_count as usize);
    let mut extract_lut = FnvHashMap::default();
    for guid in 0..extract_count {
        let file_uid = r.read_u16::<LittleEndian>()?;
        let function_name = read_option_string(r)?;
        let begin_offset = r.read_u32::<LittleEndian>()?;
        let end_offset = r.read_u32::<LittleEndian>()?;
        let line = r.read_u32::<LittleEndian>()?;
        let column = r.read_u32::<LittleEndian>()?;
        let text = read_string(r)?;
        let binding_count = r.read_u32::<LittleEndian>()?;
        let mut bindings = Vec::with_capacity(binding_count as usize);
        for _ in 0..binding_count {
            bindings.push(DescriptorLocation {
                feature_id: r.read_u16::<LittleEndian>()?,
                set: r.read_u32::<LittleEndian>()?,
                binding: r.read_u32::<LittleEndian>()?,
            });
        }

        let key = crate::registry::extract_cache_key(file_uid, function_name.as_deref(), line, column);
        extract_lut.insert(key, guid);

        extracts.push(ExtractRecord {
            file_uid,
            function_name,
            begin_offset,
            end_offset,
            line,
            column,
            text,
            bindings,
        });
    }

    Ok(Data {
        source_extracts,
        files,
        extracts,
        extract_lut,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_binary_format() {
        let registry = LocationRegistry::new(false);
        let mapping = registry.register_source_extract(
            "mod",
            "path/mod.hlsl",
            "#line 1 \"a.hlsl\"\nfloat4 main {\n    return 0;\n}\n",
        );
        let guid = registry
            .register_line_extract(mapping[0].file_uid, Some("main"), 3, 4)
            .unwrap();
        registry.register_extract_binding(guid, 0, 2, 5).unwrap();

        let mut buf = Vec::new();
        registry.write_to(&mut buf).unwrap();

        let restored = LocationRegistry::read_from(&mut buf.as_slice()).unwrap();
        let extract = restored.extract(guid).unwrap();
        assert_eq!(extract.text, "return 0;");
        assert_eq!(restored.first_binding(guid, 0).unwrap().set, 2);

        // The (file,fn,line,col) cache must be repopulated: re-registering
        // the same site returns the same GUID rather than a fresh one.
        let reregistered = restored
            .register_line_extract(mapping[0].file_uid, Some("main"), 3, 4)
            .unwrap();
        assert_eq!(reregistered, guid);
    }
}
