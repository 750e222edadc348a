use crate::ids::{Id, IdAllocator};
use crate::inst::Instruction;
use crate::types::{TypeKind, TypeTable};

/// Module-wide capabilities the rewriter may need to request, per the
/// module-level setup step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ImageQuery,
    ShaderAtomicCounter,
    StorageBufferStorageClass,
}

/// Where one instruction came from in the shader's original (preprocessed)
/// source, as the front end that decoded this module recorded it — e.g.
/// from SPIR-V `OpLine`/`OpSource` debug instructions. `internal_file_id`
/// matches the discovery order [`crate::ReflectedSource::reflect`] assigns
/// its virtual files, so it can be resolved through
/// [`crate::ReflectedSource::extract_for`] without re-parsing anything.
#[derive(Debug, Clone)]
pub struct SourceLocation {
    pub internal_file_id: u32,
    pub function_name: Option<String>,
    pub line: u32,
    pub column: u32,
}

/// A basic block: a label identity and its straight-line instruction list,
/// always ending in a terminator once the module is well-formed.
///
/// `locations` is parallel to `instructions` when the front end populated
/// it, but is allowed to be shorter (or empty) — instructions this
/// rewriter splices in itself (guards, φs, diagnostic exports) never have
/// a source location and are never added to it. Index lookups past the
/// end of `locations` simply resolve to "no location", same as an
/// explicit `None` entry.
#[derive(Debug, Clone)]
pub struct Block {
    pub label: Id,
    pub instructions: Vec<Instruction>,
    pub locations: Vec<Option<SourceLocation>>,
}

impl Block {
    pub fn new(label: Id) -> Self {
        Self {
            label,
            instructions: Vec::new(),
            locations: Vec::new(),
        }
    }

    /// The source location of `instructions[index]`, if the front end
    /// recorded one.
    pub fn location_at(&self, index: usize) -> Option<&SourceLocation> {
        self.locations.get(index).and_then(|l| l.as_ref())
    }
}

/// A function: its SSA result id, return type, and ordered basic blocks.
/// The first block is the entry block.
#[derive(Debug, Clone)]
pub struct Function {
    pub id: Id,
    pub return_type: Id,
    pub is_void: bool,
    pub blocks: Vec<Block>,
}

impl Function {
    pub fn entry_block(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn block_index(&self, label: Id) -> Option<usize> {
        self.blocks.iter().position(|b| b.label == label)
    }
}

/// A single shader module, dialect-agnostic: types, global variables,
/// functions, and the module-level capability/ext-inst-import requirements
/// the rewriter may add to. This is the one shape SPIR-V, DXIL, and DXBC
/// front ends all lower into before any instrumentation pass runs.
#[derive(Debug, Clone)]
pub struct Module {
    pub ids: IdAllocator,
    pub types: TypeTable,
    pub global_variables: Vec<Instruction>,
    pub functions: Vec<Function>,
    pub capabilities: Vec<Capability>,
    pub ext_inst_imports: Vec<String>,
    pub entry_point: Id,
}

impl Module {
    pub fn new(entry_point: Id, original_bound: u32) -> Self {
        Self {
            ids: IdAllocator::starting_after(original_bound),
            types: TypeTable::new(),
            global_variables: Vec::new(),
            functions: Vec::new(),
            capabilities: Vec::new(),
            ext_inst_imports: Vec::new(),
            entry_point,
        }
    }

    /// Adds `capability` unless it is already required.
    pub fn require_capability(&mut self, capability: Capability) {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
    }

    /// Adds `name` (e.g. `"GLSL.std.450"`) unless it is already imported.
    pub fn require_ext_inst_import(&mut self, name: &str) {
        if !self.ext_inst_imports.iter().any(|n| n == name) {
            self.ext_inst_imports.push(name.to_string());
        }
    }

    pub fn function_mut(&mut self, id: Id) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.id == id)
    }

    /// Interns `kind` through this module's type table, allocating a fresh
    /// id from this module's allocator if it hasn't been declared yet.
    pub fn intern_type(&mut self, kind: TypeKind) -> Id {
        self.types.intern(&self.ids, kind)
    }
}
