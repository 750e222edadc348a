use fnv::FnvHashMap;

use crate::ids::{Id, IdAllocator};

/// Storage class a pointer type is declared against, mirroring SPIR-V's
/// `StorageClass` operand (the one per-dialect distinction the rewriter
/// actually needs to reason about).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    Function,
    Private,
    StorageBuffer,
    Uniform,
    UniformConstant,
    PushConstant,
    Image,
}

/// A shader data type, structural enough to de-duplicate on. Grounded on
/// the `TypeDesc` shape used to describe shader-visible types elsewhere in
/// this ecosystem: primitives, composite, and pointer kinds, nothing more.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Bool,
    Int { signed: bool, width: u32 },
    Float { width: u32 },
    Vector { element: Id, count: u32 },
    RuntimeArray { element: Id },
    Array { element: Id, count: u32 },
    Struct { members: Vec<Id> },
    Pointer { pointee: Id, storage_class: StorageClass },
    Image,
}

/// De-duplicates type declarations across every pass that runs over a
/// module: two passes requesting `Vector(Bool, 4)` get back the same `Id`.
/// Mirrors the rewriter's "type re-use" invariant.
#[derive(Debug, Default, Clone)]
pub struct TypeTable {
    by_kind: FnvHashMap<TypeKind, Id>,
    declared: Vec<(Id, TypeKind)>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing `Id` for `kind` if one was already declared,
    /// otherwise allocates a new one and records the declaration.
    pub fn intern(&mut self, ids: &IdAllocator, kind: TypeKind) -> Id {
        if let Some(&id) = self.by_kind.get(&kind) {
            return id;
        }
        let id = ids.fresh();
        self.by_kind.insert(kind.clone(), id);
        self.declared.push((id, kind));
        id
    }

    /// All types declared so far, in declaration order (dependencies are
    /// always interned before the types that reference them, since
    /// `intern` is only ever called bottom-up by callers).
    pub fn declarations(&self) -> &[(Id, TypeKind)] {
        &self.declared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_kind_twice_returns_the_same_id() {
        let ids = IdAllocator::starting_after(100);
        let mut types = TypeTable::new();
        let a = types.intern(&ids, TypeKind::Bool);
        let b = types.intern(&ids, TypeKind::Bool);
        assert_eq!(a, b);
        assert_eq!(types.declarations().len(), 1);
    }

    #[test]
    fn distinct_kinds_get_distinct_ids() {
        let ids = IdAllocator::starting_after(100);
        let mut types = TypeTable::new();
        let bool_ty = types.intern(&ids, TypeKind::Bool);
        let uint_ty = types.intern(&ids, TypeKind::Int { signed: false, width: 32 });
        assert_ne!(bool_ty, uint_ty);

        let vec4_bool = types.intern(&ids, TypeKind::Vector { element: bool_ty, count: 4 });
        let vec4_bool_again = types.intern(&ids, TypeKind::Vector { element: bool_ty, count: 4 });
        assert_eq!(vec4_bool, vec4_bool_again);
    }
}
