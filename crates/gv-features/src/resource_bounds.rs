use gv_core::Uid;
use gv_ir::{GuardedRewrite, Id, InnerGuard, Instruction, Module, ReflectedSource, RewritePass, RewriteShape, SourceLocation, TypeKind};
use gv_location_registry::{LocationRegistry, NO_SOURCE};

use crate::export::{self, opcode};

/// This pass's message shape: a single always-present 1-dword detail chunk
/// carrying the resolved extract-GUID for the offending instruction (see
/// `resource_bounds.rs`'s `build`), or `NO_SOURCE` when the front end
/// didn't record a location for it.
pub const MESSAGE_SHAPE: gv_diagnostic_registry::MessageShape = gv_diagnostic_registry::MessageShape::Chunked { chunk_dword_counts: &[1] };

/// Guards `ImageRead`/`ImageFetch`/`ImageWrite` against an out-of-bounds
/// address: queries the image's size, compares against the access
/// coordinate, and exports a `ResourceBounds` message on a miss. Reads and
/// fetches return a null result on the failing path; writes are simply
/// skipped.
pub struct ResourceBoundsPass<'a> {
    uid: Uid,
    export_buffer: Id,
    export_capacity_dwords: u32,
    location_registry: &'a LocationRegistry,
    reflected_source: &'a ReflectedSource,
}

impl<'a> ResourceBoundsPass<'a> {
    /// `uid` is allocated once per device-state (see `gv-shader-compiler`'s
    /// feature registration step); `export_buffer`/`export_capacity_dwords`
    /// are re-supplied for every module this pass instruments, since the
    /// buffer's id and layout are specific to that module's own
    /// `ModuleSetup::run` output. `location_registry`/`reflected_source`
    /// resolve each offending instruction's extract-GUID; both are scoped
    /// to this one compile.
    pub fn new(
        uid: Uid,
        export_buffer: Id,
        export_capacity_dwords: u32,
        location_registry: &'a LocationRegistry,
        reflected_source: &'a ReflectedSource,
    ) -> Self {
        Self {
            uid,
            export_buffer,
            export_capacity_dwords,
            location_registry,
            reflected_source,
        }
    }
}

impl<'a> RewritePass for ResourceBoundsPass<'a> {
    fn name(&self) -> &'static str {
        "resource_bounds"
    }

    fn interesting(&self, _module: &Module, inst: &Instruction) -> bool {
        matches!(
            inst,
            Instruction::ImageRead { .. } | Instruction::ImageFetch { .. } | Instruction::ImageWrite { .. }
        )
    }

    fn build(&mut self, module: &mut Module, inst: &Instruction, location: Option<&SourceLocation>) -> RewriteShape {
        let uint_ty = module.intern_type(TypeKind::Int { signed: false, width: 32 });
        let bool_ty = module.intern_type(TypeKind::Bool);

        let (image, coordinate, result) = match inst {
            Instruction::ImageRead { image, coordinate, result, result_type, .. } => (*image, *coordinate, Some((*result, *result_type))),
            Instruction::ImageFetch { image, coordinate, result, result_type, .. } => (*image, *coordinate, Some((*result, *result_type))),
            Instruction::ImageWrite { image, coordinate, .. } => (*image, *coordinate, None),
            _ => unreachable!("interesting() only accepts image ops"),
        };

        let size = module.ids.fresh();
        let mut check = vec![Instruction::ImageQuerySize {
            result: size,
            result_type: uint_ty,
            image,
        }];
        let cmp = export::binary_op(module, opcode::U_GREATER_THAN_EQUAL, bool_ty, coordinate, size, &mut check);
        let check_cond = module.ids.fresh();
        check.push(Instruction::Any {
            result: check_cond,
            result_type: bool_ty,
            vector: cmp,
        });

        // 1-bit image/buffer tag; this engine only models sampled/storage
        // images, so the tag is always "image" (0). Left explicit for a
        // future buffer-bounds variant of this pass to flip it.
        let is_buffer_access = 0u16;
        let word0 = module.ids.fresh();
        let word0_value = export::pack_single_chunk_header(self.uid, is_buffer_access);
        let guid = location
            .and_then(|loc| {
                self.reflected_source
                    .extract_for(self.location_registry, loc.internal_file_id, loc.function_name.as_deref(), loc.line, loc.column)
            })
            .unwrap_or(NO_SOURCE);
        let guid_word = module.ids.fresh();

        let mut error = vec![
            Instruction::ConstantU32 { result: word0, result_type: uint_ty, value: word0_value },
            Instruction::ConstantU32 { result: guid_word, result_type: uint_ty, value: guid },
        ];

        let neutral_result = result.map(|(_, result_type)| {
            let null = module.ids.fresh();
            error.push(Instruction::Undef { result: null, result_type });
            null
        });

        let guarded = export::emit(module, self.export_buffer, uint_ty, self.export_capacity_dwords, &[word0, guid_word]);

        RewriteShape::Guard(GuardedRewrite {
            check,
            check_cond,
            offending_extra: Vec::new(),
            error,
            neutral_result,
            inner_guard: Some(InnerGuard {
                check: guarded.check,
                check_cond: guarded.check_cond,
                inner: guarded.writes,
            }),
        })
    }
}
