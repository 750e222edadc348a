use gv_ir::Module;

/// The dialect-specific lowering step from this engine's mid-level IR to
/// the bytecode a real `GraphicsApi::create_shader_module` call expects.
/// Raw entry-point interception and dialect encoding are both out of scope
/// for this core (see `gv_features::export::opcode`'s `Opaque` convention,
/// which this trait is the natural other half of): a concrete SPIR-V/DXIL
/// backend is a separate crate a host integration supplies.
pub trait ModuleEncoder: Send + Sync {
    fn encode(&self, module: &Module) -> Vec<u8>;
}

/// Test double: encodes nothing, just reports how many instructions the
/// module contains across every function, so tests can assert the
/// rewriter actually ran without needing a real encoder.
#[derive(Debug, Default)]
pub struct NullModuleEncoder;

impl ModuleEncoder for NullModuleEncoder {
    fn encode(&self, module: &Module) -> Vec<u8> {
        let instruction_count: usize = module.functions.iter().flat_map(|f| f.blocks.iter()).map(|b| b.instructions.len()).sum();
        (instruction_count as u32).to_le_bytes().to_vec()
    }
}
