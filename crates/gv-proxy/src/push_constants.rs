use fnv::FnvHashMap;

use gv_diagnostic_registry::DiagnosticRegistry;

/// Appends one little-endian dword run per feature-declared push constant
/// after the application's own push-constant bytes, in the same
/// `enumerate_push_constants` order the IR rewriter's struct layout uses —
/// so the runtime values line up with the widened block the instrumented
/// module actually reads.
///
/// `feature_values` holds one dword per feature id; a feature with no entry
/// pushes zero. Declared constants wider than 4 bytes get that single dword
/// repeated across every word of their slot, which is enough for every
/// current feature pass (resource bounds, descriptor-array bounds, and loop
/// termination each declare a single pointer-sized or smaller value).
pub fn merge_push_constants(host_bytes: &[u8], diagnostics: &DiagnosticRegistry, feature_values: &FnvHashMap<u16, u32>) -> Vec<u8> {
    let mut merged = host_bytes.to_vec();
    for decl in diagnostics.enumerate_push_constants() {
        let words = ((decl.size_bytes + 3) / 4).max(1);
        let value = feature_values.get(&decl.feature_id).copied().unwrap_or(0);
        for _ in 0..words {
            merged.extend_from_slice(&value.to_le_bytes());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_dword_per_declared_constant_in_declaration_order() {
        let diagnostics = DiagnosticRegistry::new();
        let uid_a = diagnostics.allocate_push_constant_uid(0, 4);
        let uid_b = diagnostics.allocate_push_constant_uid(1, 4);
        let _ = (uid_a, uid_b);

        let mut values = FnvHashMap::default();
        values.insert(0u16, 0x1111_1111);
        values.insert(1u16, 0x2222_2222);

        let merged = merge_push_constants(&[0xAA, 0xBB], &diagnostics, &values);
        assert_eq!(&merged[..2], &[0xAA, 0xBB]);
        assert_eq!(&merged[2..6], &0x1111_1111u32.to_le_bytes());
        assert_eq!(&merged[6..10], &0x2222_2222u32.to_le_bytes());
    }

    #[test]
    fn missing_feature_value_pushes_zero() {
        let diagnostics = DiagnosticRegistry::new();
        diagnostics.allocate_push_constant_uid(0, 4);
        let merged = merge_push_constants(&[], &diagnostics, &FnvHashMap::default());
        assert_eq!(merged, 0u32.to_le_bytes().to_vec());
    }
}
