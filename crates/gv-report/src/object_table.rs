use fnv::FnvHashMap;
use parking_lot::Mutex;

use crate::types::ObjectInfo;

/// Tracks which object is currently bound at each `(set, binding)` pair, so
/// the report bridge can decorate a message's resolved descriptor binding
/// with a name/handle. The raw descriptor-set update call this mirrors is
/// out of scope (see `gv-core::GraphicsApi`'s design notes), so the host is
/// expected to call `bind`/`unbind` itself whenever it observes the
/// underlying API's debug-utils object naming or a descriptor-set update
/// that changes what a binding points at. There is no explicit descriptor-
/// set "version" counter: a binding's current entry always reflects
/// whatever the host last told this table, which is what "currently
/// tracked" means here.
#[derive(Default)]
pub struct DescriptorSetTable {
    bindings: Mutex<FnvHashMap<(u32, u32), ObjectInfo>>,
}

impl DescriptorSetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, set: u32, binding: u32, info: ObjectInfo) {
        self.bindings.lock().insert((set, binding), info);
    }

    pub fn unbind(&self, set: u32, binding: u32) {
        self.bindings.lock().remove(&(set, binding));
    }

    pub fn resolve(&self, set: u32, binding: u32) -> Option<ObjectInfo> {
        self.bindings.lock().get(&(set, binding)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_bound_object_by_set_and_binding() {
        let table = DescriptorSetTable::new();
        table.bind(1, 2, ObjectInfo { name: Some("shadow_map".into()), handle: 0xabc });
        assert_eq!(
            table.resolve(1, 2),
            Some(ObjectInfo { name: Some("shadow_map".into()), handle: 0xabc })
        );
    }

    #[test]
    fn unbind_clears_the_entry() {
        let table = DescriptorSetTable::new();
        table.bind(0, 0, ObjectInfo { name: None, handle: 1 });
        table.unbind(0, 0);
        assert_eq!(table.resolve(0, 0), None);
    }

    #[test]
    fn unbound_binding_resolves_to_none() {
        let table = DescriptorSetTable::new();
        assert_eq!(table.resolve(9, 9), None);
    }
}
