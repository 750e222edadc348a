/// Every instrumented shader module gets the export buffer bound one set
/// past the host's last real descriptor set, at binding 0 within that set.
pub const EXPORT_BUFFER_BINDING: u32 = 0;

/// The export buffer's first member is a single atomic dword counter;
/// everything after it is the runtime-sized payload array.
pub const EXPORT_COUNTER_WORDS: u32 = 1;

/// Descriptor-set placement and payload size for one device-state's export
/// buffer.
#[derive(Debug, Clone, Copy)]
pub struct ExportBufferLayout {
    pub set: u32,
    pub binding: u32,
    pub capacity_dwords: u32,
}

impl ExportBufferLayout {
    /// `last_known_set` is the highest descriptor set index the source
    /// pipeline already uses; the export buffer claims the next one.
    pub fn new(last_known_set: u32, capacity_dwords: u32) -> Self {
        Self {
            set: last_known_set + 1,
            binding: EXPORT_BUFFER_BINDING,
            capacity_dwords,
        }
    }

    /// Total dword count of the backing buffer, counter word included.
    pub fn total_words(&self) -> u32 {
        EXPORT_COUNTER_WORDS + self.capacity_dwords
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_the_set_past_the_last_known_one() {
        let layout = ExportBufferLayout::new(3, 1024);
        assert_eq!(layout.set, 4);
        assert_eq!(layout.binding, 0);
        assert_eq!(layout.total_words(), 1025);
    }
}
