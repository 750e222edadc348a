use bitflags::bitflags;

bitflags! {
    /// Bitset of enabled validation features. Assigned at install time and
    /// whenever the host re-activates validation with a new mask (see
    /// `gv-shader-compiler`/`gv-pipeline-compiler` for the rebuild this
    /// triggers).
    ///
    /// Bits 5..31 are reserved for feature passes not yet defined by this
    /// core; a `FeatureMask` round-trips them unchanged through
    /// (de)serialization so a newer host and an older rewriter can coexist
    /// without silently dropping bits they don't understand.
    #[derive(Default, serde::Serialize, serde::Deserialize)]
    pub struct FeatureMask: u32 {
        const RESOURCE_BOUNDS          = 1 << 0;
        const DESCRIPTOR_ARRAY_BOUNDS  = 1 << 1;
        const EXPORT_STABILITY         = 1 << 2;
        const LOOP_TERMINATION         = 1 << 3;
        const RESOURCE_INITIALIZATION  = 1 << 4;
    }
}

impl FeatureMask {
    /// The feature passes this core ships an implementation for, i.e. every
    /// bit `gv-features` can actually register a pass for.
    pub const KNOWN: Self = Self::from_bits_truncate(
        Self::RESOURCE_BOUNDS.bits()
            | Self::DESCRIPTOR_ARRAY_BOUNDS.bits()
            | Self::EXPORT_STABILITY.bits()
            | Self::LOOP_TERMINATION.bits()
            | Self::RESOURCE_INITIALIZATION.bits(),
    );
}
