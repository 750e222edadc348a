use gv_core::FeatureMask;
use serde::Deserialize;

/// The out-of-process replay input: which features were active when the
/// exports below were captured (so the same `DiagnosticRegistry`/
/// `FeatureSet` UID assignment can be rebuilt deterministically), the
/// threshold that capped object resolution, and one `[counter,
/// payload...]` export-buffer dump per drain the live session performed.
#[derive(Debug, Deserialize)]
pub struct DiagnosticLog {
    pub feature_mask: FeatureMask,
    pub shader_connection_object_threshold: usize,
    pub exports: Vec<Vec<u32>>,
}
