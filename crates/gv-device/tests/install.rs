use std::sync::Arc;

use gv_core::{FeatureMask, LogCallback, NullGraphicsApi, ValidationConfig};
use gv_report::ObjectInfo;
use gv_shader_compiler::NullModuleEncoder;

fn log_callback() -> LogCallback {
    Arc::new(|_severity, _file, _line, _message| {})
}

#[test]
fn install_brings_up_every_component_with_the_requested_feature_mask() {
    let config = ValidationConfig {
        feature_mask: FeatureMask::RESOURCE_BOUNDS | FeatureMask::EXPORT_STABILITY,
        ..ValidationConfig::default()
    };

    let device = gv_device::install(NullGraphicsApi::new(), NullModuleEncoder, config, log_callback(), None, None).unwrap();

    assert_eq!(
        device.shader_compiler().feature_mask(),
        FeatureMask::RESOURCE_BOUNDS | FeatureMask::EXPORT_STABILITY
    );
    assert_eq!(device.report().messages.len(), 0);
}

#[test]
fn submission_lifecycle_round_trips_through_the_tracker() {
    let device = gv_device::install(
        NullGraphicsApi::new(),
        NullModuleEncoder,
        ValidationConfig::default(),
        log_callback(),
        None,
        None,
    )
    .unwrap();

    let (slot, progress) = device.begin_submission().unwrap();
    progress.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    device.end_submission(slot);

    // The slot is free again once ended.
    assert!(device.begin_submission().is_some());
}

#[test]
fn bound_descriptor_is_visible_through_the_device_state() {
    let device = gv_device::install(
        NullGraphicsApi::new(),
        NullModuleEncoder,
        ValidationConfig::default(),
        log_callback(),
        None,
        None,
    )
    .unwrap();

    device.bind_descriptor(0, 2, ObjectInfo { handle: 42, name: Some("gbuffer".into()) });
    device.unbind_descriptor(0, 2);
}
