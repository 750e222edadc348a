use gv_core::{GraphicsApi, LogCallback, LogSeverityMask, Shared, ValidationConfig};
use gv_diagnostic_registry::DiagnosticRegistry;
use gv_export::DrainReport;
use gv_location_registry::LocationRegistry;
use gv_pipeline_compiler::PipelineCompiler;
use gv_report::{install_handlers, DescriptorSetTable, ObjectInfo, ReportAggregator, VkGpuValidationReport};
use gv_scheduler::{HeartbeatConfig, HeartbeatScheduler, SubmissionTracker};
use gv_shader_compiler::{FeatureSet, ModuleEncoder, ShaderCompiler};
use gv_state::StateTables;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::FatalInstallError;

/// The per-device singleton: owns the location and diagnostic registries,
/// the shader-module/pipeline state tables, the shader and pipeline
/// compiler thread pools, the heart-beat scheduler, and the report bridge,
/// all built against one `GraphicsApi` implementation. Constructed by
/// [`install`], torn down by [`DeviceState::uninstall`] or by dropping it.
pub struct DeviceState<G: GraphicsApi, E: ModuleEncoder> {
    graphics_api: Shared<G>,
    diagnostics: Shared<DiagnosticRegistry>,
    location_registry: Shared<LocationRegistry>,
    object_table: Shared<DescriptorSetTable>,
    report_aggregator: Shared<ReportAggregator>,
    state_tables: Shared<StateTables<G>>,
    shader_compiler: ShaderCompiler<G, E>,
    pipeline_compiler: PipelineCompiler<G>,
    submission_tracker: Shared<SubmissionTracker>,
    heartbeat: HeartbeatScheduler,
    config: ValidationConfig,
}

/// Installs a device-state: allocates the export buffer and PRMT through
/// `graphics_api`, then brings up the registries, the two compiler thread
/// pools, the heart-beat scheduler, and the report bridge in that order.
/// `log_callback`/`log_severity_mask` are wired as a `tracing_subscriber`
/// layer for the process; installing a second device-state in the same
/// process reuses whatever layer the first one installed; only the first
/// caller's callback actually receives events; this matches `tracing`'s
/// one-global-subscriber-per-process model and is intentional, not a bug
/// to fix later.
pub fn install<G, E>(
    graphics_api: G,
    encoder: E,
    config: ValidationConfig,
    log_callback: LogCallback,
    heartbeat_config: Option<HeartbeatConfig>,
    worker_count: Option<usize>,
) -> Result<DeviceState<G, E>, FatalInstallError<G::Error>>
where
    G: GraphicsApi + Clone,
    E: ModuleEncoder + 'static,
{
    install_log_layer(log_callback, config.log_severity_mask);

    graphics_api
        .allocate_validation_resources(config.export_buffer_capacity)
        .map_err(FatalInstallError::ResourceAllocation)?;

    let diagnostics = DiagnosticRegistry::new();
    let feature_set = FeatureSet::new(&diagnostics, config.feature_mask)?;

    let location_registry = Shared::new(LocationRegistry::new(config.strip_folders));
    let object_table = Shared::new(DescriptorSetTable::new());
    let report_aggregator = Shared::new(ReportAggregator::new(
        location_registry.clone(),
        object_table.clone(),
        config.shader_connection_object_threshold,
    ));
    install_handlers(&diagnostics, &feature_set, report_aggregator.clone())?;

    let diagnostics = Shared::new(diagnostics);
    let state_tables = Shared::new(StateTables::new());
    let graphics_api = Shared::new(graphics_api);

    let shader_compiler = ShaderCompiler::new(
        (*graphics_api).clone(),
        encoder,
        diagnostics.clone(),
        location_registry.clone(),
        feature_set,
        &config,
        worker_count,
    );
    let pipeline_compiler = PipelineCompiler::new((*graphics_api).clone(), worker_count);

    let heartbeat_config = heartbeat_config.unwrap_or_default();
    let submission_tracker = Shared::new(SubmissionTracker::new(heartbeat_config.max_tracked_submissions));
    let heartbeat = HeartbeatScheduler::start(graphics_api.clone(), submission_tracker.clone(), heartbeat_config);

    tracing::info!(feature_mask = ?config.feature_mask, "device-state installed");

    Ok(DeviceState {
        graphics_api,
        diagnostics,
        location_registry,
        object_table,
        report_aggregator,
        state_tables,
        shader_compiler,
        pipeline_compiler,
        submission_tracker,
        heartbeat,
        config,
    })
}

fn install_log_layer(log_callback: LogCallback, mask: LogSeverityMask) {
    let layer = gv_core::HostLogLayer::new(log_callback, mask);
    let _ = tracing_subscriber::registry().with(layer).try_init();
}

impl<G: GraphicsApi, E: ModuleEncoder> DeviceState<G, E> {
    pub fn graphics_api(&self) -> &G {
        &self.graphics_api
    }

    pub fn diagnostics(&self) -> &DiagnosticRegistry {
        &self.diagnostics
    }

    pub fn location_registry(&self) -> &Shared<LocationRegistry> {
        &self.location_registry
    }

    pub fn state_tables(&self) -> &Shared<StateTables<G>> {
        &self.state_tables
    }

    pub fn shader_compiler(&self) -> &ShaderCompiler<G, E> {
        &self.shader_compiler
    }

    pub fn pipeline_compiler(&self) -> &PipelineCompiler<G> {
        &self.pipeline_compiler
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Records an object bound at `(set, binding)` so the report bridge can
    /// resolve it the next time a message references that binding.
    pub fn bind_descriptor(&self, set: u32, binding: u32, object: ObjectInfo) {
        self.object_table.bind(set, binding, object);
    }

    pub fn unbind_descriptor(&self, set: u32, binding: u32) {
        self.object_table.unbind(set, binding);
    }

    /// Walks `raw` (the export buffer's `[counter, payload...]` contents,
    /// read back from the device) and dispatches each message to its
    /// feature's handler, feeding the report bridge.
    pub fn drain_exports(&self, raw: &mut [u32]) -> DrainReport {
        gv_export::drain(raw, &self.diagnostics)
    }

    /// Claims a tracked slot for a new submission, for the heart-beat
    /// thread to watch; `None` once `max_tracked_submissions` are already
    /// in flight.
    pub fn begin_submission(&self) -> Option<(u32, Shared<std::sync::atomic::AtomicU64>)> {
        self.submission_tracker.begin()
    }

    pub fn end_submission(&self, slot: u32) {
        self.submission_tracker.end(slot);
    }

    /// Concatenates every feature's outstanding messages into one report
    /// and resets the bridge's internal queues.
    pub fn report(&self) -> VkGpuValidationReport {
        self.report_aggregator.report()
    }

    /// Explicit teardown entry point; equivalent to dropping the
    /// device-state, named so host integration code reads as
    /// install/uninstall pairs rather than relying on scope exit.
    pub fn uninstall(self) {
        tracing::info!("device-state uninstalled");
    }
}
