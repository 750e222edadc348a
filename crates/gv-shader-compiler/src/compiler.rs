use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use fnv::FnvHashMap;
use gv_core::{CommitSequence, CommitSequenceSnapshot, GraphicsApi, LoopConfig, Shared, ValidationConfig};
use gv_diagnostic_registry::DiagnosticRegistry;
use gv_ir::{Id, Module, ModuleSetup, StorageClass};
use gv_location_registry::LocationRegistry;

use crate::encoder::ModuleEncoder;
use crate::error::CompileError;
use crate::features::FeatureSet;
use crate::source_module::{InstrumentedModule, SourceModule};

struct Job<G: GraphicsApi> {
    source: Shared<SourceModule<G>>,
}

/// Everything a worker thread needs to turn a job into an instrumented
/// module, cloned once per thread at spawn time. Every field is itself
/// reference-counted or `Copy`, so cloning this is cheap.
struct WorkerContext<G: GraphicsApi, E: ModuleEncoder> {
    graphics_api: Shared<G>,
    encoder: Shared<E>,
    diagnostics: Shared<DiagnosticRegistry>,
    location_registry: Shared<LocationRegistry>,
    feature_set: Shared<FeatureSet>,
    loop_config: LoopConfig,
    initialization_detail: bool,
    export_buffer_capacity: u32,
    commit_sequence: Shared<CommitSequence>,
}

impl<G: GraphicsApi, E: ModuleEncoder> Clone for WorkerContext<G, E> {
    fn clone(&self) -> Self {
        Self {
            graphics_api: self.graphics_api.clone(),
            encoder: self.encoder.clone(),
            diagnostics: self.diagnostics.clone(),
            location_registry: self.location_registry.clone(),
            feature_set: self.feature_set.clone(),
            loop_config: self.loop_config.clone(),
            initialization_detail: self.initialization_detail,
            export_buffer_capacity: self.export_buffer_capacity,
            commit_sequence: self.commit_sequence.clone(),
        }
    }
}

impl<G: GraphicsApi, E: ModuleEncoder> WorkerContext<G, E> {
    fn process(&self, job: Job<G>) {
        let mask = self.feature_set.mask();
        if job.source.get_instrument(mask).is_none() {
            match build(
                &job.source,
                &self.diagnostics,
                &self.location_registry,
                &self.feature_set,
                &self.loop_config,
                self.initialization_detail,
                self.export_buffer_capacity,
                self.graphics_api.as_ref(),
                self.encoder.as_ref(),
            ) {
                Ok(instrumented) => job.source.publish(mask, Shared::new(instrumented)),
                Err(error) => tracing::error!(source_hash = ?job.source.source_hash, %error, "shader instrumentation failed"),
            }
        }
        self.commit_sequence.complete();
    }
}

fn worker_loop<G: GraphicsApi, E: ModuleEncoder>(ctx: WorkerContext<G, E>, rx: Receiver<Job<G>>) {
    while let Ok(job) = rx.recv() {
        ctx.process(job);
    }
}

/// Clones the pristine module, runs module-level setup and every enabled
/// feature pass, lowers the result through `encoder`, and hands the
/// resulting bytecode to the graphics API. `source.pristine` is never
/// mutated: `module` is an independent clone from the moment it's created,
/// matching the "never mutate the shared copy" discipline `gv-pipeline-
/// compiler`'s descriptor deep-copy step follows.
fn build<G: GraphicsApi, E: ModuleEncoder>(
    source: &SourceModule<G>,
    diagnostics: &DiagnosticRegistry,
    location_registry: &LocationRegistry,
    feature_set: &FeatureSet,
    loop_config: &LoopConfig,
    initialization_detail: bool,
    export_buffer_capacity: u32,
    graphics_api: &G,
    encoder: &E,
) -> Result<InstrumentedModule<G>, CompileError> {
    let mut module = source.pristine.clone();
    let resource_puids = collect_resource_puids(&module);

    let setup = ModuleSetup::run(&mut module, diagnostics, source.last_known_set, source.last_known_binding, export_buffer_capacity);
    feature_set.instrument(
        &mut module,
        &setup,
        &resource_puids,
        loop_config,
        initialization_detail,
        location_registry,
        &source.reflected_source,
    );

    let bytecode = encoder.encode(&module);
    let handle = graphics_api
        .create_shader_module(&bytecode)
        .map_err(|error| CompileError::GraphicsApiRejected(error.to_string()))?;

    Ok(InstrumentedModule {
        export_buffer_layout: setup.export_buffer_layout,
        handle,
    })
}

/// Assigns each tracked resource global variable its own packed token,
/// using the variable's own id as the token. A real resource-token registry
/// (mapping a descriptor set/binding pair to a stable token surviving
/// reflection across recompiles) doesn't exist anywhere in this workspace;
/// the variable id is stable for one module's lifetime, which is all
/// `resource_initialization`'s mask-buffer bit assignment needs.
fn collect_resource_puids(module: &Module) -> FnvHashMap<Id, u32> {
    module
        .global_variables
        .iter()
        .filter_map(|inst| match inst {
            gv_ir::Instruction::Variable {
                result,
                storage_class: StorageClass::UniformConstant | StorageClass::StorageBuffer | StorageClass::Image,
                ..
            } => Some((*result, result.0)),
            _ => None,
        })
        .collect()
}

/// Thread-pool-backed compiler: owns the worker threads that turn a
/// `SourceModule` into the instrumented variant matching this compiler's
/// currently active `FeatureMask`. A host changing the active mask builds
/// a new `ShaderCompiler` (and a new `FeatureSet` behind it) rather than
/// mutating this one in place, so that in-flight jobs against the old mask
/// always finish against a consistent `FeatureSet`.
pub struct ShaderCompiler<G: GraphicsApi, E: ModuleEncoder> {
    job_tx: Option<Sender<Job<G>>>,
    workers: Vec<JoinHandle<()>>,
    diagnostics: Shared<DiagnosticRegistry>,
    feature_set: Shared<FeatureSet>,
    commit_sequence: Shared<CommitSequence>,
    _encoder: std::marker::PhantomData<E>,
}

impl<G: GraphicsApi, E: ModuleEncoder> ShaderCompiler<G, E> {
    pub fn new(
        graphics_api: G,
        encoder: E,
        diagnostics: Shared<DiagnosticRegistry>,
        location_registry: Shared<LocationRegistry>,
        feature_set: FeatureSet,
        config: &ValidationConfig,
        worker_count: Option<usize>,
    ) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job<G>>();
        let commit_sequence = Shared::new(CommitSequence::new());
        let feature_set = Shared::new(feature_set);
        let graphics_api = Shared::new(graphics_api);
        let encoder = Shared::new(encoder);

        let ctx = WorkerContext {
            graphics_api,
            encoder,
            diagnostics: diagnostics.clone(),
            location_registry,
            feature_set: feature_set.clone(),
            loop_config: config.loop_config.clone(),
            initialization_detail: config.initialization_detail,
            export_buffer_capacity: config.export_buffer_capacity,
            commit_sequence: commit_sequence.clone(),
        };

        let worker_count = worker_count.unwrap_or_else(num_cpus::get).max(1);
        let workers = (0..worker_count)
            .map(|index| {
                let ctx = ctx.clone();
                let rx = job_rx.clone();
                std::thread::Builder::new()
                    .name(format!("gv-shader-compiler-{index}"))
                    .spawn(move || worker_loop(ctx, rx))
                    .expect("failed to spawn shader-compiler worker thread")
            })
            .collect();

        Self {
            job_tx: Some(job_tx),
            workers,
            diagnostics,
            feature_set,
            commit_sequence,
            _encoder: std::marker::PhantomData,
        }
    }

    pub fn feature_mask(&self) -> gv_core::FeatureMask {
        self.feature_set.mask()
    }

    pub fn diagnostics(&self) -> &DiagnosticRegistry {
        &self.diagnostics
    }

    /// Enqueues a build of `source` under this compiler's active feature
    /// mask, returning immediately. A cache hit (another job already built
    /// this exact `(source, mask)` pair) still costs a round trip through
    /// the worker pool, since dedup is checked pool-side rather than here,
    /// but never repeats the actual rewrite work.
    pub fn submit(&self, source: Shared<SourceModule<G>>) -> u64 {
        let sequence = self.commit_sequence.enqueue();
        let job_tx = self.job_tx.as_ref().expect("submit called after shutdown");
        if job_tx.send(Job { source }).is_err() {
            tracing::error!("shader-compiler worker pool is gone, dropping job");
        }
        sequence
    }

    pub fn capture_sequence(&self) -> CommitSequenceSnapshot {
        self.commit_sequence.capture()
    }

    pub fn is_reached(&self, snapshot: CommitSequenceSnapshot) -> bool {
        self.commit_sequence.is_reached(snapshot)
    }
}

impl<G: GraphicsApi, E: ModuleEncoder> Drop for ShaderCompiler<G, E> {
    fn drop(&mut self) {
        self.job_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
