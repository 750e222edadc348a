use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use fnv::FnvHashMap;
use gv_core::{CommitSequence, CommitSequenceSnapshot, GraphicsApi, PipelineKind, Shared};
use gv_state::InstrumentedPipeline;

use crate::job::PipelineJob;

/// One partitioned batch of same-`PipelineKind` jobs, the unit a worker
/// pulls off the queue and runs start-to-finish before checking for more
/// work. Batching (rather than one job per channel message) amortizes the
/// channel round trip across `batch_size` jobs, capped at 64 per batch.
struct Batch<G: GraphicsApi> {
    jobs: Vec<PipelineJob<G>>,
}

fn batch_size(total: usize, worker_count: usize) -> usize {
    (total / worker_count.max(1)).clamp(1, 64)
}

/// Deep-copies the pipeline's stored creation descriptor, substitutes each
/// stage's instrumented module handle in turn, and asks the graphics API
/// to build the variant. A missing instrumented module or a rejected
/// creation descriptor fails only this one job; the pipeline is left
/// without that `combined_hash`'s instrumented variant and keeps using its
/// source pipeline until a later job succeeds.
fn compile_job<G: GraphicsApi>(job: PipelineJob<G>, graphics_api: &G) {
    let mut descriptor = job.pipeline.creation_descriptor.clone();

    for (stage_index, (stage, key)) in job.pipeline.stages.iter().zip(job.stage_keys.iter()).enumerate() {
        match stage.source.get_instrument(key.feature_mask()) {
            Some(instrumented) => graphics_api.substitute_stage(&mut descriptor, stage_index, &instrumented.handle),
            None => {
                tracing::warn!(
                    event = "PipelineMissingShaderKey",
                    stage_index,
                    source_hash = ?key.source_hash(),
                    "pipeline stage has no instrumented module for this feature mask yet, leaving pipeline uninstrumented"
                );
                return;
            }
        }
    }

    match graphics_api.create_pipeline(job.pipeline.kind, &descriptor) {
        Ok(handle) => job.pipeline.add_instrument(job.combined_hash, Shared::new(InstrumentedPipeline { handle })),
        Err(error) => tracing::error!(event = "PipelineCreationFailed", %error, "underlying graphics API rejected instrumented pipeline creation descriptor"),
    }
}

#[derive(Clone)]
struct WorkerContext<G: GraphicsApi> {
    graphics_api: Shared<G>,
    commit_sequence: Shared<CommitSequence>,
}

impl<G: GraphicsApi> WorkerContext<G> {
    fn process(&self, batch: Batch<G>) {
        for job in batch.jobs {
            compile_job(job, self.graphics_api.as_ref());
            self.commit_sequence.complete();
        }
    }
}

fn worker_loop<G: GraphicsApi>(ctx: WorkerContext<G>, rx: Receiver<Batch<G>>) {
    while let Ok(batch) = rx.recv() {
        ctx.process(batch);
    }
}

/// Thread-pool-backed pipeline compiler: partitions incoming jobs by
/// `PipelineKind` and hands each partition to the worker pool in batches,
/// so that two dissimilar pipeline types never share a batch (the
/// underlying API's pipeline-creation entry points differ per kind, and a
/// worker processing a batch never has to branch on kind mid-batch).
pub struct PipelineCompiler<G: GraphicsApi> {
    job_tx: Option<Sender<Batch<G>>>,
    workers: Vec<JoinHandle<()>>,
    commit_sequence: Shared<CommitSequence>,
    worker_count: usize,
}

impl<G: GraphicsApi> PipelineCompiler<G> {
    pub fn new(graphics_api: G, worker_count: Option<usize>) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Batch<G>>();
        let commit_sequence = Shared::new(CommitSequence::new());
        let ctx = WorkerContext {
            graphics_api: Shared::new(graphics_api),
            commit_sequence: commit_sequence.clone(),
        };

        let worker_count = worker_count.unwrap_or_else(num_cpus::get).max(1);
        let workers = (0..worker_count)
            .map(|index| {
                let ctx = ctx.clone();
                let rx = job_rx.clone();
                std::thread::Builder::new()
                    .name(format!("gv-pipeline-compiler-{index}"))
                    .spawn(move || worker_loop(ctx, rx))
                    .expect("failed to spawn pipeline-compiler worker thread")
            })
            .collect();

        Self {
            job_tx: Some(job_tx),
            workers,
            commit_sequence,
            worker_count,
        }
    }

    /// Enqueues every job in `jobs`, partitioned by pipeline kind and
    /// chunked to `max(1, min(total/worker_count, 64))` per batch. Returns
    /// the sequence number of the last job enqueued, for a later
    /// `is_reached` check.
    pub fn submit_batch(&self, jobs: Vec<PipelineJob<G>>) -> u64 {
        let mut by_kind: FnvHashMap<PipelineKind, Vec<PipelineJob<G>>> = FnvHashMap::default();
        for job in jobs {
            by_kind.entry(job.pipeline.kind).or_default().push(job);
        }

        let job_tx = self.job_tx.as_ref().expect("submit_batch called after shutdown");
        let mut sequence = 0;
        for (_, mut kind_jobs) in by_kind {
            let size = batch_size(kind_jobs.len(), self.worker_count);
            while !kind_jobs.is_empty() {
                let tail = kind_jobs.split_off(size.min(kind_jobs.len()));
                let chunk = std::mem::replace(&mut kind_jobs, tail);
                for _ in 0..chunk.len() {
                    sequence = self.commit_sequence.enqueue();
                }
                if job_tx.send(Batch { jobs: chunk }).is_err() {
                    tracing::error!("pipeline-compiler worker pool is gone, dropping batch");
                }
            }
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

impl<G: GraphicsApi> Drop for PipelineCompiler<G> {
    fn drop(&mut self) {
        self.job_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gv_core::{CombinedHash, FeatureMask, NullGraphicsApi, PipelineKind, ShaderInstrumentationKey, SourceHash};
    use gv_export::ExportBufferLayout;
    use gv_ir::{Id, Module};
    use gv_location_registry::LocationRegistry;
    use gv_shader_compiler::{InstrumentedModule, SourceModule};
    use gv_state::{PipelineState, ShaderModuleState, SlotTable};

    use super::*;

    fn wait_until_reached(compiler: &PipelineCompiler<NullGraphicsApi>, snapshot: CommitSequenceSnapshot) {
        for _ in 0..1000 {
            if compiler.is_reached(snapshot) {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("pipeline compile job never committed");
    }

    #[test]
    fn missing_instrumented_stage_leaves_pipeline_without_that_variant() {
        let compiler = PipelineCompiler::new(NullGraphicsApi::new(), Some(1));
        let registry = LocationRegistry::new(false);
        let source = SourceModule::new(SourceHash(1), Module::new(Id(1), 10), 0, 0, &registry, "test", "test.hlsl", "");
        let shader_modules: SlotTable<ShaderModuleState<NullGraphicsApi>> = SlotTable::new();
        let stage = shader_modules.insert(|index| ShaderModuleState::new(index, vec![], source.clone()));

        let pipelines: SlotTable<PipelineState<NullGraphicsApi>> = SlotTable::new();
        let pipeline = pipelines.insert(|index| PipelineState::new(index, PipelineKind::Graphics, Vec::new(), vec![stage], gv_core::NullPipeline(0)));

        let key = ShaderInstrumentationKey::new(SourceHash(1), FeatureMask::RESOURCE_BOUNDS);
        let combined_hash = CombinedHash::compute(&[key], &[]);
        let snapshot = compiler.submit_batch(vec![PipelineJob::new(pipeline.clone(), combined_hash, vec![key])]);
        wait_until_reached(&compiler, snapshot);

        assert!(pipeline.get_instrument(combined_hash).is_none());
    }

    #[test]
    fn present_instrumented_stage_publishes_a_pipeline_variant() {
        let compiler = PipelineCompiler::new(NullGraphicsApi::new(), Some(1));
        let registry = LocationRegistry::new(false);
        let source = SourceModule::new(SourceHash(2), Module::new(Id(1), 10), 0, 0, &registry, "test", "test.hlsl", "");
        source.publish(
            FeatureMask::RESOURCE_BOUNDS,
            Shared::new(InstrumentedModule {
                export_buffer_layout: ExportBufferLayout::new(0, 1024),
                handle: gv_core::NullShaderModule(0),
            }),
        );

        let shader_modules: SlotTable<ShaderModuleState<NullGraphicsApi>> = SlotTable::new();
        let stage = shader_modules.insert(|index| ShaderModuleState::new(index, vec![], source.clone()));

        let pipelines: SlotTable<PipelineState<NullGraphicsApi>> = SlotTable::new();
        let pipeline = pipelines.insert(|index| PipelineState::new(index, PipelineKind::Graphics, Vec::new(), vec![stage], gv_core::NullPipeline(0)));

        let key = ShaderInstrumentationKey::new(SourceHash(2), FeatureMask::RESOURCE_BOUNDS);
        let combined_hash = CombinedHash::compute(&[key], &[]);
        let snapshot = compiler.submit_batch(vec![PipelineJob::new(pipeline.clone(), combined_hash, vec![key])]);
        wait_until_reached(&compiler, snapshot);

        assert!(pipeline.get_instrument(combined_hash).is_some());
    }
}
