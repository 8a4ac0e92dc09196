//! FIFO scheduler for global cubemap builds, one stage per tick.

use std::collections::VecDeque;
use std::path::PathBuf;

use glam::Vec3;

use crate::backend::{CubeTextureDesc, RenderBackend, TextureHandle};
use crate::config::IblConfig;
use crate::error::{IblError, SourceLoadError};
use crate::job::{BuildStage, CubemapBuildJob, CubemapSet, JobTargets, StagePlan, StageRunner};
use crate::loader::ImageLoader;
use crate::projector::CubeTarget;
use crate::release::ReleaseQueue;

/// Result of one tick of the global scheduler or the local grid builder.
#[derive(Debug)]
pub enum StepOutcome {
    /// Nothing was queued; no work recorded.
    Idle,
    /// A global job ran `stage` and is not finished yet.
    Progressed { stage: BuildStage },
    /// A global job finished; its set is resolved at `index`.
    Completed { index: usize },
    /// A source could not be loaded. The job was dropped.
    SourceFailed { source: PathBuf, error: SourceLoadError },
    /// A local grid cell ran `stage`.
    CellProgressed { col: u32, row: u32, stage: BuildStage },
    /// A local grid cell finished; `grid_ready` is set once every cell is done.
    CellCompleted { col: u32, row: u32, grid_ready: bool },
    /// A local grid cell's source could not be loaded. The cell is marked failed.
    CellFailed { col: u32, row: u32, error: SourceLoadError },
}

impl StepOutcome {
    /// Whether this tick finished a job or a grid cell.
    pub fn job_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed { .. } | StepOutcome::CellCompleted { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, StepOutcome::Idle)
    }
}

/// Everything a tick borrows from its owner.
pub struct BuildContext<'a> {
    pub backend: &'a mut dyn RenderBackend,
    pub loader: &'a dyn ImageLoader,
    pub releases: &'a mut ReleaseQueue,
}

/// Create a cube texture, mapping failure to a fatal [`IblError::ResourceCreation`].
pub(crate) fn create_cube(
    backend: &mut dyn RenderBackend,
    desc: CubeTextureDesc,
) -> Result<TextureHandle, IblError> {
    backend.create_cube_texture(&desc).map_err(|source| {
        log::error!("Failed to create {}: {}", desc.label, source);
        IblError::ResourceCreation {
            label: desc.label,
            source,
        }
    })
}

pub struct BuildScheduler {
    config: IblConfig,
    runner: StageRunner,
    queue: VecDeque<CubemapBuildJob>,
    resolved: Vec<CubemapSet>,
}

impl BuildScheduler {
    pub fn new(config: IblConfig) -> Self {
        Self {
            runner: StageRunner::new(&config),
            config,
            queue: VecDeque::new(),
            resolved: Vec::new(),
        }
    }

    pub fn plan(&self) -> StagePlan {
        self.runner.plan()
    }

    pub fn enqueue(&mut self, source: impl Into<PathBuf>) {
        let job = CubemapBuildJob::new(source, Vec3::ZERO);
        log::debug!("Queued global cubemap build for {}", job.source.display());
        self.queue.push_back(job);
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Stage the head-of-queue job will run next.
    pub fn active_stage(&self) -> Option<BuildStage> {
        self.queue.front().map(|job| job.stage)
    }

    pub fn resolved(&self) -> &[CubemapSet] {
        &self.resolved
    }

    pub fn resolved_cubemap(&self, index: usize) -> Option<&CubemapSet> {
        self.resolved.get(index)
    }

    /// Every texture this scheduler owns: resolved sets and the in-flight job.
    pub fn live_textures(&self) -> Vec<TextureHandle> {
        let mut handles = Vec::new();
        for set in &self.resolved {
            handles.extend(set.base);
            handles.push(set.irradiance);
            handles.push(set.environment);
        }
        for job in &self.queue {
            if let Some(targets) = job.targets {
                handles.extend([
                    targets.source,
                    targets.base.texture,
                    targets.irradiance.texture,
                    targets.environment.texture,
                ]);
            }
        }
        handles
    }

    /// Drop every resolved set and queued job, returning their textures.
    pub(crate) fn take_live_textures(&mut self) -> Vec<TextureHandle> {
        let handles = self.live_textures();
        self.resolved.clear();
        self.queue.clear();
        handles
    }

    /// Run exactly one stage of the head-of-queue job.
    pub fn advance(&mut self, ctx: &mut BuildContext<'_>) -> Result<StepOutcome, IblError> {
        let Some(job) = self.queue.front_mut() else {
            return Ok(StepOutcome::Idle);
        };

        if job.stage == BuildStage::Pending {
            return self.load_head(ctx);
        }

        let stage = self.runner.run_stage(ctx.backend, job)?;
        if !job.is_done() {
            log::debug!("{}: {}", job.source.display(), stage);
            return Ok(StepOutcome::Progressed { stage });
        }

        let Some(job) = self.queue.pop_front() else {
            return Ok(StepOutcome::Idle);
        };
        let Some(targets) = job.targets else {
            return Ok(StepOutcome::Idle);
        };
        ctx.releases.defer(ctx.backend, targets.source);

        let plan = self.runner.plan();
        self.resolved.push(CubemapSet {
            base: Some(targets.base.texture),
            irradiance: targets.irradiance.texture,
            environment: targets.environment.texture,
            slice: 0,
            base_resolution: self.config.base_resolution,
            base_mip_count: plan.base_mip_count,
            irradiance_resolution: self.config.irradiance_resolution,
            environment_resolution: self.config.environment_resolution,
            roughness_mip_count: plan.roughness_mip_count,
        });
        let index = self.resolved.len() - 1;
        log::info!("Resolved cubemap {} from {}", index, job.source.display());
        Ok(StepOutcome::Completed { index })
    }

    /// The `Loading` stage: decode the source, upload it and allocate outputs.
    fn load_head(&mut self, ctx: &mut BuildContext<'_>) -> Result<StepOutcome, IblError> {
        let Some(job) = self.queue.front_mut() else {
            return Ok(StepOutcome::Idle);
        };

        let image = match ctx.loader.load_equirect(&job.source) {
            Ok(image) => image,
            Err(error) => {
                log::warn!("Skipping cubemap source: {error}");
                let source = job.source.clone();
                self.queue.pop_front();
                return Ok(StepOutcome::SourceFailed { source, error });
            }
        };

        let name = job
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| job.source.display().to_string());
        let plan = self.runner.plan();
        let descs = [
            CubeTextureDesc {
                label: format!("Base Cube ({name})"),
                resolution: self.config.base_resolution,
                mip_count: plan.base_mip_count,
                array_layers: 1,
            },
            CubeTextureDesc {
                label: format!("Irradiance Cube ({name})"),
                resolution: self.config.irradiance_resolution,
                mip_count: 1,
                array_layers: 1,
            },
            CubeTextureDesc {
                label: format!("Environment Cube ({name})"),
                resolution: self.config.environment_resolution,
                mip_count: plan.roughness_mip_count,
                array_layers: 1,
            },
        ];

        let mut created = Vec::with_capacity(4);
        for desc in descs {
            match create_cube(ctx.backend, desc) {
                Ok(handle) => created.push(handle),
                Err(err) => {
                    self.abandon_head(ctx, &created);
                    return Err(err);
                }
            }
        }
        let label = format!("Equirect Source ({name})");
        let source = match ctx.backend.create_equirect_texture(&label, &image) {
            Ok(handle) => handle,
            Err(source) => {
                log::error!("Failed to create {label}: {source}");
                self.abandon_head(ctx, &created);
                return Err(IblError::ResourceCreation { label, source });
            }
        };

        let targets = JobTargets {
            source,
            base: CubeTarget::new(created[0], 0),
            irradiance: CubeTarget::new(created[1], 0),
            environment: CubeTarget::new(created[2], 0),
        };
        if let Err(err) = targets.prepare(ctx.backend) {
            log::error!("Failed to prepare targets for {name}: {err}");
            created.push(source);
            self.abandon_head(ctx, &created);
            return Err(err.into());
        }

        let Some(job) = self.queue.front_mut() else {
            return Ok(StepOutcome::Idle);
        };
        job.begin(targets);
        log::debug!(
            "{}: loaded {}x{} source",
            job.source.display(),
            image.width,
            image.height
        );
        Ok(StepOutcome::Progressed {
            stage: BuildStage::Loading,
        })
    }

    /// Drop the head job after a failed allocation or transition. Its textures
    /// were never drawn to, so they are freed immediately when possible.
    fn abandon_head(&mut self, ctx: &mut BuildContext<'_>, created: &[TextureHandle]) {
        for &handle in created {
            if let Err(err) = ctx.backend.release(handle) {
                log::warn!("Deferring release of {handle}: {err}");
                ctx.releases.defer(ctx.backend, handle);
            }
        }
        self.queue.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cpu::CpuBackend;
    use crate::backend::ResourceState;
    use crate::error::BackendError;
    use crate::loader::{EquirectImage, InMemoryLoader};

    fn small_config() -> IblConfig {
        IblConfig::default()
            .with_base_resolution(8)
            .with_irradiance_resolution(2)
            .with_environment_resolution(4)
            .with_roughness_mip_count(2)
            .with_irradiance_sample_delta(0.5)
            .with_prefilter_sample_count(8)
            .with_irradiance_source_resolution(4)
    }

    fn loader() -> InMemoryLoader {
        InMemoryLoader::new()
            .with_image("a.hdr", EquirectImage::procedural_sky(16, 8))
            .with_image("b.hdr", EquirectImage::constant(16, 8, Vec3::ONE))
    }

    struct Harness {
        backend: CpuBackend,
        loader: InMemoryLoader,
        releases: ReleaseQueue,
    }

    impl Harness {
        fn new(backend: CpuBackend) -> Self {
            Self {
                backend,
                loader: loader(),
                releases: ReleaseQueue::new(),
            }
        }

        fn tick(&mut self, scheduler: &mut BuildScheduler) -> Result<StepOutcome, IblError> {
            self.releases.collect(&mut self.backend)?;
            let mut ctx = BuildContext {
                backend: &mut self.backend,
                loader: &self.loader,
                releases: &mut self.releases,
            };
            let outcome = scheduler.advance(&mut ctx)?;
            if !outcome.is_idle() {
                self.backend.submit();
            }
            Ok(outcome)
        }
    }

    #[test]
    fn test_jobs_resolve_in_enqueue_order_after_n_times_k_ticks() {
        let mut scheduler = BuildScheduler::new(small_config());
        let mut harness = Harness::new(CpuBackend::new());
        scheduler.enqueue("b.hdr");
        scheduler.enqueue("a.hdr");

        let k = scheduler.plan().stages_per_job();
        let mut completions = Vec::new();
        for tick in 0..2 * k {
            if let StepOutcome::Completed { index } = harness.tick(&mut scheduler).unwrap() {
                completions.push((tick, index));
            }
        }
        assert_eq!(completions, vec![(k - 1, 0), (2 * k - 1, 1)]);
        assert!(!scheduler.has_pending());
        assert!(harness.tick(&mut scheduler).unwrap().is_idle());

        // The constant source went first.
        let first = scheduler.resolved_cubemap(0).unwrap();
        let env = harness.backend.cube(first.environment).unwrap();
        assert!((env.level(0, 2, 0)[0].x - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_each_tick_runs_a_single_stage() {
        let mut scheduler = BuildScheduler::new(small_config());
        let mut harness = Harness::new(CpuBackend::new());
        scheduler.enqueue("a.hdr");
        scheduler.enqueue("b.hdr");

        let mut draws = harness.backend.stats().draws;
        for _ in 0..scheduler.plan().stages_per_job() {
            let expected = scheduler.active_stage().unwrap();
            let outcome = harness.tick(&mut scheduler).unwrap();
            let ran = match outcome {
                StepOutcome::Progressed { stage } => stage,
                StepOutcome::Completed { .. } => BuildStage::ConvolvingEnvironment(1),
                other => panic!("unexpected {other:?}"),
            };
            if expected != BuildStage::Pending {
                assert_eq!(ran, expected);
            }
            let now = harness.backend.stats().draws;
            let expected_draws = match ran {
                BuildStage::Loading => 0,
                BuildStage::ProjectingFace(_) => 1,
                _ => 6,
            };
            assert_eq!(now - draws, expected_draws, "{ran}");
            draws = now;
        }
        // Only the first job finished.
        assert_eq!(scheduler.resolved().len(), 1);
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn test_missing_source_is_skipped() {
        let mut scheduler = BuildScheduler::new(small_config());
        let mut harness = Harness::new(CpuBackend::new());
        scheduler.enqueue("missing.hdr");
        scheduler.enqueue("a.hdr");

        match harness.tick(&mut scheduler).unwrap() {
            StepOutcome::SourceFailed { source, .. } => assert_eq!(source, PathBuf::from("missing.hdr")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(harness.backend.live_textures(), 0);

        let k = scheduler.plan().stages_per_job();
        let mut completed = 0;
        for _ in 0..k {
            if harness.tick(&mut scheduler).unwrap().job_completed() {
                completed += 1;
            }
        }
        assert_eq!(completed, 1);
        assert_eq!(scheduler.resolved().len(), 1);
    }

    #[test]
    fn test_creation_failure_is_fatal() {
        let mut scheduler = BuildScheduler::new(small_config());
        // Base and irradiance fit; the environment cube does not.
        let mut harness = Harness::new(CpuBackend::new().with_allocation_limit(2));
        scheduler.enqueue("a.hdr");

        let err = harness.tick(&mut scheduler).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, IblError::ResourceCreation { ref label, .. } if label.starts_with("Environment")));
        assert!(!scheduler.has_pending());

        // The partial allocations never reached the GPU.
        assert!(harness.releases.is_empty());
        assert_eq!(harness.backend.live_textures(), 0);
    }

    #[test]
    fn test_failed_target_preparation_releases_the_head_job() {
        let mut scheduler = BuildScheduler::new(small_config());
        let mut harness = Harness::new(CpuBackend::new().with_transition_limit(0));
        scheduler.enqueue("a.hdr");

        let err = harness.tick(&mut scheduler).unwrap_err();
        assert!(matches!(err, IblError::Backend(BackendError::Device(_))));
        assert!(err.is_fatal());
        assert!(!scheduler.has_pending());
        assert!(scheduler.live_textures().is_empty());
        assert_eq!(harness.backend.live_textures(), 0);
    }

    #[test]
    fn test_partially_prepared_targets_are_deferred() {
        let mut scheduler = BuildScheduler::new(small_config());
        // The base cube transitions, the irradiance cube does not.
        let mut harness = Harness::new(CpuBackend::new().with_transition_limit(1));
        scheduler.enqueue("a.hdr");

        assert!(harness.tick(&mut scheduler).unwrap_err().is_fatal());
        assert!(!scheduler.has_pending());
        assert_eq!(harness.releases.len(), 1);
        assert_eq!(harness.backend.live_textures(), 1);

        harness.backend.submit();
        harness.releases.drain_all(&mut harness.backend).unwrap();
        assert_eq!(harness.backend.live_textures(), 0);
    }

    #[test]
    fn test_source_release_is_deferred_to_the_next_tick() {
        let mut scheduler = BuildScheduler::new(small_config());
        let mut harness = Harness::new(CpuBackend::new());
        scheduler.enqueue("a.hdr");

        let k = scheduler.plan().stages_per_job();
        for _ in 0..k - 1 {
            harness.tick(&mut scheduler).unwrap();
        }
        let source = scheduler.queue.front().and_then(|j| j.source_texture()).unwrap();

        assert!(harness.tick(&mut scheduler).unwrap().job_completed());
        // Queued, but the GPU may still be reading it.
        assert!(harness.backend.is_alive(source));
        assert!(harness.releases.contains(source));

        // Next tick's safe point frees it.
        harness.tick(&mut scheduler).unwrap();
        assert!(!harness.backend.is_alive(source));

        let set = scheduler.resolved_cubemap(0).unwrap();
        let cube = harness.backend.cube(set.environment).unwrap();
        assert_eq!(cube.state(0, 5, 1), Some(ResourceState::ShaderRead));
    }
}
