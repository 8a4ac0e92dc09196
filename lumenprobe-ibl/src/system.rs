//! `IblSystem`: the single owner of the global scheduler, the local grid and
//! the deferred release queue. One call to [`IblSystem::advance`] is one tick.

use std::path::PathBuf;

use glam::{Vec2, Vec3};

use crate::backend::{CubeSource, RenderBackend};
use crate::blend::{self, BlendedSample, GlobalView, IblLookup, LocalGridView, LocalSample};
use crate::config::IblConfig;
use crate::error::{IblError, Result};
use crate::grid::{Footprint, LocalCaptureSource, LocalGridBuilder, LocalGridDescriptor};
use crate::job::{CubemapSet, StagePlan};
use crate::loader::ImageLoader;
use crate::release::ReleaseQueue;
use crate::scheduler::{BuildContext, BuildScheduler, StepOutcome};

pub struct IblSystem<B: RenderBackend, L: ImageLoader> {
    backend: B,
    loader: L,
    config: IblConfig,
    scheduler: BuildScheduler,
    grid: Option<LocalGridBuilder>,
    releases: ReleaseQueue,
    global_index: usize,
    aborted: bool,
}

impl<B: RenderBackend, L: ImageLoader> IblSystem<B, L> {
    pub fn new(backend: B, loader: L, config: IblConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            loader,
            config,
            scheduler: BuildScheduler::new(config),
            grid: None,
            releases: ReleaseQueue::new(),
            global_index: 0,
            aborted: false,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &IblConfig {
        &self.config
    }

    pub fn plan(&self) -> StagePlan {
        self.scheduler.plan()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn enqueue_source(&mut self, path: impl Into<PathBuf>) {
        self.scheduler.enqueue(path);
    }

    pub fn has_pending_global_jobs(&self) -> bool {
        self.scheduler.has_pending()
    }

    pub fn resolved_count(&self) -> usize {
        self.scheduler.resolved().len()
    }

    pub fn resolved_cubemap(&self, index: usize) -> Option<&CubemapSet> {
        self.scheduler.resolved_cubemap(index)
    }

    /// Choose which resolved set the shading path composites under the grid.
    pub fn select_global(&mut self, index: usize) {
        self.global_index = index;
    }

    /// The selected global set, once it has resolved.
    pub fn global_cubemap(&self) -> Option<&CubemapSet> {
        self.scheduler.resolved_cubemap(self.global_index)
    }

    /// Run one build stage: a global job if any is queued, otherwise the local
    /// grid. Work recorded by the stage is submitted before returning.
    pub fn advance(&mut self) -> Result<StepOutcome> {
        if self.aborted {
            return Err(IblError::Aborted);
        }
        let outcome = self.tick();
        match outcome {
            Ok(outcome) => {
                if !outcome.is_idle() {
                    self.backend.submit();
                }
                Ok(outcome)
            }
            Err(err) => {
                if err.is_fatal() {
                    log::error!("IBL pipeline aborted: {err}");
                    self.aborted = true;
                }
                Err(err)
            }
        }
    }

    fn tick(&mut self) -> Result<StepOutcome> {
        // Safe point: textures retired by earlier ticks.
        self.releases.collect(&mut self.backend)?;

        let mut ctx = BuildContext {
            backend: &mut self.backend,
            loader: &self.loader,
            releases: &mut self.releases,
        };
        if self.scheduler.has_pending() {
            return self.scheduler.advance(&mut ctx);
        }
        match self.grid.as_mut() {
            Some(grid) => grid.step(&mut ctx),
            None => Ok(StepOutcome::Idle),
        }
    }

    /// Tick until nothing is pending, at most `max_ticks` times. Returns the
    /// outcomes of every tick that did work.
    pub fn advance_until_idle(&mut self, max_ticks: usize) -> Result<Vec<StepOutcome>> {
        let mut outcomes = Vec::new();
        for _ in 0..max_ticks {
            let outcome = self.advance()?;
            if outcome.is_idle() {
                break;
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Describe and allocate a local grid covering `footprint`. A previous
    /// grid is retired and its textures released at the next safe point.
    pub fn init_local_grid(
        &mut self,
        footprint_min: Vec2,
        footprint_max: Vec2,
        cell_size: f32,
        source: LocalCaptureSource,
    ) -> Result<LocalGridDescriptor> {
        if self.aborted {
            return Err(IblError::Aborted);
        }
        let descriptor = LocalGridDescriptor::from_footprint(
            Footprint::new(footprint_min, footprint_max),
            cell_size,
            self.config.roughness_mip_count,
        )?;

        if let Some(old) = self.grid.take() {
            let mut ctx = BuildContext {
                backend: &mut self.backend,
                loader: &self.loader,
                releases: &mut self.releases,
            };
            old.retire(&mut ctx);
        }
        match LocalGridBuilder::new(&mut self.backend, self.config, descriptor, source) {
            Ok(grid) => {
                self.grid = Some(grid);
                Ok(descriptor)
            }
            Err(err) => {
                if err.is_fatal() {
                    self.aborted = true;
                }
                Err(err)
            }
        }
    }

    pub fn local_grid(&self) -> Option<&LocalGridBuilder> {
        self.grid.as_ref()
    }

    pub fn local_grid_descriptor(&self) -> Option<&LocalGridDescriptor> {
        self.grid.as_ref().map(LocalGridBuilder::descriptor)
    }

    pub fn is_local_grid_ready(&self) -> bool {
        self.grid.as_ref().is_some_and(LocalGridBuilder::is_ready)
    }

    pub fn rebuild_local_cell(&mut self, col: u32, row: u32) -> Result<()> {
        match self.grid.as_mut() {
            Some(grid) => grid.rebuild_cell(col, row),
            None => Err(IblError::InvalidGridCell { col, row }),
        }
    }

    /// Wait for the GPU and release every texture the system still owns.
    /// Returns the backend.
    pub fn shutdown(mut self) -> Result<B> {
        self.backend.submit();
        self.backend.wait_idle()?;

        let mut owned = self.scheduler.take_live_textures();
        if let Some(grid) = self.grid.take() {
            owned.extend(grid.live_textures());
        }
        for handle in owned {
            if self.backend.is_alive(handle) && !self.releases.contains(handle) {
                self.backend.release(handle)?;
            }
        }
        let released = self.releases.drain_all(&mut self.backend)?;
        log::info!("IBL system shut down ({released} deferred releases flushed)");
        Ok(self.backend)
    }
}

impl<B: RenderBackend + CubeSource, L: ImageLoader> IblSystem<B, L> {
    /// Local grid contribution at `p`. Before the grid is ready this is the
    /// zero-alpha sample and no texture is touched.
    pub fn sample_local(&self, p: Vec3, dir: Vec3, lookup: IblLookup) -> LocalSample {
        let Some(grid) = self.grid.as_ref().filter(|g| g.is_ready()) else {
            return LocalSample::NONE;
        };
        let (Some(irradiance), Some(environment)) = (
            self.backend.cube_sampler(grid.irradiance_array()),
            self.backend.cube_sampler(grid.environment_array()),
        ) else {
            return LocalSample::NONE;
        };
        let view = LocalGridView {
            descriptor: grid.descriptor(),
            irradiance,
            environment,
        };
        blend::sample_local(&view, &self.config.blend, p, dir, lookup)
    }

    /// Local grid blended over the selected global set. `None` until a global
    /// set has resolved.
    pub fn sample_ibl(&self, p: Vec3, dir: Vec3, lookup: IblLookup) -> Option<BlendedSample> {
        let set = self.global_cubemap()?;
        let global = GlobalView {
            irradiance: self.backend.cube_sampler(set.irradiance)?,
            environment: self.backend.cube_sampler(set.environment)?,
            slice: set.slice,
        };
        let local = self.sample_local(p, dir, lookup);
        let global_color = blend::sample_global(&global, dir, lookup);
        Some(BlendedSample {
            local,
            global: global_color,
            color: blend::blend(local, global_color),
        })
    }
}
