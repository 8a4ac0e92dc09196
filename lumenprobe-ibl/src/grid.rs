//! Local cubemap grid: one capture per cell of a 2D XZ grid, stored as slices
//! of shared irradiance/environment cube arrays and built one stage per step.

use std::collections::VecDeque;
use std::path::PathBuf;

use glam::{Vec2, Vec3};

use crate::backend::{CubeTextureDesc, RenderBackend, TextureHandle};
use crate::config::IblConfig;
use crate::cube::CUBE_FACES;
use crate::error::{IblError, SourceLoadError};
use crate::job::{BuildStage, CubemapBuildJob, CubemapSet, JobTargets, StagePlan, StageRunner};
use crate::projector::CubeTarget;
use crate::scheduler::{create_cube, BuildContext, StepOutcome};

/// Axis-aligned scene bounds on the XZ plane (`y` of the vectors is world Z).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Footprint {
    pub min: Vec2,
    pub max: Vec2,
}

impl Footprint {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }
}

/// Placement of the local grid. Fixed for the lifetime of a grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalGridDescriptor {
    /// World XZ of the grid's minimum corner.
    pub origin: Vec2,
    pub cell_size: f32,
    pub width: u32,
    pub height: u32,
    pub roughness_mip_count: u32,
}

impl LocalGridDescriptor {
    /// Cover `footprint` with one margin cell on each axis.
    pub fn from_footprint(
        footprint: Footprint,
        cell_size: f32,
        roughness_mip_count: u32,
    ) -> Result<Self, IblError> {
        if !(cell_size > 0.0 && cell_size.is_finite()) {
            return Err(IblError::InvalidFootprint(format!("cell size {cell_size} must be positive")));
        }
        let extent = footprint.max - footprint.min;
        if !extent.is_finite() || extent.x < 0.0 || extent.y < 0.0 {
            return Err(IblError::InvalidFootprint(format!(
                "max {} is not above min {}",
                footprint.max, footprint.min
            )));
        }
        let cells_along = |extent: f32| (f64::from(extent) / f64::from(cell_size)).ceil() + 1.0;
        let (width, height) = (cells_along(extent.x), cells_along(extent.y));
        // Every cell becomes six array layers, so the layer count must fit a u32.
        let layers = (width <= f64::from(u32::MAX) && height <= f64::from(u32::MAX))
            .then(|| (width as u64).checked_mul(height as u64))
            .flatten()
            .and_then(|cells| cells.checked_mul(u64::from(CUBE_FACES)))
            .filter(|&layers| layers <= u64::from(u32::MAX));
        if layers.is_none() {
            return Err(IblError::InvalidFootprint(format!(
                "{width}x{height} cells of {cell_size} do not fit a cube array"
            )));
        }
        Ok(Self {
            origin: footprint.min,
            cell_size,
            width: width as u32,
            height: height as u32,
            roughness_mip_count,
        })
    }

    pub fn cell_count(&self) -> u32 {
        self.width.saturating_mul(self.height)
    }

    pub fn slice_index(&self, col: u32, row: u32) -> u32 {
        row * self.width + col
    }

    pub fn cell_of_slice(&self, slice: u32) -> (u32, u32) {
        (slice % self.width, slice / self.width)
    }

    pub fn contains_cell(&self, col: u32, row: u32) -> bool {
        col < self.width && row < self.height
    }

    pub fn cell_center_xz(&self, col: u32, row: u32) -> Vec2 {
        self.origin + (Vec2::new(col as f32, row as f32) + Vec2::splat(0.5)) * self.cell_size
    }

    /// Capture position of a cell, on the ground plane.
    pub fn cell_center(&self, col: u32, row: u32) -> Vec3 {
        let xz = self.cell_center_xz(col, row);
        Vec3::new(xz.x, 0.0, xz.y)
    }
}

/// Panorama(s) captured by the grid cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalCaptureSource {
    /// One panorama reprojected from every cell center.
    Shared(PathBuf),
    /// One panorama per cell, indexed by slice.
    PerCell(Vec<PathBuf>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellStatus {
    Queued,
    Building,
    Done,
    Failed,
}

pub struct LocalGridBuilder {
    descriptor: LocalGridDescriptor,
    config: IblConfig,
    runner: StageRunner,
    source: LocalCaptureSource,
    irradiance_array: TextureHandle,
    environment_array: TextureHandle,
    /// Base cube reused by every cell; only its finished outputs are kept.
    scratch_base: TextureHandle,
    shared_source: Option<TextureHandle>,
    cells: Vec<CellStatus>,
    pending: VecDeque<u32>,
    active: Option<(u32, CubemapBuildJob)>,
    ready: bool,
}

impl LocalGridBuilder {
    /// Allocate the grid arrays and queue every cell in row-major order.
    pub fn new(
        backend: &mut dyn RenderBackend,
        config: IblConfig,
        descriptor: LocalGridDescriptor,
        source: LocalCaptureSource,
    ) -> Result<Self, IblError> {
        let fits = descriptor
            .width
            .checked_mul(descriptor.height)
            .and_then(|cells| cells.checked_mul(CUBE_FACES))
            .is_some();
        if !fits || descriptor.cell_count() == 0 {
            return Err(IblError::InvalidFootprint(format!(
                "{}x{} cells do not fit a cube array",
                descriptor.width, descriptor.height
            )));
        }
        let cell_count = descriptor.cell_count();
        if let LocalCaptureSource::PerCell(paths) = &source {
            if paths.len() != cell_count as usize {
                return Err(IblError::InvalidConfig(format!(
                    "{} per-cell sources for a grid of {} cells",
                    paths.len(),
                    cell_count
                )));
            }
        }
        if descriptor.roughness_mip_count != config.roughness_mip_count {
            return Err(IblError::InvalidConfig(format!(
                "grid roughness mip count {} differs from the configured {}",
                descriptor.roughness_mip_count, config.roughness_mip_count
            )));
        }

        let runner = StageRunner::new(&config);
        let descs = [
            CubeTextureDesc {
                label: "Local Irradiance Array".into(),
                resolution: config.irradiance_resolution,
                mip_count: 1,
                array_layers: cell_count,
            },
            CubeTextureDesc {
                label: "Local Environment Array".into(),
                resolution: config.environment_resolution,
                mip_count: descriptor.roughness_mip_count,
                array_layers: cell_count,
            },
            CubeTextureDesc {
                label: "Local Base Scratch".into(),
                resolution: config.base_resolution,
                mip_count: runner.plan().base_mip_count,
                array_layers: 1,
            },
        ];
        let mut created = Vec::with_capacity(descs.len());
        for desc in descs {
            match create_cube(backend, desc) {
                Ok(handle) => created.push(handle),
                Err(err) => {
                    for handle in created {
                        if let Err(release_err) = backend.release(handle) {
                            log::warn!("Leaking {handle}: {release_err}");
                        }
                    }
                    return Err(err);
                }
            }
        }

        log::info!(
            "Local grid {}x{} (cell {}) at {}",
            descriptor.width,
            descriptor.height,
            descriptor.cell_size,
            descriptor.origin
        );
        Ok(Self {
            descriptor,
            config,
            runner,
            source,
            irradiance_array: created[0],
            environment_array: created[1],
            scratch_base: created[2],
            shared_source: None,
            cells: vec![CellStatus::Queued; cell_count as usize],
            pending: (0..cell_count).collect(),
            active: None,
            ready: false,
        })
    }

    pub fn descriptor(&self) -> &LocalGridDescriptor {
        &self.descriptor
    }

    pub fn plan(&self) -> StagePlan {
        self.runner.plan()
    }

    pub fn irradiance_array(&self) -> TextureHandle {
        self.irradiance_array
    }

    pub fn environment_array(&self) -> TextureHandle {
        self.environment_array
    }

    /// Set once every cell is built. Cleared while any cell is being rebuilt.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn has_pending(&self) -> bool {
        self.active.is_some() || !self.pending.is_empty()
    }

    pub fn cell_status(&self, col: u32, row: u32) -> Option<CellStatus> {
        if !self.descriptor.contains_cell(col, row) {
            return None;
        }
        self.cells
            .get(self.descriptor.slice_index(col, row) as usize)
            .copied()
    }

    /// The finished set of one cell, or `None` while it is not built.
    pub fn cell_set(&self, col: u32, row: u32) -> Option<CubemapSet> {
        if self.cell_status(col, row)? != CellStatus::Done {
            return None;
        }
        let plan = self.runner.plan();
        Some(CubemapSet {
            base: None,
            irradiance: self.irradiance_array,
            environment: self.environment_array,
            slice: self.descriptor.slice_index(col, row),
            base_resolution: self.config.base_resolution,
            base_mip_count: plan.base_mip_count,
            irradiance_resolution: self.config.irradiance_resolution,
            environment_resolution: self.config.environment_resolution,
            roughness_mip_count: plan.roughness_mip_count,
        })
    }

    /// Queue one cell for a fresh capture. Other cells keep their slices.
    pub fn rebuild_cell(&mut self, col: u32, row: u32) -> Result<(), IblError> {
        if !self.descriptor.contains_cell(col, row) {
            return Err(IblError::InvalidGridCell { col, row });
        }
        let slice = self.descriptor.slice_index(col, row);
        let already_queued = self.pending.contains(&slice)
            || matches!(self.active, Some((active, _)) if active == slice);
        if !already_queued {
            self.cells[slice as usize] = CellStatus::Queued;
            self.pending.push_back(slice);
        }
        self.ready = false;
        Ok(())
    }

    /// Every texture the grid owns, including an in-flight per-cell source.
    pub fn live_textures(&self) -> Vec<TextureHandle> {
        let mut handles = vec![self.irradiance_array, self.environment_array, self.scratch_base];
        handles.extend(self.shared_source);
        if let Some((_, job)) = &self.active {
            if !matches!(self.source, LocalCaptureSource::Shared(_)) {
                handles.extend(job.source_texture());
            }
        }
        handles
    }

    /// Advance the current cell by one stage, starting the next queued cell
    /// when none is active.
    pub fn step(&mut self, ctx: &mut BuildContext<'_>) -> Result<StepOutcome, IblError> {
        let Some((slice, mut job)) = self.active.take() else {
            return self.start_next_cell(ctx);
        };
        let (col, row) = self.descriptor.cell_of_slice(slice);

        let stage = match self.runner.run_stage(ctx.backend, &mut job) {
            Ok(stage) => stage,
            Err(err) => {
                self.active = Some((slice, job));
                return Err(err.into());
            }
        };
        if !job.is_done() {
            self.active = Some((slice, job));
            return Ok(StepOutcome::CellProgressed { col, row, stage });
        }

        if matches!(self.source, LocalCaptureSource::PerCell(_)) {
            if let Some(source) = job.source_texture() {
                ctx.releases.defer(ctx.backend, source);
            }
        }
        self.cells[slice as usize] = CellStatus::Done;
        self.ready = self.pending.is_empty() && self.cells.iter().all(|c| *c == CellStatus::Done);
        log::debug!("Local cell ({col}, {row}) done");
        if self.ready {
            log::info!("Local grid ready ({} cells)", self.cells.len());
        }
        Ok(StepOutcome::CellCompleted {
            col,
            row,
            grid_ready: self.ready,
        })
    }

    /// The `Loading` stage of the next queued cell.
    fn start_next_cell(&mut self, ctx: &mut BuildContext<'_>) -> Result<StepOutcome, IblError> {
        let Some(slice) = self.pending.pop_front() else {
            return Ok(StepOutcome::Idle);
        };
        let (col, row) = self.descriptor.cell_of_slice(slice);

        let source = match self.acquire_source(ctx, slice) {
            Ok(source) => source,
            Err(SourceAcquireError::Load(error)) => {
                log::warn!("Local cell ({col}, {row}) failed: {error}");
                self.cells[slice as usize] = CellStatus::Failed;
                if matches!(self.source, LocalCaptureSource::Shared(_)) {
                    // Every cell reprojects the same panorama.
                    for queued in self.pending.drain(..) {
                        self.cells[queued as usize] = CellStatus::Failed;
                    }
                }
                self.ready = false;
                return Ok(StepOutcome::CellFailed { col, row, error });
            }
            Err(SourceAcquireError::Fatal(err)) => return Err(err),
        };

        let mut job = CubemapBuildJob::new(self.source_path(slice), self.descriptor.cell_center(col, row));
        let targets = JobTargets {
            source,
            base: CubeTarget::new(self.scratch_base, 0),
            irradiance: CubeTarget::new(self.irradiance_array, slice),
            environment: CubeTarget::new(self.environment_array, slice),
        };
        if let Err(err) = targets.prepare(ctx.backend) {
            log::error!("Local cell ({col}, {row}) could not be prepared: {err}");
            if matches!(self.source, LocalCaptureSource::PerCell(_)) {
                if let Err(release_err) = ctx.backend.release(source) {
                    log::warn!("Deferring release of {source}: {release_err}");
                    ctx.releases.defer(ctx.backend, source);
                }
            }
            self.cells[slice as usize] = CellStatus::Failed;
            self.ready = false;
            return Err(err.into());
        }
        job.begin(targets);
        self.cells[slice as usize] = CellStatus::Building;
        self.active = Some((slice, job));
        log::debug!("Local cell ({col}, {row}): loading");
        Ok(StepOutcome::CellProgressed {
            col,
            row,
            stage: BuildStage::Loading,
        })
    }

    fn source_path(&self, slice: u32) -> PathBuf {
        match &self.source {
            LocalCaptureSource::Shared(path) => path.clone(),
            LocalCaptureSource::PerCell(paths) => paths[slice as usize].clone(),
        }
    }

    fn acquire_source(
        &mut self,
        ctx: &mut BuildContext<'_>,
        slice: u32,
    ) -> Result<TextureHandle, SourceAcquireError> {
        if let Some(shared) = self.shared_source {
            return Ok(shared);
        }
        let path = self.source_path(slice);
        let image = ctx
            .loader
            .load_equirect(&path)
            .map_err(SourceAcquireError::Load)?;
        let label = format!("Local Source ({})", path.display());
        let handle = ctx
            .backend
            .create_equirect_texture(&label, &image)
            .map_err(|source| {
                log::error!("Failed to create {label}: {source}");
                SourceAcquireError::Fatal(IblError::ResourceCreation {
                    label: label.clone(),
                    source,
                })
            })?;
        if matches!(self.source, LocalCaptureSource::Shared(_)) {
            self.shared_source = Some(handle);
        }
        Ok(handle)
    }

    /// Hand every texture to the release queue. The grid must not be used afterwards.
    pub(crate) fn retire(self, ctx: &mut BuildContext<'_>) {
        for handle in self.live_textures() {
            ctx.releases.defer(ctx.backend, handle);
        }
    }
}

enum SourceAcquireError {
    Load(SourceLoadError),
    Fatal(IblError),
}
