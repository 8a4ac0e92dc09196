//! Per-cubemap build job: the stage cursor and the stage executor shared by
//! the global scheduler and the local grid builder.

use std::fmt;
use std::path::PathBuf;

use glam::Vec3;

use crate::backend::{RenderBackend, ResourceState, SubresourceRange, TextureHandle};
use crate::config::IblConfig;
use crate::cube::{mip_resolution, CubeFace};
use crate::environment::EnvironmentConvolver;
use crate::error::BackendError;
use crate::irradiance::IrradianceConvolver;
use crate::mip_chain::MipChainBuilder;
use crate::projector::{CubeFaceProjector, CubeTarget};

/// Where a job is in its build. A job's `stage` is the next stage to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStage {
    Pending,
    Loading,
    ProjectingFace(u32),
    BuildingMip(u32),
    ConvolvingIrradiance,
    ConvolvingEnvironment(u32),
    Done,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStage::Pending => write!(f, "pending"),
            BuildStage::Loading => write!(f, "loading"),
            BuildStage::ProjectingFace(face) => write!(f, "projecting face {face}"),
            BuildStage::BuildingMip(level) => write!(f, "building mip {level}"),
            BuildStage::ConvolvingIrradiance => write!(f, "convolving irradiance"),
            BuildStage::ConvolvingEnvironment(mip) => write!(f, "convolving environment mip {mip}"),
            BuildStage::Done => write!(f, "done"),
        }
    }
}

/// Stage ordering for one configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StagePlan {
    pub base_mip_count: u32,
    pub roughness_mip_count: u32,
}

impl StagePlan {
    /// Ticks needed to take a job from `Pending` to `Done`.
    pub fn stages_per_job(&self) -> u32 {
        1 + 6 + self.base_mip_count.saturating_sub(1) + 1 + self.roughness_mip_count
    }

    pub fn next(&self, stage: BuildStage) -> BuildStage {
        match stage {
            BuildStage::Pending => BuildStage::Loading,
            BuildStage::Loading => BuildStage::ProjectingFace(0),
            BuildStage::ProjectingFace(face) if face + 1 < 6 => BuildStage::ProjectingFace(face + 1),
            BuildStage::ProjectingFace(_) if self.base_mip_count > 1 => BuildStage::BuildingMip(1),
            BuildStage::ProjectingFace(_) => BuildStage::ConvolvingIrradiance,
            BuildStage::BuildingMip(level) if level + 1 < self.base_mip_count => {
                BuildStage::BuildingMip(level + 1)
            }
            BuildStage::BuildingMip(_) => BuildStage::ConvolvingIrradiance,
            BuildStage::ConvolvingIrradiance => BuildStage::ConvolvingEnvironment(0),
            BuildStage::ConvolvingEnvironment(mip) if mip + 1 < self.roughness_mip_count => {
                BuildStage::ConvolvingEnvironment(mip + 1)
            }
            BuildStage::ConvolvingEnvironment(_) | BuildStage::Done => BuildStage::Done,
        }
    }
}

/// Finished IBL data of one cubemap. Read-only once published.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CubemapSet {
    /// `None` for local grid cells, which share a scratch base cube.
    pub base: Option<TextureHandle>,
    pub irradiance: TextureHandle,
    pub environment: TextureHandle,
    /// Array slice of `irradiance` and `environment` holding this set.
    pub slice: u32,
    pub base_resolution: u32,
    pub base_mip_count: u32,
    pub irradiance_resolution: u32,
    pub environment_resolution: u32,
    pub roughness_mip_count: u32,
}

impl CubemapSet {
    pub fn environment_mip_resolution(&self, mip: u32) -> u32 {
        mip_resolution(self.environment_resolution, mip)
    }
}

/// Textures a job renders into once it has loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobTargets {
    /// Transient equirectangular source.
    pub source: TextureHandle,
    pub base: CubeTarget,
    pub irradiance: CubeTarget,
    pub environment: CubeTarget,
}

impl JobTargets {
    /// Move every output subresource the job writes into render-target state.
    pub fn prepare(&self, backend: &mut dyn RenderBackend) -> Result<(), BackendError> {
        let writable = [
            (self.base.texture, SubresourceRange::Slice(self.base.slice)),
            (self.irradiance.texture, SubresourceRange::Slice(self.irradiance.slice)),
            (self.environment.texture, SubresourceRange::Slice(self.environment.slice)),
        ];
        for (texture, range) in writable {
            backend.transition(texture, ResourceState::ShaderRead, ResourceState::RenderTarget, range)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct CubemapBuildJob {
    pub source: PathBuf,
    pub stage: BuildStage,
    /// Capture position of the face cameras.
    pub eye: Vec3,
    pub targets: Option<JobTargets>,
}

impl CubemapBuildJob {
    pub fn new(source: impl Into<PathBuf>, eye: Vec3) -> Self {
        Self {
            source: source.into(),
            stage: BuildStage::Pending,
            eye,
            targets: None,
        }
    }

    /// Record a successful load. The next stage is the first face projection.
    pub fn begin(&mut self, targets: JobTargets) {
        self.targets = Some(targets);
        self.stage = BuildStage::ProjectingFace(0);
    }

    pub fn is_done(&self) -> bool {
        self.stage == BuildStage::Done
    }

    pub fn source_texture(&self) -> Option<TextureHandle> {
        self.targets.map(|t| t.source)
    }
}

/// The four stage modules configured for one [`IblConfig`].
#[derive(Clone, Copy, Debug)]
pub struct StageRunner {
    pub projector: CubeFaceProjector,
    pub mip_chain: MipChainBuilder,
    pub irradiance: IrradianceConvolver,
    pub environment: EnvironmentConvolver,
}

impl StageRunner {
    pub fn new(config: &IblConfig) -> Self {
        Self {
            projector: CubeFaceProjector,
            mip_chain: MipChainBuilder::full(config.base_resolution),
            irradiance: IrradianceConvolver::new(config),
            environment: EnvironmentConvolver::new(config),
        }
    }

    pub fn plan(&self) -> StagePlan {
        StagePlan {
            base_mip_count: self.mip_chain.level_count(),
            roughness_mip_count: self.environment.roughness_mip_count,
        }
    }

    /// Execute the job's next stage and advance its cursor. Returns the stage
    /// that ran. `Pending` and `Loading` belong to the job's owner, which must
    /// call [`CubemapBuildJob::begin`] first.
    pub fn run_stage(
        &self,
        backend: &mut dyn RenderBackend,
        job: &mut CubemapBuildJob,
    ) -> Result<BuildStage, BackendError> {
        let stage = job.stage;
        let targets = match (stage, job.targets) {
            (BuildStage::Pending | BuildStage::Loading | BuildStage::Done, _) | (_, None) => {
                return Err(BackendError::InvalidTarget(format!(
                    "job for {} cannot render while {stage}",
                    job.source.display()
                )));
            }
            (_, Some(targets)) => targets,
        };

        match stage {
            BuildStage::ProjectingFace(face) => {
                let face = CubeFace::from_index(face).ok_or_else(|| {
                    BackendError::InvalidTarget(format!("cube face {face} does not exist"))
                })?;
                self.projector
                    .project_face(backend, targets.source, targets.base, 0, face, job.eye)?;
            }
            BuildStage::BuildingMip(level) => {
                self.mip_chain.build_level(backend, targets.base, level)?;
            }
            BuildStage::ConvolvingIrradiance => {
                self.mip_chain.seal(backend, targets.base)?;
                self.irradiance
                    .convolve(backend, targets.base.texture, targets.irradiance)?;
            }
            BuildStage::ConvolvingEnvironment(mip) => {
                self.environment
                    .convolve_mip(backend, targets.base.texture, targets.environment, mip)?;
            }
            BuildStage::Pending | BuildStage::Loading | BuildStage::Done => {}
        }

        job.stage = self.plan().next(stage);
        log::trace!("{}: {} -> {}", job.source.display(), stage, job.stage);
        Ok(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(plan: StagePlan) -> Vec<BuildStage> {
        let mut stages = Vec::new();
        let mut stage = BuildStage::Pending;
        while stage != BuildStage::Done {
            stage = plan.next(stage);
            stages.push(stage);
        }
        stages
    }

    #[test]
    fn test_plan_visits_every_stage_once() {
        let plan = StagePlan {
            base_mip_count: 3,
            roughness_mip_count: 2,
        };
        let stages = walk(plan);
        assert_eq!(
            stages,
            vec![
                BuildStage::Loading,
                BuildStage::ProjectingFace(0),
                BuildStage::ProjectingFace(1),
                BuildStage::ProjectingFace(2),
                BuildStage::ProjectingFace(3),
                BuildStage::ProjectingFace(4),
                BuildStage::ProjectingFace(5),
                BuildStage::BuildingMip(1),
                BuildStage::BuildingMip(2),
                BuildStage::ConvolvingIrradiance,
                BuildStage::ConvolvingEnvironment(0),
                BuildStage::ConvolvingEnvironment(1),
                BuildStage::Done,
            ]
        );
        // Every stage but the trailing Done costs one tick.
        assert_eq!(stages.len() as u32 - 1, plan.stages_per_job());
    }

    #[test]
    fn test_single_mip_base_skips_downsampling() {
        let plan = StagePlan {
            base_mip_count: 1,
            roughness_mip_count: 1,
        };
        assert_eq!(plan.next(BuildStage::ProjectingFace(5)), BuildStage::ConvolvingIrradiance);
        assert_eq!(plan.stages_per_job(), 9);
        assert_eq!(walk(plan).len() as u32 - 1, plan.stages_per_job());
    }

    #[test]
    fn test_run_stage_requires_loaded_job() {
        let runner = StageRunner::new(&IblConfig::default());
        let mut backend = crate::backend::cpu::CpuBackend::new();
        let mut job = CubemapBuildJob::new("sky.hdr", Vec3::ZERO);
        assert!(runner.run_stage(&mut backend, &mut job).is_err());
        assert_eq!(job.stage, BuildStage::Pending);
    }
}
