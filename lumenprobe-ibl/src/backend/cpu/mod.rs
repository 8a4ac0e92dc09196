//! Deterministic software render backend.
//!
//! Draws execute immediately on the CPU but are still accounted against the
//! current submission, so serial bookkeeping and deferred release behave
//! exactly as they would on a GPU queue. Releasing a texture that a
//! not-yet-retired submission used is rejected.

mod kernels;
mod texture;

use std::cell::Cell;

use super::{
    CubeSource, CubeTextureDesc, FullscreenDraw, FullscreenPass, RenderBackend, ResourceState,
    SubresourceRange, TextureHandle,
};
use crate::blend::CubeSampler;
use crate::cube::CUBE_FACES;
use crate::error::BackendError;
use crate::handle::HandleStore;
use crate::loader::EquirectImage;

pub use texture::{CpuCubeTexture, CpuEquirect, CpuTexture};

/// Counters exposed for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuBackendStats {
    pub textures_created: u64,
    pub draws: u64,
    pub transitions: u64,
    pub submissions: u64,
    pub idle_waits: u64,
    pub releases: u64,
}

struct Slot {
    texture: CpuTexture,
    /// Serial of the submission that last touched this texture.
    last_used: u64,
}

pub struct CpuBackend {
    textures: HandleStore<Slot>,
    submitted: u64,
    completed: u64,
    stats: CpuBackendStats,
    allocation_limit: Option<usize>,
    transition_limit: Option<u64>,
    max_resolution: u32,
    max_array_layers: u32,
    sampler_lookups: Cell<u64>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            textures: HandleStore::new(),
            submitted: 0,
            completed: 0,
            stats: CpuBackendStats::default(),
            allocation_limit: None,
            transition_limit: None,
            max_resolution: 16384,
            max_array_layers: 2048,
            sampler_lookups: Cell::new(0),
        }
    }

    /// Fail allocations once `limit` textures are alive.
    pub fn with_allocation_limit(mut self, limit: usize) -> Self {
        self.allocation_limit = Some(limit);
        self
    }

    /// Reject every transition after the first `limit`.
    pub fn with_transition_limit(mut self, limit: u64) -> Self {
        self.transition_limit = Some(limit);
        self
    }

    /// Largest cube face or panorama edge the backend accepts.
    pub fn with_max_resolution(mut self, max_resolution: u32) -> Self {
        self.max_resolution = max_resolution;
        self
    }

    /// Most 2D layers (six per cube) a cube array may have.
    pub fn with_max_array_layers(mut self, max_array_layers: u32) -> Self {
        self.max_array_layers = max_array_layers;
        self
    }

    pub fn stats(&self) -> CpuBackendStats {
        self.stats
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn completed_serial(&self) -> u64 {
        self.completed
    }

    /// Number of times a cube texture was handed out for CPU sampling.
    pub fn sampler_lookups(&self) -> u64 {
        self.sampler_lookups.get()
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&CpuTexture> {
        self.textures.get(handle.0).map(|slot| &slot.texture)
    }

    pub fn cube(&self, handle: TextureHandle) -> Option<&CpuCubeTexture> {
        self.texture(handle).and_then(CpuTexture::as_cube)
    }

    fn check_allocation(&self, label: &str, width: u32, height: u32) -> Result<(), BackendError> {
        if width == 0 || height == 0 {
            return Err(BackendError::Allocation {
                label: label.to_string(),
                reason: "zero-sized texture".into(),
            });
        }
        if width > self.max_resolution || height > self.max_resolution {
            return Err(BackendError::Allocation {
                label: label.to_string(),
                reason: format!("{width}x{height} exceeds the {} texel limit", self.max_resolution),
            });
        }
        if let Some(limit) = self.allocation_limit {
            if self.textures.len() >= limit {
                return Err(BackendError::Allocation {
                    label: label.to_string(),
                    reason: format!("texture budget of {limit} exhausted"),
                });
            }
        }
        Ok(())
    }

    fn slot(&self, handle: TextureHandle) -> Result<&Slot, BackendError> {
        self.textures
            .get(handle.0)
            .ok_or(BackendError::UnknownHandle(handle))
    }

    fn source_cube(&self, handle: TextureHandle, target: TextureHandle) -> Result<&CpuCubeTexture, BackendError> {
        if handle == target {
            return Err(BackendError::InvalidTarget(format!("{handle} cannot be read while it is the draw target")));
        }
        let slot = self.slot(handle)?;
        slot.texture
            .states()
            .expect_range(handle, SubresourceRange::All, ResourceState::ShaderRead)?;
        slot.texture
            .as_cube()
            .ok_or_else(|| BackendError::InvalidTarget(format!("{handle} is not a cube texture")))
    }

    /// Compute the texels a draw would write, validating every read.
    fn execute(&self, draw: &FullscreenDraw, target: &CpuCubeTexture) -> Result<Vec<glam::Vec3>, BackendError> {
        let resolution = target.mip_resolution(draw.mip);
        let texels = match draw.pass {
            FullscreenPass::ProjectEquirect { source, camera } => {
                let slot = self.slot(source)?;
                slot.texture.states().expect(source, 0, 0, 0, ResourceState::ShaderRead)?;
                let equirect = slot.texture.as_equirect().ok_or_else(|| {
                    BackendError::InvalidTarget(format!("{source} is not an equirectangular texture"))
                })?;
                kernels::project_face(equirect, &camera, resolution)
            }
            FullscreenPass::Downsample => {
                if draw.mip == 0 {
                    return Err(BackendError::InvalidTarget(format!(
                        "{} mip 0 has no parent level to downsample",
                        draw.target
                    )));
                }
                let parent = draw.mip - 1;
                target
                    .states
                    .expect(draw.target, draw.slice, draw.face, parent, ResourceState::ShaderRead)?;
                kernels::downsample_face(
                    target.level(draw.slice, draw.face, parent),
                    target.mip_resolution(parent),
                    resolution,
                )
            }
            FullscreenPass::Irradiance {
                source,
                source_lod,
                sample_delta,
            } => {
                let cube = self.source_cube(source, draw.target)?;
                kernels::irradiance_face(cube, draw.face, resolution, source_lod, sample_delta)
            }
            FullscreenPass::Prefilter {
                source,
                roughness,
                source_resolution,
                sample_count,
            } => {
                let cube = self.source_cube(source, draw.target)?;
                kernels::prefilter_face(
                    cube,
                    draw.face,
                    resolution,
                    roughness,
                    source_resolution,
                    sample_count,
                )
            }
        };
        Ok(texels)
    }

    fn pass_source(pass: &FullscreenPass) -> Option<TextureHandle> {
        match *pass {
            FullscreenPass::ProjectEquirect { source, .. }
            | FullscreenPass::Irradiance { source, .. }
            | FullscreenPass::Prefilter { source, .. } => Some(source),
            FullscreenPass::Downsample => None,
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for CpuBackend {
    fn create_cube_texture(&mut self, desc: &CubeTextureDesc) -> Result<TextureHandle, BackendError> {
        self.check_allocation(&desc.label, desc.resolution, desc.resolution)?;
        if desc.mip_count == 0 || desc.array_layers == 0 {
            return Err(BackendError::Allocation {
                label: desc.label.clone(),
                reason: "a cube texture needs at least one mip and one layer".into(),
            });
        }
        let layers = desc.array_layers.saturating_mul(CUBE_FACES);
        if layers > self.max_array_layers {
            return Err(BackendError::Allocation {
                label: desc.label.clone(),
                reason: format!("{layers} array layers exceed the limit of {}", self.max_array_layers),
            });
        }
        let cube = CpuCubeTexture::new(&desc.label, desc.resolution, desc.mip_count, desc.array_layers);
        let handle = self.textures.insert(Slot {
            texture: CpuTexture::Cube(cube),
            last_used: 0,
        });
        self.stats.textures_created += 1;
        log::debug!(
            "Created {} '{}' ({}px, {} mips, {} layers)",
            TextureHandle(handle),
            desc.label,
            desc.resolution,
            desc.mip_count,
            desc.array_layers
        );
        Ok(TextureHandle(handle))
    }

    fn create_equirect_texture(
        &mut self,
        label: &str,
        image: &EquirectImage,
    ) -> Result<TextureHandle, BackendError> {
        self.check_allocation(label, image.width, image.height)?;
        let handle = self.textures.insert(Slot {
            texture: CpuTexture::Equirect(CpuEquirect::from_image(image)),
            last_used: 0,
        });
        self.stats.textures_created += 1;
        Ok(TextureHandle(handle))
    }

    fn render_fullscreen(&mut self, draw: &FullscreenDraw) -> Result<(), BackendError> {
        let target = self
            .slot(draw.target)?
            .texture
            .as_cube()
            .ok_or_else(|| BackendError::InvalidTarget(format!("{} is not a cube texture", draw.target)))?;
        if draw.slice >= target.array_layers || draw.face >= CUBE_FACES || draw.mip >= target.mip_count {
            return Err(BackendError::InvalidTarget(format!(
                "{} has no slice {} face {} mip {}",
                draw.target, draw.slice, draw.face, draw.mip
            )));
        }
        target
            .states
            .expect(draw.target, draw.slice, draw.face, draw.mip, ResourceState::RenderTarget)?;

        let texels = self.execute(draw, target)?;

        let serial = self.submitted + 1;
        if let Some(source) = Self::pass_source(&draw.pass) {
            if let Some(slot) = self.textures.get_mut(source.0) {
                slot.last_used = serial;
            }
        }
        let slot = self
            .textures
            .get_mut(draw.target.0)
            .ok_or(BackendError::UnknownHandle(draw.target))?;
        slot.last_used = serial;
        if let CpuTexture::Cube(cube) = &mut slot.texture {
            cube.write_level(draw.slice, draw.face, draw.mip, texels);
        }
        self.stats.draws += 1;
        Ok(())
    }

    fn transition(
        &mut self,
        handle: TextureHandle,
        from: ResourceState,
        to: ResourceState,
        range: SubresourceRange,
    ) -> Result<(), BackendError> {
        if let Some(limit) = self.transition_limit {
            if self.stats.transitions >= limit {
                return Err(BackendError::Device(format!(
                    "transition budget of {limit} exhausted"
                )));
            }
        }
        let serial = self.submitted + 1;
        let slot = self
            .textures
            .get_mut(handle.0)
            .ok_or(BackendError::UnknownHandle(handle))?;
        slot.texture.states_mut().transition(handle, from, to, range)?;
        slot.last_used = serial;
        self.stats.transitions += 1;
        Ok(())
    }

    fn submit(&mut self) -> u64 {
        self.submitted += 1;
        self.stats.submissions += 1;
        self.submitted
    }

    fn last_submitted(&self) -> u64 {
        self.submitted
    }

    fn wait_idle(&mut self) -> Result<u64, BackendError> {
        self.completed = self.submitted;
        self.stats.idle_waits += 1;
        Ok(self.completed)
    }

    fn release(&mut self, handle: TextureHandle) -> Result<(), BackendError> {
        let slot = self.slot(handle)?;
        if slot.last_used > self.completed {
            return Err(BackendError::InvalidTarget(format!(
                "{handle} is still referenced by submission {} (completed {})",
                slot.last_used, self.completed
            )));
        }
        self.textures.remove(handle.0);
        self.stats.releases += 1;
        Ok(())
    }

    fn is_alive(&self, handle: TextureHandle) -> bool {
        self.textures.contains(handle.0)
    }
}

impl CubeSource for CpuBackend {
    fn cube_sampler(&self, handle: TextureHandle) -> Option<&dyn CubeSampler> {
        self.sampler_lookups.set(self.sampler_lookups.get() + 1);
        self.cube(handle).map(|cube| cube as &dyn CubeSampler)
    }
}
