//! Render backend contract consumed by the IBL builders.
//!
//! A backend owns every texture and hands out [`TextureHandle`]s. Draws are
//! recorded in program order and become visible to the GPU on [`RenderBackend::submit`].
//! Resource state is tracked per (array slice, face, mip) subresource.

pub mod cpu;
mod state;

use std::fmt;

use crate::blend::CubeSampler;
use crate::cube::FaceCamera;
use crate::error::BackendError;
use crate::loader::EquirectImage;

pub use state::SubresourceStates;

/// Index into a backend-owned texture table. Never 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

impl fmt::Display for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture #{}", self.0)
    }
}

/// Usage state of a texture subresource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceState {
    RenderTarget,
    ShaderRead,
}

/// Subresources affected by a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubresourceRange {
    All,
    /// Every face and mip of one array slice.
    Slice(u32),
    /// Every mip of one face.
    Face { slice: u32, face: u32 },
    /// All six faces of one mip level.
    Mip { slice: u32, level: u32 },
}

/// Creation parameters for a cube texture or texture-cube-array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CubeTextureDesc {
    pub label: String,
    pub resolution: u32,
    pub mip_count: u32,
    /// Number of cubes; 1 for a plain cube texture.
    pub array_layers: u32,
}

/// Shader inputs of one full-screen draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FullscreenPass {
    /// Sample an equirectangular source along the face camera's per-pixel direction.
    ProjectEquirect {
        source: TextureHandle,
        camera: FaceCamera,
    },
    /// 2x2 box filter of mip `mip - 1` of the draw target itself.
    Downsample,
    /// Cosine-weighted hemisphere integral of a cube texture.
    Irradiance {
        source: TextureHandle,
        source_lod: f32,
        sample_delta: f32,
    },
    /// GGX importance-sampled prefilter of a cube texture.
    Prefilter {
        source: TextureHandle,
        roughness: f32,
        source_resolution: u32,
        sample_count: u32,
    },
}

/// A full-screen draw into one face/mip/slice of a cube target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FullscreenDraw {
    pub target: TextureHandle,
    pub slice: u32,
    pub face: u32,
    pub mip: u32,
    pub pass: FullscreenPass,
}

pub trait RenderBackend {
    /// Allocate a cube texture; every subresource starts in [`ResourceState::ShaderRead`].
    fn create_cube_texture(&mut self, desc: &CubeTextureDesc) -> Result<TextureHandle, BackendError>;

    /// Upload an equirectangular panorama as a shader-readable 2D texture.
    fn create_equirect_texture(
        &mut self,
        label: &str,
        image: &EquirectImage,
    ) -> Result<TextureHandle, BackendError>;

    /// Record one full-screen draw. The target subresource must be a render
    /// target and every subresource it reads must be shader-readable.
    fn render_fullscreen(&mut self, draw: &FullscreenDraw) -> Result<(), BackendError>;

    fn transition(
        &mut self,
        handle: TextureHandle,
        from: ResourceState,
        to: ResourceState,
        range: SubresourceRange,
    ) -> Result<(), BackendError>;

    /// Submit everything recorded since the last submit. Returns the serial of
    /// that submission.
    fn submit(&mut self) -> u64;

    /// Serial of the most recent submission (0 before the first).
    fn last_submitted(&self) -> u64;

    /// Block until the GPU has retired all submitted work. Returns the serial
    /// known to be complete.
    fn wait_idle(&mut self) -> Result<u64, BackendError>;

    fn release(&mut self, handle: TextureHandle) -> Result<(), BackendError>;

    fn is_alive(&self, handle: TextureHandle) -> bool;
}

/// Backends whose cube textures can be sampled on the CPU.
pub trait CubeSource {
    fn cube_sampler(&self, handle: TextureHandle) -> Option<&dyn CubeSampler>;
}
