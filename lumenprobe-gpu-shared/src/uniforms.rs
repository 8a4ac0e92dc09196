use bytemuck::{Pod, Zeroable};

/// Equirect-to-cube projection, one face camera per draw.
/// Matches equirect_to_cube.wgsl, group 0 binding 0.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct ProjectUniforms {
    pub inv_view_proj: [[f32; 4]; 4],
    /// xyz = camera position, w unused.
    pub eye: [f32; 4],
    pub target_size: f32,
    pub _pad1: f32,
    pub _pad2: f32,
    pub _pad3: f32,
}

/// 2x2 box filter of the parent mip.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct DownsampleUniforms {
    pub parent_size: u32,
    pub _pad1: u32,
    pub _pad2: u32,
    pub _pad3: u32,
}

/// Hemisphere irradiance integral.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct IrradianceUniforms {
    pub face: u32,
    pub target_size: f32,
    pub source_lod: f32,
    pub sample_delta: f32,
}

/// GGX prefilter of one roughness mip.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct PrefilterUniforms {
    pub face: u32,
    pub target_size: f32,
    pub roughness: f32,
    pub source_resolution: f32,
    pub sample_count: u32,
    pub _pad1: u32,
    pub _pad2: u32,
    pub _pad3: u32,
}

/// Local cubemap grid parameters read by ibl_sample.wgsl, group 0 binding 0.
/// `grid_ready` is 0 until every cell has been built; shaders then skip the
/// grid arrays entirely.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct LocalGridUniforms {
    /// World-space XZ of the grid's minimum corner.
    pub origin: [f32; 2],
    pub cell_size: f32,
    pub blend_radius: f32,
    pub width: u32,
    pub height: u32,
    pub half_extent: f32,
    pub grid_ready: u32,
    pub global_slice: u32,
    pub max_lod: f32,
    pub _pad1: u32,
    pub _pad2: u32,
}
