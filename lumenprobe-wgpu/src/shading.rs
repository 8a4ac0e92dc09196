//! Shading-side bindings for `ibl_sample.wgsl`: the local grid arrays, the
//! selected global set and the grid parameters, as bind group 0.

use lumenprobe_gpu_shared::shaders;
use lumenprobe_gpu_shared::uniforms::LocalGridUniforms;
use lumenprobe_ibl::config::ProbeBlendConfig;
use lumenprobe_ibl::grid::LocalGridDescriptor;
use lumenprobe_ibl::job::CubemapSet;
use lumenprobe_ibl::loader::ImageLoader;
use lumenprobe_ibl::IblSystem;

use crate::backend::{GpuTextureKind, WgpuBackend};
use crate::pipeline::{sampler_entry, texture_entry, uniform_entry};
use crate::render_targets;

/// Grid parameters for the shader. `grid` is `None` (or `ready` false) while
/// no complete grid exists; the shader then returns the global sample alone.
pub fn local_grid_uniforms(
    grid: Option<&LocalGridDescriptor>,
    ready: bool,
    blend: &ProbeBlendConfig,
    global: &CubemapSet,
) -> LocalGridUniforms {
    let (origin, cell_size, width, height) = match grid {
        Some(d) => (d.origin.to_array(), d.cell_size, d.width, d.height),
        None => ([0.0; 2], 1.0, 0, 0),
    };
    LocalGridUniforms {
        origin,
        cell_size,
        blend_radius: blend.blend_radius,
        width,
        height,
        half_extent: blend.half_extent,
        grid_ready: u32::from(ready && grid.is_some()),
        global_slice: global.slice,
        max_lod: global.roughness_mip_count.saturating_sub(1) as f32,
        _pad1: 0,
        _pad2: 0,
    }
}

/// Bind group layout matching ibl_sample.wgsl:
///   0: uniform LocalGridUniforms
///   1: texture_cube_array (local irradiance)
///   2: texture_cube_array (local environment)
///   3: texture_cube (global irradiance)
///   4: texture_cube (global environment)
///   5: sampler
pub fn create_ibl_shading_bgl(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    use wgpu::TextureViewDimension::{Cube, CubeArray};

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("IBL Shading BGL"),
        entries: &[
            uniform_entry(0),
            texture_entry(1, CubeArray),
            texture_entry(2, CubeArray),
            texture_entry(3, Cube),
            texture_entry(4, Cube),
            sampler_entry(5),
        ],
    })
}

/// `ibl_sample.wgsl` followed by the caller's entry points.
pub fn ibl_shader_source(entry_points: &str) -> String {
    format!("{}\n{}", shaders::IBL_SAMPLE, entry_points)
}

/// Long-lived shading resources. Rebuild the bind group whenever the grid
/// becomes ready or the global selection changes.
pub struct IblShadingResources {
    pub bgl: wgpu::BindGroupLayout,
    pub uniform_buffer: wgpu::Buffer,
    /// Stands in for the grid arrays until the grid is ready. Never sampled.
    _placeholder: wgpu::Texture,
    placeholder_view: wgpu::TextureView,
}

impl IblShadingResources {
    pub fn new(device: &wgpu::Device) -> Self {
        let placeholder = render_targets::create_cube_texture(device, "IBL Grid Placeholder", 1, 1, 1);
        let placeholder_view = render_targets::cube_array_view(&placeholder, 1);
        Self {
            bgl: create_ibl_shading_bgl(device),
            uniform_buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Local Grid Uniforms"),
                size: std::mem::size_of::<LocalGridUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            _placeholder: placeholder,
            placeholder_view,
        }
    }

    /// Upload the grid parameters and bind the current textures. `None` until
    /// the selected global set has resolved.
    pub fn bind_group<L: ImageLoader>(&self, system: &IblSystem<WgpuBackend, L>) -> Option<wgpu::BindGroup> {
        let backend = system.backend();
        let global = system.global_cubemap()?;
        let global_irradiance = backend.texture(global.irradiance)?;
        let global_environment = backend.texture(global.environment)?;

        let ready = system.is_local_grid_ready();
        let grid_views = match system.local_grid().filter(|_| ready) {
            Some(grid) => Some((
                array_view(backend, grid.irradiance_array())?,
                array_view(backend, grid.environment_array())?,
            )),
            None => None,
        };
        let (local_irradiance, local_environment) = match &grid_views {
            Some((irradiance, environment)) => (irradiance, environment),
            None => (&self.placeholder_view, &self.placeholder_view),
        };

        let params = local_grid_uniforms(
            system.local_grid_descriptor(),
            ready,
            &system.config().blend,
            global,
        );
        backend
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&params));

        Some(backend.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("IBL Shading BG"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.uniform_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(local_irradiance) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(local_environment) },
                wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::TextureView(&global_irradiance.sample_view) },
                wgpu::BindGroupEntry { binding: 4, resource: wgpu::BindingResource::TextureView(&global_environment.sample_view) },
                wgpu::BindGroupEntry { binding: 5, resource: wgpu::BindingResource::Sampler(backend.cube_sampler()) },
            ],
        }))
    }
}

fn array_view(backend: &WgpuBackend, handle: lumenprobe_ibl::TextureHandle) -> Option<wgpu::TextureView> {
    let texture = backend.texture(handle)?;
    match texture.kind {
        GpuTextureKind::Cube { array_layers, .. } => {
            Some(render_targets::cube_array_view(&texture.texture, array_layers))
        }
        GpuTextureKind::Equirect { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use lumenprobe_ibl::TextureHandle;

    fn global_set() -> CubemapSet {
        CubemapSet {
            base: Some(TextureHandle(1)),
            irradiance: TextureHandle(2),
            environment: TextureHandle(3),
            slice: 0,
            base_resolution: 256,
            base_mip_count: 9,
            irradiance_resolution: 32,
            environment_resolution: 128,
            roughness_mip_count: 5,
        }
    }

    #[test]
    fn test_uniforms_without_grid_disable_local_lookups() {
        let params = local_grid_uniforms(None, true, &ProbeBlendConfig::default(), &global_set());
        assert_eq!(params.grid_ready, 0);
        assert_eq!((params.width, params.height), (0, 0));
        assert_eq!(params.max_lod, 4.0);
    }

    #[test]
    fn test_uniforms_carry_grid_placement() {
        let descriptor = LocalGridDescriptor {
            origin: Vec2::new(-10.0, 5.0),
            cell_size: 5.0,
            width: 3,
            height: 2,
            roughness_mip_count: 5,
        };
        let blend = ProbeBlendConfig::default();

        let pending = local_grid_uniforms(Some(&descriptor), false, &blend, &global_set());
        assert_eq!(pending.grid_ready, 0);

        let ready = local_grid_uniforms(Some(&descriptor), true, &blend, &global_set());
        assert_eq!(ready.grid_ready, 1);
        assert_eq!(ready.origin, [-10.0, 5.0]);
        assert_eq!((ready.width, ready.height), (3, 2));
        assert_eq!(ready.half_extent, blend.half_extent);
        assert_eq!(ready.blend_radius, blend.blend_radius);
    }

    #[test]
    fn test_shader_source_appends_entry_points() {
        let source = ibl_shader_source("@fragment fn fs_main() {}");
        assert!(source.starts_with(shaders::IBL_SAMPLE));
        assert!(source.ends_with("@fragment fn fs_main() {}"));
    }
}
