//! Render pipeline creation for the IBL build passes.
//! Every pass is a fullscreen triangle into one cube face; the pipelines only
//! differ in fragment shader and bind group layout.

use crate::render_targets::HDR_FORMAT;
use lumenprobe_gpu_shared::shaders;
use lumenprobe_ibl::backend::FullscreenPass;

/// Shared fullscreen quad vertex state (used by vertex-index-based full-screen triangle).
fn fullscreen_vertex_state(module: &wgpu::ShaderModule) -> wgpu::VertexState<'_> {
    wgpu::VertexState {
        module,
        entry_point: Some("vs_main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        buffers: &[],
    }
}

pub(crate) fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn texture_entry(binding: u32, view_dimension: wgpu::TextureViewDimension) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

pub(crate) fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

/// Bind group layout for a build pass:
///   0: uniform params
///   1: source texture (`view_dimension`)
///   2: sampler, when `with_sampler`
pub fn create_build_bind_group_layout(
    device: &wgpu::Device,
    label: &str,
    view_dimension: wgpu::TextureViewDimension,
    with_sampler: bool,
) -> wgpu::BindGroupLayout {
    let mut entries = vec![uniform_entry(0), texture_entry(1, view_dimension)];
    if with_sampler {
        entries.push(sampler_entry(2));
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

/// Create a fullscreen pipeline with a given fragment shader and output format.
pub fn create_fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    frag_source: &str,
    bgl: &wgpu::BindGroupLayout,
    output_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let vert_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Fullscreen Vert"),
        source: wgpu::ShaderSource::Wgsl(shaders::FULLSCREEN_QUAD_VERT.into()),
    });

    let frag_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(frag_source.into()),
    });

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{label} Layout")),
        bind_group_layouts: &[bgl],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: fullscreen_vertex_state(&vert_module),
        fragment: Some(wgpu::FragmentState {
            module: &frag_module,
            entry_point: Some("fs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: output_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// A fullscreen pipeline and the layout of its single bind group.
pub struct BuildPipeline {
    pub label: &'static str,
    pub pipeline: wgpu::RenderPipeline,
    pub bgl: wgpu::BindGroupLayout,
}

impl BuildPipeline {
    fn new(
        device: &wgpu::Device,
        label: &'static str,
        frag_source: &str,
        view_dimension: wgpu::TextureViewDimension,
        with_sampler: bool,
    ) -> Self {
        let bgl = create_build_bind_group_layout(device, &format!("{label} BGL"), view_dimension, with_sampler);
        let pipeline = create_fullscreen_pipeline(device, label, frag_source, &bgl, HDR_FORMAT);
        Self { label, pipeline, bgl }
    }
}

/// One pipeline per [`FullscreenPass`] kind, created once per device.
pub struct IblPipelines {
    pub project: BuildPipeline,
    pub downsample: BuildPipeline,
    pub irradiance: BuildPipeline,
    pub prefilter: BuildPipeline,
}

impl IblPipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        use wgpu::TextureViewDimension::{Cube, D2};

        Self {
            project: BuildPipeline::new(
                device,
                "Equirect To Cube",
                &shaders::with_cube_common(shaders::EQUIRECT_TO_CUBE_FRAG),
                D2,
                true,
            ),
            downsample: BuildPipeline::new(device, "Cube Downsample", shaders::DOWNSAMPLE_FRAG, D2, false),
            irradiance: BuildPipeline::new(
                device,
                "Irradiance Convolution",
                &shaders::with_cube_common(shaders::IRRADIANCE_FRAG),
                Cube,
                true,
            ),
            prefilter: BuildPipeline::new(
                device,
                "Environment Prefilter",
                &shaders::with_cube_common(shaders::PREFILTER_FRAG),
                Cube,
                true,
            ),
        }
    }

    pub fn for_pass(&self, pass: &FullscreenPass) -> &BuildPipeline {
        match pass {
            FullscreenPass::ProjectEquirect { .. } => &self.project,
            FullscreenPass::Downsample => &self.downsample,
            FullscreenPass::Irradiance { .. } => &self.irradiance,
            FullscreenPass::Prefilter { .. } => &self.prefilter,
        }
    }
}
