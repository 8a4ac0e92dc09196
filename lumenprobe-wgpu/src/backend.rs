use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lumenprobe_gpu_shared::uniforms::{
    DownsampleUniforms, IrradianceUniforms, PrefilterUniforms, ProjectUniforms,
};
use lumenprobe_ibl::backend::{
    CubeTextureDesc, FullscreenDraw, FullscreenPass, RenderBackend, ResourceState, SubresourceRange,
    SubresourceStates, TextureHandle,
};
use lumenprobe_ibl::cube::{mip_resolution, CUBE_FACES};
use lumenprobe_ibl::error::BackendError;
use lumenprobe_ibl::handle::HandleStore;
use lumenprobe_ibl::loader::EquirectImage;
use wgpu::util::DeviceExt;

use crate::passes::cube_face;
use crate::pipeline::IblPipelines;
use crate::render_targets;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpuTextureKind {
    Cube {
        resolution: u32,
        mip_count: u32,
        array_layers: u32,
    },
    Equirect {
        width: u32,
        height: u32,
    },
}

/// GPU texture with its sampling view and tracked subresource states.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    /// Cube/cube-array view over every mip for cubes, plain 2D view for panoramas.
    pub sample_view: wgpu::TextureView,
    pub kind: GpuTextureKind,
    pub label: String,
    states: SubresourceStates,
    /// Serial of the first submission that no longer references this texture.
    last_used: u64,
}

/// Headless wgpu device that records IBL build passes.
///
/// Draws accumulate in one command encoder until [`RenderBackend::submit`].
/// wgpu inserts its own barriers, so transitions only update the tracked
/// states that enforce the draw/read contract.
pub struct WgpuBackend {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    pipelines: IblPipelines,
    cube_sampler: wgpu::Sampler,
    equirect_sampler: wgpu::Sampler,
    textures: HandleStore<GpuTexture>,
    encoder: Option<wgpu::CommandEncoder>,
    recorded_draws: u64,
    submitted: u64,
    completed: Arc<AtomicU64>,
}

impl WgpuBackend {
    /// Create a device without a surface.
    pub fn new_headless() -> Result<Self, BackendError> {
        let _ = env_logger::try_init();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| BackendError::Device("failed to find suitable GPU adapter".into()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Lumenprobe IBL Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(|e| BackendError::Device(format!("failed to create device: {e}")))?;

        Ok(Self::from_device(device, queue, adapter.get_info()))
    }

    /// Wrap an existing device, e.g. one shared with a renderer.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, adapter_info: wgpu::AdapterInfo) -> Self {
        log::info!("IBL backend on {} ({:?})", adapter_info.name, adapter_info.backend);
        let pipelines = IblPipelines::new(&device);
        let cube_sampler = render_targets::create_cube_sampler(&device);
        let equirect_sampler = render_targets::create_equirect_sampler(&device);
        Self {
            device,
            queue,
            adapter_info,
            pipelines,
            cube_sampler,
            equirect_sampler,
            textures: HandleStore::new(),
            encoder: None,
            recorded_draws: 0,
            submitted: 0,
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&GpuTexture> {
        self.textures.get(handle.0)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn recorded_draws(&self) -> u64 {
        self.recorded_draws
    }

    /// Highest serial the queue has reported complete.
    pub fn completed_serial(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    pub fn cube_sampler(&self) -> &wgpu::Sampler {
        &self.cube_sampler
    }

    fn slot(&self, handle: TextureHandle) -> Result<&GpuTexture, BackendError> {
        self.textures.get(handle.0).ok_or(BackendError::UnknownHandle(handle))
    }

    fn check_size(&self, label: &str, width: u32, height: u32, layers: u32) -> Result<(), BackendError> {
        let limits = self.device.limits();
        let reason = if width == 0 || height == 0 {
            Some("zero-sized texture".to_string())
        } else if width > limits.max_texture_dimension_2d || height > limits.max_texture_dimension_2d {
            Some(format!(
                "{width}x{height} exceeds the {} texel limit",
                limits.max_texture_dimension_2d
            ))
        } else if layers > limits.max_texture_array_layers {
            Some(format!(
                "{layers} array layers exceed the limit of {}",
                limits.max_texture_array_layers
            ))
        } else {
            None
        };
        match reason {
            Some(reason) => Err(BackendError::Allocation {
                label: label.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Run `create` inside validation and out-of-memory error scopes.
    fn scoped_create(
        &self,
        label: &str,
        create: impl FnOnce() -> wgpu::Texture,
    ) -> Result<wgpu::Texture, BackendError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = create();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        match validation.or(out_of_memory) {
            Some(err) => {
                texture.destroy();
                Err(BackendError::Allocation {
                    label: label.to_string(),
                    reason: err.to_string(),
                })
            }
            None => Ok(texture),
        }
    }

    fn source_cube(&self, source: TextureHandle, target: TextureHandle) -> Result<&GpuTexture, BackendError> {
        if source == target {
            return Err(BackendError::InvalidTarget(format!(
                "{source} cannot be read while it is the draw target"
            )));
        }
        let slot = self.slot(source)?;
        match slot.kind {
            GpuTextureKind::Cube { array_layers: 1, .. } => {}
            _ => {
                return Err(BackendError::InvalidTarget(format!(
                    "{source} is not a single cube texture"
                )))
            }
        }
        slot.states
            .expect_range(source, SubresourceRange::All, ResourceState::ShaderRead)?;
        Ok(slot)
    }

    fn uniform_buffer<T: bytemuck::Pod>(&self, label: &str, params: &T) -> wgpu::Buffer {
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(params),
            usage: wgpu::BufferUsages::UNIFORM,
        })
    }

    /// Validate the reads of `draw` and build its bind group.
    fn bind_pass(
        &self,
        draw: &FullscreenDraw,
        target: &GpuTexture,
        resolution: u32,
    ) -> Result<wgpu::BindGroup, BackendError> {
        let size = mip_resolution(resolution, draw.mip);
        let pipeline = self.pipelines.for_pass(&draw.pass);
        let bind_group = match draw.pass {
            FullscreenPass::ProjectEquirect { source, camera } => {
                let slot = self.slot(source)?;
                if !matches!(slot.kind, GpuTextureKind::Equirect { .. }) {
                    return Err(BackendError::InvalidTarget(format!(
                        "{source} is not an equirectangular texture"
                    )));
                }
                slot.states.expect(source, 0, 0, 0, ResourceState::ShaderRead)?;
                let params = ProjectUniforms {
                    inv_view_proj: camera.inverse_view_projection().to_cols_array_2d(),
                    eye: camera.eye.extend(1.0).to_array(),
                    target_size: size as f32,
                    _pad1: 0.0,
                    _pad2: 0.0,
                    _pad3: 0.0,
                };
                let buffer = self.uniform_buffer("Project Uniforms", &params);
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Project BG"),
                    layout: &pipeline.bgl,
                    entries: &[
                        wgpu::BindGroupEntry { binding: 0, resource: buffer.as_entire_binding() },
                        wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&slot.sample_view) },
                        wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(&self.equirect_sampler) },
                    ],
                })
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
                let parent_view = render_targets::face_view(&target.texture, draw.slice, draw.face, parent);
                let params = DownsampleUniforms {
                    parent_size: mip_resolution(resolution, parent),
                    _pad1: 0,
                    _pad2: 0,
                    _pad3: 0,
                };
                let buffer = self.uniform_buffer("Downsample Uniforms", &params);
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Downsample BG"),
                    layout: &pipeline.bgl,
                    entries: &[
                        wgpu::BindGroupEntry { binding: 0, resource: buffer.as_entire_binding() },
                        wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&parent_view) },
                    ],
                })
            }
            FullscreenPass::Irradiance {
                source,
                source_lod,
                sample_delta,
            } => {
                let slot = self.source_cube(source, draw.target)?;
                let params = IrradianceUniforms {
                    face: draw.face,
                    target_size: size as f32,
                    source_lod,
                    sample_delta,
                };
                let buffer = self.uniform_buffer("Irradiance Uniforms", &params);
                self.cube_source_bind_group("Irradiance BG", &pipeline.bgl, &buffer, slot)
            }
            FullscreenPass::Prefilter {
                source,
                roughness,
                source_resolution,
                sample_count,
            } => {
                let slot = self.source_cube(source, draw.target)?;
                let params = PrefilterUniforms {
                    face: draw.face,
                    target_size: size as f32,
                    roughness,
                    source_resolution: source_resolution as f32,
                    sample_count,
                    _pad1: 0,
                    _pad2: 0,
                    _pad3: 0,
                };
                let buffer = self.uniform_buffer("Prefilter Uniforms", &params);
                self.cube_source_bind_group("Prefilter BG", &pipeline.bgl, &buffer, slot)
            }
        };
        Ok(bind_group)
    }

    fn cube_source_bind_group(
        &self,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        buffer: &wgpu::Buffer,
        source: &GpuTexture,
    ) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&source.sample_view) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(&self.cube_sampler) },
            ],
        })
    }

    fn pass_source(pass: &FullscreenPass) -> Option<TextureHandle> {
        match *pass {
            FullscreenPass::ProjectEquirect { source, .. }
            | FullscreenPass::Irradiance { source, .. }
            | FullscreenPass::Prefilter { source, .. } => Some(source),
            FullscreenPass::Downsample => None,
        }
    }

    fn touch(&mut self, handle: TextureHandle) {
        let serial = self.submitted + 1;
        if let Some(slot) = self.textures.get_mut(handle.0) {
            slot.last_used = serial;
        }
    }
}

impl RenderBackend for WgpuBackend {
    fn create_cube_texture(&mut self, desc: &CubeTextureDesc) -> Result<TextureHandle, BackendError> {
        if desc.mip_count == 0 || desc.array_layers == 0 {
            return Err(BackendError::Allocation {
                label: desc.label.clone(),
                reason: "a cube texture needs at least one mip and one layer".into(),
            });
        }
        self.check_size(&desc.label, desc.resolution, desc.resolution, desc.array_layers.saturating_mul(CUBE_FACES))?;

        let texture = self.scoped_create(&desc.label, || {
            render_targets::create_cube_texture(
                &self.device,
                &desc.label,
                desc.resolution,
                desc.mip_count,
                desc.array_layers,
            )
        })?;
        let sample_view = render_targets::cube_sample_view(&texture, desc.array_layers);
        let handle = self.textures.insert(GpuTexture {
            texture,
            sample_view,
            kind: GpuTextureKind::Cube {
                resolution: desc.resolution,
                mip_count: desc.mip_count,
                array_layers: desc.array_layers,
            },
            label: desc.label.clone(),
            states: SubresourceStates::new(desc.array_layers, CUBE_FACES, desc.mip_count, ResourceState::ShaderRead),
            last_used: 0,
        });
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
        self.check_size(label, image.width, image.height, 1)?;
        let texture = self.scoped_create(label, || {
            render_targets::create_equirect_texture(&self.device, &self.queue, label, image)
        })?;
        let sample_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let handle = self.textures.insert(GpuTexture {
            texture,
            sample_view,
            kind: GpuTextureKind::Equirect {
                width: image.width,
                height: image.height,
            },
            label: label.to_string(),
            states: SubresourceStates::new(1, 1, 1, ResourceState::ShaderRead),
            last_used: 0,
        });
        Ok(TextureHandle(handle))
    }

    fn render_fullscreen(&mut self, draw: &FullscreenDraw) -> Result<(), BackendError> {
        let target = self.slot(draw.target)?;
        let GpuTextureKind::Cube {
            resolution,
            mip_count,
            array_layers,
        } = target.kind
        else {
            return Err(BackendError::InvalidTarget(format!("{} is not a cube texture", draw.target)));
        };
        if draw.slice >= array_layers || draw.face >= CUBE_FACES || draw.mip >= mip_count {
            return Err(BackendError::InvalidTarget(format!(
                "{} has no slice {} face {} mip {}",
                draw.target, draw.slice, draw.face, draw.mip
            )));
        }
        target
            .states
            .expect(draw.target, draw.slice, draw.face, draw.mip, ResourceState::RenderTarget)?;

        let bind_group = self.bind_pass(draw, target, resolution)?;
        let view = render_targets::face_view(&target.texture, draw.slice, draw.face, draw.mip);

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("IBL Build Encoder"),
            })
        });
        let pipeline = self.pipelines.for_pass(&draw.pass);
        cube_face::render_cube_face(encoder, &view, &pipeline.pipeline, &bind_group, pipeline.label);

        if let Some(source) = Self::pass_source(&draw.pass) {
            self.touch(source);
        }
        self.touch(draw.target);
        self.recorded_draws += 1;
        Ok(())
    }

    fn transition(
        &mut self,
        handle: TextureHandle,
        from: ResourceState,
        to: ResourceState,
        range: SubresourceRange,
    ) -> Result<(), BackendError> {
        let slot = self
            .textures
            .get_mut(handle.0)
            .ok_or(BackendError::UnknownHandle(handle))?;
        slot.states.transition(handle, from, to, range)?;
        self.touch(handle);
        Ok(())
    }

    fn submit(&mut self) -> u64 {
        let encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("IBL Empty Submit"),
            }),
        };
        self.queue.submit(Some(encoder.finish()));
        self.submitted += 1;

        let serial = self.submitted;
        let completed = Arc::clone(&self.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(serial, Ordering::AcqRel);
        });
        log::trace!("Submitted IBL work as serial {serial}");
        serial
    }

    fn last_submitted(&self) -> u64 {
        self.submitted
    }

    fn wait_idle(&mut self) -> Result<u64, BackendError> {
        if !self.device.poll(wgpu::Maintain::Wait).is_queue_empty() {
            log::warn!("Queue still busy after a blocking poll");
        }
        self.completed.fetch_max(self.submitted, Ordering::AcqRel);
        Ok(self.completed_serial())
    }

    fn release(&mut self, handle: TextureHandle) -> Result<(), BackendError> {
        let slot = self.slot(handle)?;
        let completed = self.completed_serial();
        if slot.last_used > completed {
            return Err(BackendError::InvalidTarget(format!(
                "{handle} is still referenced by submission {} (completed {completed})",
                slot.last_used
            )));
        }
        if let Some(slot) = self.textures.remove(handle.0) {
            log::debug!("Released {handle} '{}'", slot.label);
            slot.texture.destroy();
        }
        Ok(())
    }

    fn is_alive(&self, handle: TextureHandle) -> bool {
        self.textures.contains(handle.0)
    }
}
