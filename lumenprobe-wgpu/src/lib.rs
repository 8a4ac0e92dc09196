//! wgpu render backend for the lumenprobe IBL builders.
//!
//! [`WgpuBackend`] implements [`lumenprobe_ibl::RenderBackend`] on a headless
//! (or borrowed) wgpu device. [`shading`] exposes the finished textures to
//! renderers through `ibl_sample.wgsl`.

pub mod backend;
pub mod brdf_lut;
pub mod passes;
pub mod pipeline;
pub mod render_targets;
pub mod shading;

pub use backend::{GpuTexture, GpuTextureKind, WgpuBackend};
pub use brdf_lut::generate_brdf_lut;
pub use shading::IblShadingResources;
