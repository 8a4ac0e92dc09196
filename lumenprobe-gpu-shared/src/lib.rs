//! GPU-side data shared by the lumenprobe backends: uniform blocks and WGSL sources.

pub mod shaders;
pub mod uniforms;
