//! Diffuse irradiance convolution.

use crate::backend::{
    FullscreenDraw, FullscreenPass, RenderBackend, ResourceState, SubresourceRange, TextureHandle,
};
use crate::config::IblConfig;
use crate::cube::CUBE_FACES;
use crate::error::BackendError;
use crate::projector::CubeTarget;

/// Integrates the cosine-weighted hemisphere around every output direction.
///
/// The source is read at a fixed level of detail so the integral runs over a
/// small mip instead of the full-resolution face.
#[derive(Clone, Copy, Debug)]
pub struct IrradianceConvolver {
    pub resolution: u32,
    pub sample_delta: f32,
    pub source_lod: f32,
}

impl IrradianceConvolver {
    pub fn new(config: &IblConfig) -> Self {
        let max_lod = config.base_mip_count().saturating_sub(1) as f32;
        let ratio = config.base_resolution as f32 / config.irradiance_source_resolution as f32;
        Self {
            resolution: config.irradiance_resolution,
            sample_delta: config.irradiance_sample_delta,
            source_lod: ratio.log2().clamp(0.0, max_lod),
        }
    }

    /// Draw all six faces, then make the target slice shader-readable.
    pub fn convolve(
        &self,
        backend: &mut dyn RenderBackend,
        source: TextureHandle,
        target: CubeTarget,
    ) -> Result<(), BackendError> {
        for face in 0..CUBE_FACES {
            backend.render_fullscreen(&FullscreenDraw {
                target: target.texture,
                slice: target.slice,
                face,
                mip: 0,
                pass: FullscreenPass::Irradiance {
                    source,
                    source_lod: self.source_lod,
                    sample_delta: self.sample_delta,
                },
            })?;
        }
        backend.transition(
            target.texture,
            ResourceState::RenderTarget,
            ResourceState::ShaderRead,
            SubresourceRange::Slice(target.slice),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_source_lod_selects_matching_mip() {
        let config = IblConfig::default();
        // 256 -> 64 is two halvings.
        assert_abs_diff_eq!(IrradianceConvolver::new(&config).source_lod, 2.0, epsilon = 1e-6);

        let small = config.with_base_resolution(16).with_irradiance_source_resolution(64);
        assert_eq!(IrradianceConvolver::new(&small).source_lod, 0.0);

        let tiny_source = IblConfig::default().with_irradiance_source_resolution(1);
        assert_abs_diff_eq!(IrradianceConvolver::new(&tiny_source).source_lod, 8.0, epsilon = 1e-6);
    }
}
