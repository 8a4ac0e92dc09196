//! Roughness-stratified specular prefiltering.

use crate::backend::{
    FullscreenDraw, FullscreenPass, RenderBackend, ResourceState, SubresourceRange, TextureHandle,
};
use crate::config::IblConfig;
use crate::cube::{mip_resolution, CUBE_FACES};
use crate::error::BackendError;
use crate::projector::CubeTarget;

/// Prefilters mip `m` of the environment cube with a GGX lobe of roughness
/// `m / (roughness_mip_count - 1)`, importance sampling the base cube.
#[derive(Clone, Copy, Debug)]
pub struct EnvironmentConvolver {
    pub resolution: u32,
    pub roughness_mip_count: u32,
    pub sample_count: u32,
    /// Face size of the base cube's mip 0, used for the PDF-based source mip bias.
    pub source_resolution: u32,
}

impl EnvironmentConvolver {
    pub fn new(config: &IblConfig) -> Self {
        Self {
            resolution: config.environment_resolution,
            roughness_mip_count: config.roughness_mip_count,
            sample_count: config.prefilter_sample_count,
            source_resolution: config.base_resolution,
        }
    }

    pub fn roughness_for_mip(mip: u32, roughness_mip_count: u32) -> f32 {
        if roughness_mip_count <= 1 {
            return 0.0;
        }
        mip.min(roughness_mip_count - 1) as f32 / (roughness_mip_count - 1) as f32
    }

    pub fn mip_resolution(&self, mip: u32) -> u32 {
        mip_resolution(self.resolution, mip)
    }

    /// Draw the six faces of mip `mip`. After the last mip the target slice is
    /// made shader-readable and `true` is returned.
    pub fn convolve_mip(
        &self,
        backend: &mut dyn RenderBackend,
        source: TextureHandle,
        target: CubeTarget,
        mip: u32,
    ) -> Result<bool, BackendError> {
        let roughness = Self::roughness_for_mip(mip, self.roughness_mip_count);
        for face in 0..CUBE_FACES {
            backend.render_fullscreen(&FullscreenDraw {
                target: target.texture,
                slice: target.slice,
                face,
                mip,
                pass: FullscreenPass::Prefilter {
                    source,
                    roughness,
                    source_resolution: self.source_resolution,
                    sample_count: self.sample_count,
                },
            })?;
        }

        if mip + 1 < self.roughness_mip_count {
            return Ok(false);
        }
        backend.transition(
            target.texture,
            ResourceState::RenderTarget,
            ResourceState::ShaderRead,
            SubresourceRange::Slice(target.slice),
        )?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roughness_spans_zero_to_one() {
        assert_eq!(EnvironmentConvolver::roughness_for_mip(0, 5), 0.0);
        assert_eq!(EnvironmentConvolver::roughness_for_mip(2, 5), 0.5);
        assert_eq!(EnvironmentConvolver::roughness_for_mip(4, 5), 1.0);
        assert_eq!(EnvironmentConvolver::roughness_for_mip(0, 1), 0.0);
    }

    #[test]
    fn test_roughness_is_monotonic() {
        let mut previous = -1.0;
        for mip in 0..6 {
            let roughness = EnvironmentConvolver::roughness_for_mip(mip, 6);
            assert!(roughness > previous);
            previous = roughness;
        }
    }
}
