//! Box-filtered mip chain of a cube target.

use crate::backend::{FullscreenDraw, FullscreenPass, RenderBackend, ResourceState, SubresourceRange};
use crate::cube::{mip_chain_length, mip_resolution, CUBE_FACES};
use crate::error::BackendError;
use crate::projector::CubeTarget;

/// Builds levels `1..level_count` of a cube whose mip 0 is already rendered.
///
/// Each level is a 2x2 box downsample of the one above it. Level `L - 1` is
/// moved to shader-read just before level `L` is drawn, so after the last
/// level only the final mip is still a render target (see [`MipChainBuilder::seal`]).
#[derive(Clone, Copy, Debug)]
pub struct MipChainBuilder {
    base_resolution: u32,
    level_count: u32,
}

impl MipChainBuilder {
    /// Requests past the 1x1 level are truncated to a full chain.
    pub fn new(base_resolution: u32, requested_levels: u32) -> Self {
        Self {
            base_resolution,
            level_count: requested_levels.min(mip_chain_length(base_resolution)).max(1),
        }
    }

    pub fn full(base_resolution: u32) -> Self {
        Self::new(base_resolution, u32::MAX)
    }

    pub fn level_count(&self) -> u32 {
        self.level_count
    }

    pub fn resolution(&self, level: u32) -> u32 {
        mip_resolution(self.base_resolution, level)
    }

    /// Render `level` from `level - 1`. Returns `false` without drawing when
    /// the level is outside the chain.
    pub fn build_level(
        &self,
        backend: &mut dyn RenderBackend,
        target: CubeTarget,
        level: u32,
    ) -> Result<bool, BackendError> {
        if level == 0 || level >= self.level_count {
            return Ok(false);
        }
        backend.transition(
            target.texture,
            ResourceState::RenderTarget,
            ResourceState::ShaderRead,
            SubresourceRange::Mip {
                slice: target.slice,
                level: level - 1,
            },
        )?;
        for face in 0..CUBE_FACES {
            backend.render_fullscreen(&FullscreenDraw {
                target: target.texture,
                slice: target.slice,
                face,
                mip: level,
                pass: FullscreenPass::Downsample,
            })?;
        }
        log::trace!(
            "Downsampled {} level {} ({}px)",
            target.texture,
            level,
            self.resolution(level)
        );
        Ok(true)
    }

    /// Make the last level shader-readable, leaving the whole chain readable.
    pub fn seal(&self, backend: &mut dyn RenderBackend, target: CubeTarget) -> Result<(), BackendError> {
        backend.transition(
            target.texture,
            ResourceState::RenderTarget,
            ResourceState::ShaderRead,
            SubresourceRange::Mip {
                slice: target.slice,
                level: self.level_count - 1,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cpu::CpuBackend;
    use crate::backend::CubeTextureDesc;

    #[test]
    fn test_requested_levels_are_truncated() {
        assert_eq!(MipChainBuilder::new(16, 40).level_count(), 5);
        assert_eq!(MipChainBuilder::new(16, 3).level_count(), 3);
        assert_eq!(MipChainBuilder::full(1).level_count(), 1);
        assert_eq!(MipChainBuilder::full(6).resolution(2), 1);
    }

    #[test]
    fn test_build_and_seal_leave_chain_readable() {
        let mut backend = CpuBackend::new();
        let builder = MipChainBuilder::full(8);
        let texture = backend
            .create_cube_texture(&CubeTextureDesc {
                label: "chain".into(),
                resolution: 8,
                mip_count: builder.level_count(),
                array_layers: 1,
            })
            .unwrap();
        backend
            .transition(texture, ResourceState::ShaderRead, ResourceState::RenderTarget, SubresourceRange::All)
            .unwrap();

        let target = CubeTarget::new(texture, 0);
        for level in 1..builder.level_count() {
            assert!(builder.build_level(&mut backend, target, level).unwrap());
        }
        assert!(!builder.build_level(&mut backend, target, builder.level_count()).unwrap());
        builder.seal(&mut backend, target).unwrap();

        let cube = backend.cube(texture).unwrap();
        for mip in 0..builder.level_count() {
            assert_eq!(cube.state(0, 0, mip), Some(ResourceState::ShaderRead));
        }
        assert_eq!(backend.stats().draws, 6 * 3);
    }
}
