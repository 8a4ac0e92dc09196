//! Equirectangular panorama to cube face projection.

use glam::Vec3;

use crate::backend::{FullscreenDraw, FullscreenPass, RenderBackend, TextureHandle};
use crate::cube::{CubeFace, FaceCamera};
use crate::error::BackendError;

/// One cube of a cube texture or cube array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CubeTarget {
    pub texture: TextureHandle,
    pub slice: u32,
}

impl CubeTarget {
    pub fn new(texture: TextureHandle, slice: u32) -> Self {
        Self { texture, slice }
    }
}

/// Renders a panorama into cube faces through six 90 degree cameras placed at `eye`.
///
/// The target face/mip must already be a render target.
#[derive(Clone, Copy, Debug, Default)]
pub struct CubeFaceProjector;

impl CubeFaceProjector {
    pub fn camera(eye: Vec3, face: CubeFace) -> FaceCamera {
        FaceCamera::new(eye, face)
    }

    pub fn project_face(
        &self,
        backend: &mut dyn RenderBackend,
        source: TextureHandle,
        target: CubeTarget,
        mip: u32,
        face: CubeFace,
        eye: Vec3,
    ) -> Result<(), BackendError> {
        backend.render_fullscreen(&FullscreenDraw {
            target: target.texture,
            slice: target.slice,
            face: face.index(),
            mip,
            pass: FullscreenPass::ProjectEquirect {
                source,
                camera: Self::camera(eye, face),
            },
        })
    }

    pub fn project_all(
        &self,
        backend: &mut dyn RenderBackend,
        source: TextureHandle,
        target: CubeTarget,
        mip: u32,
        eye: Vec3,
    ) -> Result<(), BackendError> {
        for face in CubeFace::ALL {
            self.project_face(backend, source, target, mip, face, eye)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cpu::CpuBackend;
    use crate::backend::{CubeTextureDesc, ResourceState, SubresourceRange};
    use crate::cube::{cube_texel_direction, direction_to_equirect_uv};
    use crate::loader::EquirectImage;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_each_texel_samples_its_own_direction() {
        // Encode the panorama coordinate in the color so every texel can be traced back.
        let image = EquirectImage::from_fn(256, 128, |dir| {
            let uv = direction_to_equirect_uv(dir);
            Vec3::new(uv.x, uv.y, 0.0)
        });
        let mut backend = CpuBackend::new();
        let source = backend.create_equirect_texture("panorama", &image).unwrap();
        let cube = backend
            .create_cube_texture(&CubeTextureDesc {
                label: "cube".into(),
                resolution: 4,
                mip_count: 1,
                array_layers: 1,
            })
            .unwrap();
        backend
            .transition(cube, ResourceState::ShaderRead, ResourceState::RenderTarget, SubresourceRange::All)
            .unwrap();

        CubeFaceProjector
            .project_all(&mut backend, source, CubeTarget::new(cube, 0), 0, Vec3::new(3.0, 1.0, -2.0))
            .unwrap();

        let texture = backend.cube(cube).unwrap();
        // +Z face, a texel away from the panorama seam and poles.
        let (face, x, y) = (4, 2, 1);
        let expected = direction_to_equirect_uv(cube_texel_direction(face, x, y, 4));
        let texel = texture.level(0, face, 0)[(y * 4 + x) as usize];
        assert_abs_diff_eq!(texel.x, expected.x, epsilon = 0.01);
        assert_abs_diff_eq!(texel.y, expected.y, epsilon = 0.01);
    }
}
