//! Cube face geometry, face cameras, equirectangular mapping and mip chain sizes.
//!
//! Face order and texel orientation follow the usual GPU convention:
//! +X, -X, +Y, -Y, +Z, -Z with texel row 0 at the top of each face.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::{Mat4, Vec2, Vec3, Vec4};

/// Number of faces of a cube texture.
pub const CUBE_FACES: u32 = 6;

const FACE_NEAR: f32 = 0.1;
const FACE_FAR: f32 = 10.0;

/// One face of a cube texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> u32 {
        self as u32
    }

    /// Look direction of the face camera.
    pub fn forward(self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::X,
            CubeFace::NegativeX => Vec3::NEG_X,
            CubeFace::PositiveY => Vec3::Y,
            CubeFace::NegativeY => Vec3::NEG_Y,
            CubeFace::PositiveZ => Vec3::Z,
            CubeFace::NegativeZ => Vec3::NEG_Z,
        }
    }

    /// Up vector of the face camera.
    pub fn up(self) -> Vec3 {
        match self {
            CubeFace::PositiveY => Vec3::Z,
            CubeFace::NegativeY => Vec3::NEG_Z,
            _ => Vec3::NEG_Y,
        }
    }
}

/// World-space direction through the center of texel `(x, y)` of a cube face.
pub fn cube_texel_direction(face: u32, x: u32, y: u32, size: u32) -> Vec3 {
    let u = (x as f32 + 0.5) / size as f32 * 2.0 - 1.0;
    let v = (y as f32 + 0.5) / size as f32 * 2.0 - 1.0;
    cube_face_direction(face, u, v)
}

/// Direction for face-local coordinates `u, v` in `[-1, 1]`.
pub fn cube_face_direction(face: u32, u: f32, v: f32) -> Vec3 {
    let dir = match face {
        0 => Vec3::new(1.0, -v, -u),
        1 => Vec3::new(-1.0, -v, u),
        2 => Vec3::new(u, 1.0, v),
        3 => Vec3::new(u, -1.0, -v),
        4 => Vec3::new(u, -v, 1.0),
        _ => Vec3::new(-u, -v, -1.0),
    };
    dir.normalize()
}

/// Inverse of [`cube_face_direction`]: the face a direction hits and its
/// texture coordinate in `[0, 1]` on that face.
pub fn direction_to_face_uv(dir: Vec3) -> (u32, Vec2) {
    let a = dir.abs();
    let (face, u, v, major) = if a.x >= a.y && a.x >= a.z {
        if dir.x > 0.0 {
            (0, -dir.z, -dir.y, a.x)
        } else {
            (1, dir.z, -dir.y, a.x)
        }
    } else if a.y >= a.z {
        if dir.y > 0.0 {
            (2, dir.x, dir.z, a.y)
        } else {
            (3, dir.x, -dir.z, a.y)
        }
    } else if dir.z > 0.0 {
        (4, dir.x, -dir.y, a.z)
    } else {
        (5, -dir.x, -dir.y, a.z)
    };

    let major = major.max(f32::MIN_POSITIVE);
    let uv = Vec2::new(u / major, v / major) * 0.5 + Vec2::splat(0.5);
    (face, uv)
}

/// Equirectangular texture coordinate sampled for a world direction.
pub fn direction_to_equirect_uv(dir: Vec3) -> Vec2 {
    let d = dir.normalize();
    Vec2::new(
        d.z.atan2(d.x) / TAU + 0.5,
        1.0 - (d.y.clamp(-1.0, 1.0).asin() / PI + 0.5),
    )
}

/// Inverse of [`direction_to_equirect_uv`].
pub fn equirect_uv_to_direction(uv: Vec2) -> Vec3 {
    let phi = (uv.x - 0.5) * TAU;
    let theta = (0.5 - uv.y) * PI;
    let ring = theta.cos();
    Vec3::new(ring * phi.cos(), theta.sin(), ring * phi.sin())
}

/// 90 degree camera rendering one cube face from `eye`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceCamera {
    pub eye: Vec3,
    pub face: CubeFace,
}

impl FaceCamera {
    pub fn new(eye: Vec3, face: CubeFace) -> Self {
        Self { eye, face }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.eye, self.face.forward(), self.face.up())
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(FRAC_PI_2, 1.0, FACE_NEAR, FACE_FAR)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }

    pub fn inverse_view_projection(&self) -> Mat4 {
        self.view_projection().inverse()
    }

    /// World direction seen through face texture coordinate `uv`
    /// (`[0, 1]`, row 0 at the top of the face).
    pub fn direction_at(&self, uv: Vec2) -> Vec3 {
        let ndc = uv * 2.0 - Vec2::ONE;
        let far = self.inverse_view_projection() * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
        (far.truncate() / far.w - self.eye).normalize()
    }
}

/// Resolution of mip `level` of a chain starting at `base`.
///
/// Equivalent to halving with floor `level` times, never dropping below 1.
pub fn mip_resolution(base: u32, level: u32) -> u32 {
    base.checked_shr(level).unwrap_or(0).max(1)
}

/// Number of levels in a full mip chain down to 1x1 (`floor(log2(base)) + 1`).
pub fn mip_chain_length(base: u32) -> u32 {
    if base == 0 {
        0
    } else {
        u32::BITS - base.leading_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_vec3_eq(a: Vec3, b: Vec3) {
        assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-5);
        assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-5);
        assert_abs_diff_eq!(a.z, b.z, epsilon = 1e-5);
    }

    #[test]
    fn test_face_centers_point_along_axes() {
        for face in CubeFace::ALL {
            let center = cube_face_direction(face.index(), 0.0, 0.0);
            assert_vec3_eq(center, face.forward());
        }
    }

    #[test]
    fn test_face_camera_matches_texel_directions() {
        let size = 8;
        for face in CubeFace::ALL {
            let camera = FaceCamera::new(Vec3::ZERO, face);
            for (x, y) in [(0, 0), (7, 0), (3, 5), (7, 7)] {
                let uv = Vec2::new((x as f32 + 0.5) / size as f32, (y as f32 + 0.5) / size as f32);
                assert_vec3_eq(
                    camera.direction_at(uv),
                    cube_texel_direction(face.index(), x, y, size),
                );
            }
        }
    }

    #[test]
    fn test_face_camera_ignores_eye_offset() {
        let offset = FaceCamera::new(Vec3::new(-2.5, 0.0, 7.5), CubeFace::NegativeZ);
        let origin = FaceCamera::new(Vec3::ZERO, CubeFace::NegativeZ);
        let uv = Vec2::new(0.2, 0.7);
        assert_vec3_eq(offset.direction_at(uv), origin.direction_at(uv));
    }

    #[test]
    fn test_positive_z_center_projection() {
        let camera = FaceCamera::new(Vec3::ZERO, CubeFace::PositiveZ);
        let dir = camera.direction_at(Vec2::splat(0.5));
        assert_vec3_eq(dir, Vec3::Z);

        let uv = direction_to_equirect_uv(dir);
        assert_abs_diff_eq!(uv.x, 0.75, epsilon = 1e-6);
        assert_abs_diff_eq!(uv.y, 0.5, epsilon = 1e-6);
        assert_vec3_eq(equirect_uv_to_direction(uv), dir);
    }

    #[test]
    fn test_positive_x_maps_to_panorama_center() {
        let uv = direction_to_equirect_uv(Vec3::X);
        assert_abs_diff_eq!(uv.x, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(uv.y, 0.5, epsilon = 1e-6);
        // Zenith is the top row.
        assert_abs_diff_eq!(direction_to_equirect_uv(Vec3::Y).y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_equirect_mapping_inverts() {
        for dir in [
            Vec3::new(0.3, 0.4, -0.8),
            Vec3::new(-0.9, -0.2, 0.1),
            Vec3::new(0.05, 0.99, 0.1),
        ] {
            let dir = dir.normalize();
            assert_vec3_eq(equirect_uv_to_direction(direction_to_equirect_uv(dir)), dir);
        }
    }

    #[test]
    fn test_face_uv_inverts_texel_direction() {
        let size = 4;
        for face in 0..CUBE_FACES {
            let dir = cube_texel_direction(face, 1, 2, size);
            let (hit, uv) = direction_to_face_uv(dir);
            assert_eq!(hit, face);
            assert_abs_diff_eq!(uv.x, 1.5 / 4.0, epsilon = 1e-5);
            assert_abs_diff_eq!(uv.y, 2.5 / 4.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_mip_resolution_halves_with_floor() {
        for base in [1u32, 5, 6, 64, 100, 257] {
            for level in 1..12 {
                let prev = mip_resolution(base, level - 1);
                assert_eq!(mip_resolution(base, level), (prev / 2).max(1));
            }
        }
        assert_eq!(mip_resolution(256, 40), 1);
    }

    #[test]
    fn test_mip_chain_length_bound() {
        for base in [1u32, 2, 3, 16, 100, 512, 1000] {
            let ceil_log2 = (base as f32).log2().ceil() as u32;
            assert!(mip_chain_length(base) <= ceil_log2 + 1);
            assert_eq!(mip_resolution(base, mip_chain_length(base) - 1), 1);
        }
        assert_eq!(mip_chain_length(256), 9);
        assert_eq!(mip_chain_length(0), 0);
    }
}
