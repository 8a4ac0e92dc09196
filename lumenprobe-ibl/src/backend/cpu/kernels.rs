//! Software versions of the four fullscreen passes. Each kernel produces the
//! texels of one face at one mip level.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::{Vec2, Vec3, Vec4};

use super::texture::{CpuCubeTexture, CpuEquirect};
use crate::cube::{cube_texel_direction, direction_to_equirect_uv, FaceCamera};
use crate::sampling::{
    distribution_ggx, hammersley, importance_sample_ggx, prefilter_source_lod, tangent_frame,
};

/// Reconstruct the world direction of every texel from the face camera and
/// fetch the panorama along it.
pub fn project_face(source: &CpuEquirect, camera: &FaceCamera, resolution: u32) -> Vec<Vec3> {
    let inv_view_proj = camera.inverse_view_projection();
    let mut out = Vec::with_capacity((resolution * resolution) as usize);
    for y in 0..resolution {
        for x in 0..resolution {
            let uv = Vec2::new(
                (x as f32 + 0.5) / resolution as f32,
                (y as f32 + 0.5) / resolution as f32,
            );
            let ndc = uv * 2.0 - Vec2::ONE;
            let far = inv_view_proj * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
            let dir = (far.truncate() / far.w - camera.eye).normalize();
            out.push(source.sample(direction_to_equirect_uv(dir)));
        }
    }
    out
}

/// 2x2 box filter. Footprints that run off the edge of an odd-sized level
/// average only the texels that exist.
pub fn downsample_face(previous: &[Vec3], previous_resolution: u32, resolution: u32) -> Vec<Vec3> {
    let last = previous_resolution.saturating_sub(1);
    let mut out = Vec::with_capacity((resolution * resolution) as usize);
    for y in 0..resolution {
        for x in 0..resolution {
            let x0 = (2 * x).min(last);
            let x1 = (2 * x + 1).min(last);
            let y0 = (2 * y).min(last);
            let y1 = (2 * y + 1).min(last);

            let mut sum = Vec3::ZERO;
            let mut count = 0.0;
            for sy in y0..=y1 {
                for sx in x0..=x1 {
                    sum += previous[(sy * previous_resolution + sx) as usize];
                    count += 1.0;
                }
            }
            out.push(sum / count);
        }
    }
    out
}

/// Cosine-weighted hemisphere integral around each texel direction, stepping
/// azimuth and elevation by `sample_delta` radians.
pub fn irradiance_face(
    source: &CpuCubeTexture,
    face: u32,
    resolution: u32,
    source_lod: f32,
    sample_delta: f32,
) -> Vec<Vec3> {
    let mut out = Vec::with_capacity((resolution * resolution) as usize);
    for y in 0..resolution {
        for x in 0..resolution {
            let normal = cube_texel_direction(face, x, y, resolution);
            let (tangent, bitangent) = tangent_frame(normal);

            let mut irradiance = Vec3::ZERO;
            let mut samples = 0u32;
            let mut phi = 0.0f32;
            while phi < TAU {
                let mut theta = 0.0f32;
                while theta < FRAC_PI_2 {
                    let (sin_theta, cos_theta) = theta.sin_cos();
                    let local = Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta);
                    let dir = tangent * local.x + bitangent * local.y + normal * local.z;
                    irradiance += source.sample_level(0, dir, source_lod) * cos_theta * sin_theta;
                    samples += 1;
                    theta += sample_delta;
                }
                phi += sample_delta;
            }
            out.push(PI * irradiance / samples.max(1) as f32);
        }
    }
    out
}

/// GGX prefilter with N = V = R, reading a PDF-selected source mip per sample.
pub fn prefilter_face(
    source: &CpuCubeTexture,
    face: u32,
    resolution: u32,
    roughness: f32,
    source_resolution: u32,
    sample_count: u32,
) -> Vec<Vec3> {
    let mut out = Vec::with_capacity((resolution * resolution) as usize);
    for y in 0..resolution {
        for x in 0..resolution {
            let n = cube_texel_direction(face, x, y, resolution);
            let v = n;

            let mut color = Vec3::ZERO;
            let mut weight = 0.0f32;
            for i in 0..sample_count {
                let h = importance_sample_ggx(hammersley(i, sample_count), n, roughness);
                let l = (2.0 * v.dot(h) * h - v).normalize();
                let n_dot_l = n.dot(l);
                if n_dot_l <= 0.0 {
                    continue;
                }

                let lod = if roughness == 0.0 {
                    0.0
                } else {
                    let n_dot_h = n.dot(h).max(0.0);
                    let h_dot_v = h.dot(v).max(1e-4);
                    let pdf = distribution_ggx(n_dot_h, roughness) * n_dot_h / (4.0 * h_dot_v) + 1e-4;
                    prefilter_source_lod(pdf, sample_count, source_resolution)
                };
                color += source.sample_level(0, l, lod) * n_dot_l;
                weight += n_dot_l;
            }

            out.push(if weight > 0.0 {
                color / weight
            } else {
                source.sample_level(0, n, 0.0)
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::{CubeFace, CUBE_FACES};
    use crate::loader::EquirectImage;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_downsample_averages_two_by_two() {
        let previous: Vec<Vec3> = (0..16).map(|i| Vec3::splat(i as f32)).collect();
        let out = downsample_face(&previous, 4, 2);
        // (0 + 1 + 4 + 5) / 4
        assert_abs_diff_eq!(out[0].x, 2.5, epsilon = 1e-6);
        // (10 + 11 + 14 + 15) / 4
        assert_abs_diff_eq!(out[3].x, 12.5, epsilon = 1e-6);
    }

    #[test]
    fn test_downsample_odd_edge_uses_existing_texels() {
        let previous: Vec<Vec3> = (0..9).map(|i| Vec3::splat(i as f32)).collect();
        let out = downsample_face(&previous, 3, 1);
        assert_abs_diff_eq!(out[0].x, (0.0 + 1.0 + 3.0 + 4.0) / 4.0, epsilon = 1e-6);

        let out = downsample_face(&[Vec3::ONE], 1, 1);
        assert_abs_diff_eq!(out[0].x, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_projection_of_constant_source_is_constant() {
        let source = CpuEquirect::from_image(&EquirectImage::constant(16, 8, Vec3::new(0.25, 0.5, 1.0)));
        let camera = FaceCamera::new(Vec3::ZERO, CubeFace::NegativeY);
        for texel in project_face(&source, &camera, 4) {
            assert_abs_diff_eq!(texel.y, 0.5, epsilon = 1e-5);
        }
    }

    fn constant_cube(value: Vec3) -> CpuCubeTexture {
        let mut cube = CpuCubeTexture::new("constant", 4, 3, 1);
        for face in 0..CUBE_FACES {
            for mip in 0..3 {
                let res = cube.mip_resolution(mip) as usize;
                cube.write_level(0, face, mip, vec![value; res * res]);
            }
        }
        cube
    }

    #[test]
    fn test_irradiance_of_uniform_radiance_reproduces_radiance() {
        let cube = constant_cube(Vec3::ONE);
        let out = irradiance_face(&cube, 2, 2, 0.0, 0.05);
        for texel in out {
            // Riemann sum of cos*sin over the hemisphere scaled by pi / n.
            assert!(texel.x > 0.9 && texel.x < 1.1, "{texel}");
        }
    }

    #[test]
    fn test_prefilter_of_uniform_radiance_is_unchanged() {
        let cube = constant_cube(Vec3::splat(0.7));
        for roughness in [0.0, 0.5, 1.0] {
            for texel in prefilter_face(&cube, 4, 2, roughness, 4, 32) {
                assert_abs_diff_eq!(texel.x, 0.7, epsilon = 1e-4);
            }
        }
    }
}
