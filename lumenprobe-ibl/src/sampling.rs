//! Low-discrepancy sampling and GGX helpers shared by the convolution kernels
//! and the BRDF integration table.

use std::f32::consts::PI;

use glam::Vec3;

pub fn hammersley(i: u32, n: u32) -> [f32; 2] {
    [i as f32 / n as f32, radical_inverse_vdc(i)]
}

pub fn radical_inverse_vdc(mut bits: u32) -> f32 {
    bits = bits.rotate_left(16);
    bits = ((bits & 0x55555555) << 1) | ((bits & 0xAAAAAAAA) >> 1);
    bits = ((bits & 0x33333333) << 2) | ((bits & 0xCCCCCCCC) >> 2);
    bits = ((bits & 0x0F0F0F0F) << 4) | ((bits & 0xF0F0F0F0) >> 4);
    bits = ((bits & 0x00FF00FF) << 8) | ((bits & 0xFF00FF00) >> 8);
    bits as f32 * 2.328_306_4e-10
}

/// Orthonormal tangent and bitangent for `n`.
pub fn tangent_frame(n: Vec3) -> (Vec3, Vec3) {
    let up = if n.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = up.cross(n).normalize();
    let bitangent = n.cross(tangent);
    (tangent, bitangent)
}

/// GGX half vector in tangent space (z up).
pub fn importance_sample_ggx_tangent(xi: [f32; 2], roughness: f32) -> Vec3 {
    let a = roughness * roughness;
    let phi = 2.0 * PI * xi[0];
    let cos_theta = ((1.0 - xi[1]) / (1.0 + (a * a - 1.0) * xi[1])).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

    Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta)
}

/// GGX half vector around world-space normal `n`.
pub fn importance_sample_ggx(xi: [f32; 2], n: Vec3, roughness: f32) -> Vec3 {
    let h = importance_sample_ggx_tangent(xi, roughness);
    let (tangent, bitangent) = tangent_frame(n);
    (tangent * h.x + bitangent * h.y + n * h.z).normalize()
}

/// GGX / Trowbridge-Reitz normal distribution.
pub fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    a2 / (PI * denom * denom).max(1e-7)
}

pub fn geometry_smith_ibl(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    let k = (roughness * roughness) / 2.0;
    let ggx_v = n_dot_v / (n_dot_v * (1.0 - k) + k);
    let ggx_l = n_dot_l / (n_dot_l * (1.0 - k) + k);
    ggx_v * ggx_l
}

/// Source mip to read for one prefilter sample, from the solid angle the
/// sample covers relative to one source texel.
pub fn prefilter_source_lod(pdf: f32, sample_count: u32, source_resolution: u32) -> f32 {
    let res = source_resolution as f32;
    let sa_texel = 4.0 * PI / (6.0 * res * res);
    let sa_sample = 1.0 / (sample_count as f32 * pdf + 1e-4);
    (0.5 * (sa_sample / sa_texel).log2()).max(0.0)
}

/// Numerically integrate the BRDF split-sum for a given NdotV and roughness.
/// Returns the (scale, bias) applied to F0.
pub fn integrate_brdf(n_dot_v: f32, roughness: f32, sample_count: u32) -> (f32, f32) {
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).sqrt(), 0.0, n_dot_v);

    let mut a = 0.0f32;
    let mut b = 0.0f32;

    for i in 0..sample_count {
        let xi = hammersley(i, sample_count);
        let h = importance_sample_ggx_tangent(xi, roughness);
        let l = 2.0 * v.dot(h) * h - v;

        let n_dot_l = l.z.max(0.0);
        let n_dot_h = h.z.max(0.0);
        let v_dot_h = v.dot(h).max(0.0);

        if n_dot_l > 0.0 {
            let g = geometry_smith_ibl(n_dot_v, n_dot_l, roughness);
            let g_vis = (g * v_dot_h) / (n_dot_h * n_dot_v).max(0.001);
            let fc = (1.0 - v_dot_h).powi(5);

            a += (1.0 - fc) * g_vis;
            b += fc * g_vis;
        }
    }

    (a / sample_count as f32, b / sample_count as f32)
}

/// Hermite interpolation between `edge0` and `edge1`, exactly 0 below and 1 above.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if x <= edge0 {
        return 0.0;
    }
    if x >= edge1 {
        return 1.0;
    }
    let t = (x - edge0) / (edge1 - edge0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_radical_inverse_sequence() {
        assert_eq!(radical_inverse_vdc(0), 0.0);
        assert_abs_diff_eq!(radical_inverse_vdc(1), 0.5, epsilon = 1e-7);
        assert_abs_diff_eq!(radical_inverse_vdc(2), 0.25, epsilon = 1e-7);
        assert_abs_diff_eq!(radical_inverse_vdc(3), 0.75, epsilon = 1e-7);
    }

    #[test]
    fn test_mirror_roughness_samples_the_normal() {
        let n = Vec3::new(0.2, -0.5, 0.8).normalize();
        for i in 0..8 {
            let h = importance_sample_ggx(hammersley(i, 8), n, 0.0);
            assert_abs_diff_eq!(h.dot(n), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_tangent_frame_is_orthonormal() {
        for n in [Vec3::Z, Vec3::NEG_Z, Vec3::new(1.0, 2.0, 3.0).normalize()] {
            let (t, b) = tangent_frame(n);
            assert_abs_diff_eq!(t.dot(n), 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(b.dot(n), 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(t.dot(b), 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(b.length(), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_integrate_brdf_is_bounded() {
        for &(n_dot_v, roughness) in &[(0.1, 0.2), (0.5, 0.5), (0.99, 0.9)] {
            let (scale, bias) = integrate_brdf(n_dot_v, roughness, 128);
            assert!(scale >= 0.0 && bias >= 0.0);
            assert!(scale + bias <= 1.05, "{scale} + {bias}");
        }
    }

    #[test]
    fn test_smoothstep_edges_are_exact() {
        assert_eq!(smoothstep(1.5, 3.5, 0.0), 0.0);
        assert_eq!(smoothstep(1.5, 3.5, 5.0), 1.0);
        assert_abs_diff_eq!(smoothstep(1.5, 3.5, 2.5), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_source_lod_grows_with_lower_pdf() {
        let sharp = prefilter_source_lod(50.0, 64, 128);
        let wide = prefilter_source_lod(0.5, 64, 128);
        assert!(wide > sharp);
        assert!(sharp >= 0.0);
    }
}
