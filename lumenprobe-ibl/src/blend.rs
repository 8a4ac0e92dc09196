//! Shading-time lookup: parallax-corrected blend of the 2x2 nearest local
//! cubemaps, composited over the global cubemap by accumulated alpha.

use glam::Vec3;

use crate::config::ProbeBlendConfig;
use crate::grid::LocalGridDescriptor;
use crate::sampling::smoothstep;

/// Anything that can be sampled like a (possibly arrayed) cube texture.
pub trait CubeSampler {
    fn sample(&self, slice: u32, dir: Vec3, lod: f32) -> Vec3;
}

/// Which of the two IBL textures a lookup reads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IblLookup {
    Irradiance,
    /// Environment map at a fractional roughness mip.
    Specular { lod: f32 },
}

pub struct LocalGridView<'a> {
    pub descriptor: &'a LocalGridDescriptor,
    pub irradiance: &'a dyn CubeSampler,
    pub environment: &'a dyn CubeSampler,
}

pub struct GlobalView<'a> {
    pub irradiance: &'a dyn CubeSampler,
    pub environment: &'a dyn CubeSampler,
    pub slice: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalSample {
    /// Normalized local color; meaningless when `alpha` is 0.
    pub color: Vec3,
    pub alpha: f32,
}

impl LocalSample {
    pub const NONE: LocalSample = LocalSample {
        color: Vec3::ZERO,
        alpha: 0.0,
    };
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendedSample {
    pub local: LocalSample,
    pub global: Vec3,
    pub color: Vec3,
}

fn read(irradiance: &dyn CubeSampler, environment: &dyn CubeSampler, slice: u32, dir: Vec3, lookup: IblLookup) -> Vec3 {
    match lookup {
        IblLookup::Irradiance => irradiance.sample(slice, dir, 0.0),
        IblLookup::Specular { lod } => environment.sample(slice, dir, lod),
    }
}

/// Lower-left cell of the 2x2 neighborhood around `p`, clamped so the
/// neighborhood stays inside the grid where possible.
pub fn base_cell(descriptor: &LocalGridDescriptor, p: Vec3) -> (u32, u32) {
    let half = descriptor.cell_size * 0.5;
    let axis = |value: f32, origin: f32, cells: u32| {
        let index = ((value - origin - half) / descriptor.cell_size).floor().max(0.0);
        let last = cells.saturating_sub(2) as f32;
        index.min(last) as u32
    };
    (
        axis(p.x, descriptor.origin.x, descriptor.width),
        axis(p.z, descriptor.origin.y, descriptor.height),
    )
}

/// Blend weight of a cell center along one axis: 1 inside the cell, fading to
/// 0 across a band of `blend_radius` around the cell edge.
pub fn axis_weight(center: f32, p: f32, half_cell: f32, blend_radius: f32) -> f32 {
    1.0 - smoothstep(half_cell - blend_radius, half_cell + blend_radius, (center - p).abs())
}

/// Reproject `dir` from `p` onto a box of half size `half_extent` centered at
/// `center`. Falls back to `dir` when the ray misses.
pub fn parallax_correct(p: Vec3, dir: Vec3, center: Vec3, half_extent: f32) -> Vec3 {
    let box_min = center - Vec3::splat(half_extent);
    let box_max = center + Vec3::splat(half_extent);

    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;
    for axis in 0..3 {
        let (o, d) = (p[axis], dir[axis]);
        if d.abs() < 1e-8 {
            if o < box_min[axis] || o > box_max[axis] {
                return dir.normalize_or_zero();
            }
            continue;
        }
        let t1 = (box_min[axis] - o) / d;
        let t2 = (box_max[axis] - o) / d;
        t_near = t_near.max(t1.min(t2));
        t_far = t_far.min(t1.max(t2));
    }

    if t_far < t_near || t_far <= 0.0 {
        return dir.normalize_or_zero();
    }
    // Inside the box the exit point is the nearest positive hit.
    let t = if t_near > 0.0 { t_near } else { t_far };
    let corrected = p + dir * t - center;
    if corrected.length_squared() < 1e-12 {
        dir.normalize_or_zero()
    } else {
        corrected.normalize()
    }
}

/// Blend the 2x2 local cells around `p`. `dir` is the surface normal for
/// irradiance and the reflection vector for specular lookups.
pub fn sample_local(grid: &LocalGridView<'_>, blend: &ProbeBlendConfig, p: Vec3, dir: Vec3, lookup: IblLookup) -> LocalSample {
    let descriptor = grid.descriptor;
    if descriptor.width == 0 || descriptor.height == 0 {
        return LocalSample::NONE;
    }
    let (cx, cz) = base_cell(descriptor, p);
    let half_cell = descriptor.cell_size * 0.5;

    let cols = dedup_pair(cx, (cx + 1).min(descriptor.width - 1));
    let rows = dedup_pair(cz, (cz + 1).min(descriptor.height - 1));

    let mut color = Vec3::ZERO;
    let mut alpha = 0.0f32;
    for &row in rows.iter().flatten() {
        let center_z = descriptor.cell_center_xz(0, row).y;
        let wz = axis_weight(center_z, p.z, half_cell, blend.blend_radius);
        if wz <= 0.0 {
            continue;
        }

        // Blend along X within this row first.
        let mut row_color = Vec3::ZERO;
        let mut row_alpha = 0.0f32;
        for &col in cols.iter().flatten() {
            let center = descriptor.cell_center(col, row);
            let wx = axis_weight(center.x, p.x, half_cell, blend.blend_radius);
            if wx <= 0.0 {
                continue;
            }
            let corrected = parallax_correct(p, dir, center, blend.half_extent);
            let slice = descriptor.slice_index(col, row);
            row_color += read(grid.irradiance, grid.environment, slice, corrected, lookup) * wx;
            row_alpha += wx;
        }

        color += row_color * wz;
        alpha += row_alpha * wz;
    }

    if alpha <= 0.0 {
        return LocalSample::NONE;
    }
    LocalSample {
        color: color / alpha,
        alpha: alpha.min(1.0),
    }
}

fn dedup_pair(a: u32, b: u32) -> [Option<u32>; 2] {
    [Some(a), (b != a).then_some(b)]
}

/// Global cubemap along `dir`, without parallax correction.
pub fn sample_global(global: &GlobalView<'_>, dir: Vec3, lookup: IblLookup) -> Vec3 {
    read(global.irradiance, global.environment, global.slice, dir, lookup)
}

/// Composite local over global. Zero alpha returns the global sample as is.
pub fn blend(local: LocalSample, global: Vec3) -> Vec3 {
    if local.alpha <= 0.0 {
        return global;
    }
    if local.alpha >= 1.0 {
        return local.color;
    }
    local.color * local.alpha + global * (1.0 - local.alpha)
}

/// Full lookup. With no grid this is the zero-alpha case: the global sample.
pub fn sample_blended(
    grid: Option<&LocalGridView<'_>>,
    global: &GlobalView<'_>,
    config: &ProbeBlendConfig,
    p: Vec3,
    dir: Vec3,
    lookup: IblLookup,
) -> BlendedSample {
    let local = grid.map_or(LocalSample::NONE, |grid| sample_local(grid, config, p, dir, lookup));
    let global_color = sample_global(global, dir, lookup);
    BlendedSample {
        local,
        global: global_color,
        color: blend(local, global_color),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use glam::Vec2;
    use std::cell::RefCell;

    /// Returns the slice index in red, records every lookup.
    struct SliceColor {
        lookups: RefCell<Vec<(u32, Vec3)>>,
    }

    impl SliceColor {
        fn new() -> Self {
            Self {
                lookups: RefCell::new(Vec::new()),
            }
        }
    }

    impl CubeSampler for SliceColor {
        fn sample(&self, slice: u32, dir: Vec3, _lod: f32) -> Vec3 {
            self.lookups.borrow_mut().push((slice, dir));
            Vec3::new(slice as f32, 1.0, 0.0)
        }
    }

    struct Constant(Vec3);

    impl CubeSampler for Constant {
        fn sample(&self, _slice: u32, _dir: Vec3, _lod: f32) -> Vec3 {
            self.0
        }
    }

    fn grid_4x3() -> LocalGridDescriptor {
        LocalGridDescriptor {
            origin: Vec2::new(-10.0, -5.0),
            cell_size: 5.0,
            width: 4,
            height: 3,
            roughness_mip_count: 5,
        }
    }

    #[test]
    fn test_cell_center_is_fully_local_and_uncorrected() {
        let descriptor = grid_4x3();
        let local = SliceColor::new();
        let view = LocalGridView {
            descriptor: &descriptor,
            irradiance: &local,
            environment: &local,
        };
        let p = descriptor.cell_center(1, 1);
        let n = Vec3::new(0.3, 0.8, -0.2);

        assert_eq!(base_cell(&descriptor, p), (1, 1));
        let sample = sample_local(&view, &ProbeBlendConfig::default(), p, n, IblLookup::Irradiance);
        assert_abs_diff_eq!(sample.alpha, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(sample.color.x, descriptor.slice_index(1, 1) as f32, epsilon = 1e-6);

        let lookups = local.lookups.borrow();
        assert_eq!(lookups.len(), 1);
        let corrected = lookups[0].1;
        let expected = n.normalize();
        assert_abs_diff_eq!(corrected.x, expected.x, epsilon = 1e-5);
        assert_abs_diff_eq!(corrected.y, expected.y, epsilon = 1e-5);
        assert_abs_diff_eq!(corrected.z, expected.z, epsilon = 1e-5);
    }

    #[test]
    fn test_far_point_is_exactly_global() {
        let descriptor = grid_4x3();
        let local = Constant(Vec3::splat(100.0));
        let global_map = Constant(Vec3::new(0.25, 0.5, 0.75));
        let view = LocalGridView {
            descriptor: &descriptor,
            irradiance: &local,
            environment: &local,
        };
        let global = GlobalView {
            irradiance: &global_map,
            environment: &global_map,
            slice: 0,
        };

        // Beyond h + r of the outermost centers on both axes.
        let p = Vec3::new(20.0, 0.0, 20.0);
        let sample = sample_blended(Some(&view), &global, &ProbeBlendConfig::default(), p, Vec3::Y, IblLookup::Irradiance);
        assert_eq!(sample.local.alpha, 0.0);
        assert_eq!(sample.color, Vec3::new(0.25, 0.5, 0.75));
        assert_eq!(sample.color, sample.global);
    }

    #[test]
    fn test_cell_boundary_splits_weight_evenly() {
        let descriptor = grid_4x3();
        let local = SliceColor::new();
        let view = LocalGridView {
            descriptor: &descriptor,
            irradiance: &local,
            environment: &local,
        };
        // Halfway between cells (1,1) and (2,1).
        let p = Vec3::new(0.0, 0.0, 2.5);
        let sample = sample_local(&view, &ProbeBlendConfig::default(), p, Vec3::Y, IblLookup::Specular { lod: 1.0 });
        assert_abs_diff_eq!(sample.alpha, 1.0, epsilon = 1e-6);
        let expected = (descriptor.slice_index(1, 1) + descriptor.slice_index(2, 1)) as f32 / 2.0;
        assert_abs_diff_eq!(sample.color.x, expected, epsilon = 1e-5);
    }

    #[test]
    fn test_corner_blend_is_separable_across_four_cells() {
        let descriptor = grid_4x3();
        let local = SliceColor::new();
        let global_map = Constant(Vec3::ZERO);
        let view = LocalGridView {
            descriptor: &descriptor,
            irradiance: &local,
            environment: &local,
        };
        let global = GlobalView {
            irradiance: &global_map,
            environment: &global_map,
            slice: 0,
        };
        // Inside the blend band of cells (1,1), (2,1), (1,2) and (2,2).
        let p = Vec3::new(0.4, 0.0, 5.3);
        assert_eq!(base_cell(&descriptor, p), (1, 1));

        let sample = sample_blended(Some(&view), &global, &ProbeBlendConfig::default(), p, Vec3::Y, IblLookup::Irradiance);

        // X weights 0.216 / 0.784, Z weights 0.28175 / 0.71825.
        assert_abs_diff_eq!(axis_weight(-2.5, p.x, 2.5, 1.0), 0.216, epsilon = 1e-4);
        assert_abs_diff_eq!(axis_weight(7.5, p.z, 2.5, 1.0), 0.71825, epsilon = 1e-4);
        let row1 = 0.216 * 5.0 + 0.784 * 6.0;
        let row2 = 0.216 * 9.0 + 0.784 * 10.0;
        let expected = 0.28175 * row1 + 0.71825 * row2;
        assert_abs_diff_eq!(sample.local.color.x, expected, epsilon = 1e-3);
        assert_abs_diff_eq!(sample.local.alpha, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(sample.color.x, expected, epsilon = 1e-3);

        let mut slices: Vec<u32> = local.lookups.borrow().iter().map(|&(slice, _)| slice).collect();
        slices.sort_unstable();
        assert_eq!(slices, vec![5, 6, 9, 10]);
    }

    #[test]
    fn test_outer_edge_mixes_local_and_global() {
        let descriptor = grid_4x3();
        let local = Constant(Vec3::splat(4.0));
        let global_map = Constant(Vec3::new(0.0, 0.0, 2.0));
        let view = LocalGridView {
            descriptor: &descriptor,
            irradiance: &local,
            environment: &local,
        };
        let global = GlobalView {
            irradiance: &global_map,
            environment: &global_map,
            slice: 0,
        };
        let config = ProbeBlendConfig::default();

        // Half a cell beyond the last column center, on a row center.
        let edge = Vec3::new(10.0, 0.0, 2.5);
        let sample = sample_blended(Some(&view), &global, &config, edge, Vec3::Y, IblLookup::Irradiance);
        assert!(sample.local.alpha > 0.0 && sample.local.alpha < 1.0);
        assert_abs_diff_eq!(sample.local.alpha, 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(sample.local.color.x, 4.0, epsilon = 1e-5);
        assert_abs_diff_eq!(sample.color.x, 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(sample.color.z, 3.0, epsilon = 1e-5);

        // Past the outer corner both axes fade, so alpha is the product.
        let corner = Vec3::new(10.0, 0.0, 10.0);
        let sample = sample_blended(Some(&view), &global, &config, corner, Vec3::Y, IblLookup::Irradiance);
        assert_abs_diff_eq!(sample.local.alpha, 0.25, epsilon = 1e-5);
        assert_abs_diff_eq!(sample.color.x, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(sample.color.z, 2.5, epsilon = 1e-5);
    }

    #[test]
    fn test_partial_alpha_mixes_with_global() {
        let local = LocalSample {
            color: Vec3::ONE,
            alpha: 0.25,
        };
        let mixed = blend(local, Vec3::ZERO);
        assert_abs_diff_eq!(mixed.x, 0.25, epsilon = 1e-6);
        assert_eq!(blend(LocalSample::NONE, Vec3::splat(2.0)), Vec3::splat(2.0));
    }

    #[test]
    fn test_single_column_grid_clamps_neighbors() {
        let descriptor = LocalGridDescriptor {
            origin: Vec2::ZERO,
            cell_size: 5.0,
            width: 1,
            height: 1,
            roughness_mip_count: 5,
        };
        let local = SliceColor::new();
        let view = LocalGridView {
            descriptor: &descriptor,
            irradiance: &local,
            environment: &local,
        };
        let sample = sample_local(&view, &ProbeBlendConfig::default(), Vec3::new(2.5, 0.0, 2.5), Vec3::X, IblLookup::Irradiance);
        assert_abs_diff_eq!(sample.alpha, 1.0, epsilon = 1e-6);
        // The clamped duplicate neighbor is not sampled twice.
        assert_eq!(local.lookups.borrow().len(), 1);
    }

    #[test]
    fn test_parallax_correction_reprojects_off_center() {
        let center = Vec3::ZERO;
        // Standing 5 units along +X, looking +X at a wall 10 units from the center.
        let corrected = parallax_correct(Vec3::new(5.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 1.0).normalize(), center, 10.0);
        // Hits x = 10 at z = 5.
        let expected = Vec3::new(10.0, 0.0, 5.0).normalize();
        assert_abs_diff_eq!(corrected.x, expected.x, epsilon = 1e-5);
        assert_abs_diff_eq!(corrected.z, expected.z, epsilon = 1e-5);

        // Outside the box, pointing away: no hit.
        let miss = parallax_correct(Vec3::new(50.0, 0.0, 0.0), Vec3::X, center, 10.0);
        assert_eq!(miss, Vec3::X);
    }
}
