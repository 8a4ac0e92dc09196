//! Texture storage of the CPU backend.

use glam::{Vec2, Vec3};

use super::super::{ResourceState, SubresourceStates};
use crate::blend::CubeSampler;
use crate::cube::{direction_to_face_uv, mip_resolution, CUBE_FACES};
use crate::loader::EquirectImage;

/// Equirectangular panorama, sampled bilinearly with horizontal wrap.
#[derive(Clone, Debug)]
pub struct CpuEquirect {
    pub width: u32,
    pub height: u32,
    texels: Vec<Vec3>,
    pub(super) states: SubresourceStates,
}

impl CpuEquirect {
    pub fn from_image(image: &EquirectImage) -> Self {
        let texels = image
            .rgb
            .chunks_exact(3)
            .map(|c| Vec3::new(c[0], c[1], c[2]))
            .collect();
        Self {
            width: image.width,
            height: image.height,
            texels,
            states: SubresourceStates::new(1, 1, 1, ResourceState::ShaderRead),
        }
    }

    fn texel(&self, x: i64, y: i64) -> Vec3 {
        let w = self.width as i64;
        let x = x.rem_euclid(w);
        let y = y.clamp(0, self.height as i64 - 1);
        self.texels[(y * w + x) as usize]
    }

    pub fn sample(&self, uv: Vec2) -> Vec3 {
        let fx = uv.x * self.width as f32 - 0.5;
        let fy = uv.y * self.height as f32 - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = self.texel(x0, y0).lerp(self.texel(x0 + 1, y0), tx);
        let bottom = self.texel(x0, y0 + 1).lerp(self.texel(x0 + 1, y0 + 1), tx);
        top.lerp(bottom, ty)
    }
}

/// Cube texture or cube array with a full per-subresource texel store.
#[derive(Clone, Debug)]
pub struct CpuCubeTexture {
    pub label: String,
    pub resolution: u32,
    pub mip_count: u32,
    pub array_layers: u32,
    levels: Vec<Vec<Vec3>>,
    pub(super) states: SubresourceStates,
}

impl CpuCubeTexture {
    pub fn new(label: &str, resolution: u32, mip_count: u32, array_layers: u32) -> Self {
        let mut levels = Vec::with_capacity((array_layers * CUBE_FACES * mip_count) as usize);
        for _slice in 0..array_layers {
            for _face in 0..CUBE_FACES {
                for mip in 0..mip_count {
                    let res = mip_resolution(resolution, mip) as usize;
                    levels.push(vec![Vec3::ZERO; res * res]);
                }
            }
        }
        Self {
            label: label.to_string(),
            resolution,
            mip_count,
            array_layers,
            levels,
            states: SubresourceStates::new(array_layers, CUBE_FACES, mip_count, ResourceState::ShaderRead),
        }
    }

    fn level_index(&self, slice: u32, face: u32, mip: u32) -> usize {
        ((slice * CUBE_FACES + face) * self.mip_count + mip) as usize
    }

    pub fn mip_resolution(&self, mip: u32) -> u32 {
        mip_resolution(self.resolution, mip)
    }

    /// Texels of one face/mip, row-major.
    pub fn level(&self, slice: u32, face: u32, mip: u32) -> &[Vec3] {
        &self.levels[self.level_index(slice, face, mip)]
    }

    pub(super) fn write_level(&mut self, slice: u32, face: u32, mip: u32, texels: Vec<Vec3>) {
        let index = self.level_index(slice, face, mip);
        self.levels[index] = texels;
    }

    pub fn state(&self, slice: u32, face: u32, mip: u32) -> Option<ResourceState> {
        self.states.get(slice, face, mip)
    }

    /// Bilinear sample of one mip level; filtering clamps at face edges.
    pub fn sample_bilinear(&self, slice: u32, mip: u32, dir: Vec3) -> Vec3 {
        let (face, uv) = direction_to_face_uv(dir);
        let res = self.mip_resolution(mip) as i64;
        let texels = self.level(slice, face, mip);
        let fetch = |x: i64, y: i64| {
            let x = x.clamp(0, res - 1);
            let y = y.clamp(0, res - 1);
            texels[(y * res + x) as usize]
        };

        let fx = uv.x * res as f32 - 0.5;
        let fy = uv.y * res as f32 - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = fetch(x0, y0).lerp(fetch(x0 + 1, y0), tx);
        let bottom = fetch(x0, y0 + 1).lerp(fetch(x0 + 1, y0 + 1), tx);
        top.lerp(bottom, ty)
    }

    /// Trilinear sample at a fractional level of detail.
    pub fn sample_level(&self, slice: u32, dir: Vec3, lod: f32) -> Vec3 {
        let max_level = self.mip_count.saturating_sub(1) as f32;
        let lod = lod.clamp(0.0, max_level);
        let lower = lod.floor();
        let t = lod - lower;
        let a = self.sample_bilinear(slice, lower as u32, dir);
        if t == 0.0 {
            return a;
        }
        let b = self.sample_bilinear(slice, lower as u32 + 1, dir);
        a.lerp(b, t)
    }
}

impl CubeSampler for CpuCubeTexture {
    fn sample(&self, slice: u32, dir: Vec3, lod: f32) -> Vec3 {
        self.sample_level(slice.min(self.array_layers.saturating_sub(1)), dir, lod)
    }
}

#[derive(Clone, Debug)]
pub enum CpuTexture {
    Cube(CpuCubeTexture),
    Equirect(CpuEquirect),
}

impl CpuTexture {
    pub(super) fn states(&self) -> &SubresourceStates {
        match self {
            CpuTexture::Cube(cube) => &cube.states,
            CpuTexture::Equirect(equirect) => &equirect.states,
        }
    }

    pub(super) fn states_mut(&mut self) -> &mut SubresourceStates {
        match self {
            CpuTexture::Cube(cube) => &mut cube.states,
            CpuTexture::Equirect(equirect) => &mut equirect.states,
        }
    }

    pub fn as_cube(&self) -> Option<&CpuCubeTexture> {
        match self {
            CpuTexture::Cube(cube) => Some(cube),
            CpuTexture::Equirect(_) => None,
        }
    }

    pub fn as_equirect(&self) -> Option<&CpuEquirect> {
        match self {
            CpuTexture::Equirect(equirect) => Some(equirect),
            CpuTexture::Cube(_) => None,
        }
    }
}
