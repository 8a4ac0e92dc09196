//! BRDF integration LUT for the split-sum approximation.
//! x = NdotV, y = roughness; R = scale and G = bias applied to F0.

use half::f16;
use lumenprobe_ibl::sampling::integrate_brdf;

use crate::render_targets::RG16_FORMAT;

pub const BRDF_LUT_SIZE: u32 = 256;
pub const BRDF_LUT_SAMPLES: u32 = 256;

/// Row-major (scale, bias) pairs, sampled at texel centers.
pub fn brdf_lut_texels(size: u32, sample_count: u32) -> Vec<[f32; 2]> {
    let mut data = Vec::with_capacity((size * size) as usize);
    for y in 0..size {
        for x in 0..size {
            let n_dot_v = (x as f32 + 0.5) / size as f32;
            let roughness = (y as f32 + 0.5) / size as f32;
            let (scale, bias) = integrate_brdf(n_dot_v.max(0.001), roughness, sample_count);
            data.push([scale, bias]);
        }
    }
    data
}

/// Generate the LUT on the CPU and upload it as an Rg16Float texture.
pub fn generate_brdf_lut(device: &wgpu::Device, queue: &wgpu::Queue) -> (wgpu::Texture, wgpu::TextureView) {
    let size = BRDF_LUT_SIZE;
    let data: Vec<f16> = brdf_lut_texels(size, BRDF_LUT_SAMPLES)
        .into_iter()
        .flat_map(|[scale, bias]| [f16::from_f32(scale), f16::from_f32(bias)])
        .collect();

    let extent = wgpu::Extent3d {
        width: size,
        height: size,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("BRDF LUT"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: RG16_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(&data),
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * size),
            rows_per_image: Some(size),
        },
        extent,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}
