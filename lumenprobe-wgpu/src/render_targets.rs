//! Texture creation for the IBL builds: cube and cube-array targets, the
//! equirect source upload, and the per-face views the passes render into.

use half::f16;
use lumenprobe_ibl::cube::CUBE_FACES;
use lumenprobe_ibl::loader::EquirectImage;

/// HDR color format of every cube target and the equirect source.
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Two-channel float format (BRDF scale/bias LUT).
pub const RG16_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg16Float;

/// Create a cube texture with `array_layers` cubes (6 array layers each).
pub fn create_cube_texture(
    device: &wgpu::Device,
    label: &str,
    resolution: u32,
    mip_count: u32,
    array_layers: u32,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: resolution,
            height: resolution,
            depth_or_array_layers: array_layers * CUBE_FACES,
        },
        mip_level_count: mip_count,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: HDR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

/// Sampling view over every mip and layer. `Cube` for a single cube,
/// `CubeArray` otherwise.
pub fn cube_sample_view(texture: &wgpu::Texture, array_layers: u32) -> wgpu::TextureView {
    let dimension = if array_layers == 1 {
        wgpu::TextureViewDimension::Cube
    } else {
        wgpu::TextureViewDimension::CubeArray
    };
    cube_view(texture, array_layers, dimension)
}

/// Cube-array view regardless of layer count, for bindings declared as
/// `texture_cube_array`.
pub fn cube_array_view(texture: &wgpu::Texture, array_layers: u32) -> wgpu::TextureView {
    cube_view(texture, array_layers, wgpu::TextureViewDimension::CubeArray)
}

fn cube_view(
    texture: &wgpu::Texture,
    array_layers: u32,
    dimension: wgpu::TextureViewDimension,
) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        dimension: Some(dimension),
        base_array_layer: 0,
        array_layer_count: Some(array_layers * CUBE_FACES),
        ..Default::default()
    })
}

/// Single-layer, single-mip 2D view of one face: a render attachment, or the
/// parent level read by the downsample pass.
pub fn face_view(texture: &wgpu::Texture, slice: u32, face: u32, mip: u32) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("IBL Face View"),
        dimension: Some(wgpu::TextureViewDimension::D2),
        base_mip_level: mip,
        mip_level_count: Some(1),
        base_array_layer: slice * CUBE_FACES + face,
        array_layer_count: Some(1),
        ..Default::default()
    })
}

/// Expand linear RGB to half-float RGBA texels.
pub fn equirect_to_rgba16(image: &EquirectImage) -> Vec<f16> {
    let mut data = Vec::with_capacity(image.rgb.len() / 3 * 4);
    for rgb in image.rgb.chunks_exact(3) {
        data.extend_from_slice(&[
            f16::from_f32(rgb[0]),
            f16::from_f32(rgb[1]),
            f16::from_f32(rgb[2]),
            f16::ONE,
        ]);
    }
    data
}

/// Upload an equirectangular panorama as a sampled 2D texture.
pub fn create_equirect_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    image: &EquirectImage,
) -> wgpu::Texture {
    let size = wgpu::Extent3d {
        width: image.width,
        height: image.height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: HDR_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    let data = equirect_to_rgba16(image);
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
            bytes_per_row: Some(8 * image.width),
            rows_per_image: Some(image.height),
        },
        size,
    );
    texture
}

/// Trilinear clamp-to-edge sampler for cube lookups.
pub fn create_cube_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("IBL Cube Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

/// Bilinear sampler for the panorama: wraps in longitude, clamps at the poles.
pub fn create_equirect_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Equirect Sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_equirect_expands_to_rgba() {
        let image = EquirectImage::constant(4, 2, Vec3::new(0.5, 2.0, 0.25));
        let data = equirect_to_rgba16(&image);
        assert_eq!(data.len(), 4 * 2 * 4);
        assert_eq!(data[0].to_f32(), 0.5);
        assert_eq!(data[1].to_f32(), 2.0);
        assert_eq!(data[2].to_f32(), 0.25);
        assert_eq!(data[3], f16::ONE);
    }
}
