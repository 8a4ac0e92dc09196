//! Equirectangular source images and the loaders that produce them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use glam::{Vec2, Vec3};

use crate::cube::equirect_uv_to_direction;
use crate::error::SourceLoadError;

/// Linear-float RGB panorama, row-major, row 0 at the zenith.
#[derive(Clone, Debug, PartialEq)]
pub struct EquirectImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<f32>,
}

impl EquirectImage {
    /// Returns `None` if `rgb` does not hold exactly `width * height` texels.
    pub fn new(width: u32, height: u32, rgb: Vec<f32>) -> Option<Self> {
        if width == 0 || height == 0 || rgb.len() != (width * height * 3) as usize {
            return None;
        }
        Some(Self { width, height, rgb })
    }

    /// Fill every texel from its world direction.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(Vec3) -> Vec3) -> Self {
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let uv = Vec2::new(
                    (x as f32 + 0.5) / width as f32,
                    (y as f32 + 0.5) / height as f32,
                );
                let c = f(equirect_uv_to_direction(uv));
                rgb.extend_from_slice(&[c.x, c.y, c.z]);
            }
        }
        Self { width, height, rgb }
    }

    pub fn constant(width: u32, height: u32, color: Vec3) -> Self {
        Self::from_fn(width, height, |_| color)
    }

    /// Gradient sky: horizon white fading to zenith blue, dark ground below.
    pub fn procedural_sky(width: u32, height: u32) -> Self {
        Self::from_fn(width, height, |dir| {
            let up = dir.y;
            if up > 0.0 {
                Vec3::new(0.8, 0.85, 0.9).lerp(Vec3::new(0.3, 0.5, 0.9), up)
            } else {
                Vec3::splat(0.5).lerp(Vec3::splat(0.2), (-up).min(1.0))
            }
        })
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec3 {
        let i = ((y * self.width + x) * 3) as usize;
        Vec3::new(self.rgb[i], self.rgb[i + 1], self.rgb[i + 2])
    }
}

/// Decodes an equirectangular panorama from a path.
pub trait ImageLoader {
    fn load_equirect(&self, path: &Path) -> Result<EquirectImage, SourceLoadError>;
}

/// Radiance `.hdr` / OpenEXR loader backed by the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct HdrFileLoader;

impl ImageLoader for HdrFileLoader {
    fn load_equirect(&self, path: &Path) -> Result<EquirectImage, SourceLoadError> {
        let io_err = |source| SourceLoadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let decoded = image::ImageReader::open(path)
            .map_err(io_err)?
            .with_guessed_format()
            .map_err(io_err)?
            .decode()
            .map_err(|e| SourceLoadError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let rgb = decoded.into_rgb32f();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(SourceLoadError::Empty {
                path: path.to_path_buf(),
            });
        }
        log::debug!("Decoded {} ({}x{})", path.display(), width, height);
        Ok(EquirectImage {
            width,
            height,
            rgb: rgb.into_raw(),
        })
    }
}

/// Path-keyed table of already decoded images.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLoader {
    images: HashMap<PathBuf, EquirectImage>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, image: EquirectImage) {
        self.images.insert(path.into(), image);
    }

    pub fn with_image(mut self, path: impl Into<PathBuf>, image: EquirectImage) -> Self {
        self.insert(path, image);
        self
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.images.contains_key(path)
    }
}

impl ImageLoader for InMemoryLoader {
    fn load_equirect(&self, path: &Path) -> Result<EquirectImage, SourceLoadError> {
        self.images
            .get(path)
            .cloned()
            .ok_or_else(|| SourceLoadError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such in-memory image"),
            })
    }
}
