//! Source resolution for the CLI: built-in panoramas by name, files otherwise.

use std::path::Path;

use lumenprobe_ibl::{EquirectImage, HdrFileLoader, ImageLoader, InMemoryLoader, SourceLoadError};

/// Name of the built-in gradient sky.
pub const PROCEDURAL_SKY: &str = "@sky";

const PROCEDURAL_SKY_WIDTH: u32 = 512;
const PROCEDURAL_SKY_HEIGHT: u32 = 256;

pub struct SourceLoader {
    builtin: InMemoryLoader,
    files: HdrFileLoader,
}

impl SourceLoader {
    pub fn new() -> Self {
        Self {
            builtin: InMemoryLoader::new().with_image(
                PROCEDURAL_SKY,
                EquirectImage::procedural_sky(PROCEDURAL_SKY_WIDTH, PROCEDURAL_SKY_HEIGHT),
            ),
            files: HdrFileLoader,
        }
    }
}

impl ImageLoader for SourceLoader {
    fn load_equirect(&self, path: &Path) -> Result<EquirectImage, SourceLoadError> {
        if self.builtin.contains(path) {
            return self.builtin.load_equirect(path);
        }
        self.files.load_equirect(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sky_resolves_without_disk() {
        let loader = SourceLoader::new();
        let sky = loader.load_equirect(Path::new(PROCEDURAL_SKY)).unwrap();
        assert_eq!((sky.width, sky.height), (PROCEDURAL_SKY_WIDTH, PROCEDURAL_SKY_HEIGHT));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let loader = SourceLoader::new();
        let err = loader
            .load_equirect(Path::new("definitely/not/here.hdr"))
            .unwrap_err();
        assert!(matches!(err, SourceLoadError::Io { .. }));
    }
}
