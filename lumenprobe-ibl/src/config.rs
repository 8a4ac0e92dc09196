//! Build and blending parameters.

use crate::cube::mip_chain_length;
use crate::error::IblError;

/// Parallax-corrected blending of neighboring local cubemaps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbeBlendConfig {
    /// Half size of the box each local cubemap is reprojected against.
    pub half_extent: f32,
    /// Width of the smoothstep band around a cell boundary.
    pub blend_radius: f32,
}

impl Default for ProbeBlendConfig {
    fn default() -> Self {
        Self {
            half_extent: 10.0,
            blend_radius: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IblConfig {
    /// Face size of mip 0 of the base cubemap.
    pub base_resolution: u32,
    pub irradiance_resolution: u32,
    pub environment_resolution: u32,
    /// Number of mips in every environment cubemap, global or local.
    pub roughness_mip_count: u32,
    /// Hemisphere step of the irradiance integral, in radians.
    pub irradiance_sample_delta: f32,
    /// GGX samples per prefiltered texel.
    pub prefilter_sample_count: u32,
    /// The irradiance convolver reads the base mip closest to this size.
    pub irradiance_source_resolution: u32,
    pub blend: ProbeBlendConfig,
}

impl Default for IblConfig {
    fn default() -> Self {
        Self {
            base_resolution: 256,
            irradiance_resolution: 32,
            environment_resolution: 128,
            roughness_mip_count: 5,
            irradiance_sample_delta: 0.025,
            prefilter_sample_count: 1024,
            irradiance_source_resolution: 64,
            blend: ProbeBlendConfig::default(),
        }
    }
}

impl IblConfig {
    pub fn with_base_resolution(mut self, resolution: u32) -> Self {
        self.base_resolution = resolution;
        self
    }

    pub fn with_irradiance_resolution(mut self, resolution: u32) -> Self {
        self.irradiance_resolution = resolution;
        self
    }

    pub fn with_environment_resolution(mut self, resolution: u32) -> Self {
        self.environment_resolution = resolution;
        self
    }

    pub fn with_roughness_mip_count(mut self, count: u32) -> Self {
        self.roughness_mip_count = count;
        self
    }

    pub fn with_irradiance_sample_delta(mut self, delta: f32) -> Self {
        self.irradiance_sample_delta = delta;
        self
    }

    pub fn with_prefilter_sample_count(mut self, count: u32) -> Self {
        self.prefilter_sample_count = count;
        self
    }

    pub fn with_irradiance_source_resolution(mut self, resolution: u32) -> Self {
        self.irradiance_source_resolution = resolution;
        self
    }

    pub fn with_blend(mut self, blend: ProbeBlendConfig) -> Self {
        self.blend = blend;
        self
    }

    /// Levels in the base cubemap's mip chain.
    pub fn base_mip_count(&self) -> u32 {
        mip_chain_length(self.base_resolution)
    }

    pub fn validate(&self) -> Result<(), IblError> {
        let resolutions = [
            ("base_resolution", self.base_resolution),
            ("irradiance_resolution", self.irradiance_resolution),
            ("environment_resolution", self.environment_resolution),
            ("irradiance_source_resolution", self.irradiance_source_resolution),
        ];
        for (name, value) in resolutions {
            if value == 0 {
                return Err(IblError::InvalidConfig(format!("{name} must be positive")));
            }
        }

        let max_roughness_mips = mip_chain_length(self.environment_resolution);
        if self.roughness_mip_count == 0 || self.roughness_mip_count > max_roughness_mips {
            return Err(IblError::InvalidConfig(format!(
                "roughness_mip_count {} must be in 1..={} for a {}px environment map",
                self.roughness_mip_count, max_roughness_mips, self.environment_resolution
            )));
        }
        if !(self.irradiance_sample_delta > 0.0 && self.irradiance_sample_delta.is_finite()) {
            return Err(IblError::InvalidConfig(format!(
                "irradiance_sample_delta {} must be a positive angle",
                self.irradiance_sample_delta
            )));
        }
        if self.prefilter_sample_count == 0 {
            return Err(IblError::InvalidConfig("prefilter_sample_count must be positive".into()));
        }
        if !(self.blend.half_extent > 0.0) || !(self.blend.blend_radius > 0.0) {
            return Err(IblError::InvalidConfig(format!(
                "blend half_extent {} and blend_radius {} must be positive",
                self.blend.half_extent, self.blend.blend_radius
            )));
        }
        Ok(())
    }
}
